//! Foreign key enforcement shared by the write executors.

use super::ExecutionContext;
use crate::core::{DbError, Result, Row};
use crate::storage::TableSchema;

/// Every non-null foreign key value of `row` must name a committed parent row
/// that no transaction is deleting.
pub async fn check_outbound(schema: &TableSchema, row: &Row, ctx: &ExecutionContext<'_>) -> Result<()> {
    for (idx, column) in schema.schema().columns().iter().enumerate() {
        let Some(fk) = &column.references else {
            continue;
        };
        let value = &row[idx];
        if value.is_null() {
            continue;
        }

        // A row may reference itself.
        if fk.table.eq_ignore_ascii_case(schema.name())
            && let Some(target_idx) = schema.schema().find_column_index(&fk.column)
            && &row[target_idx] == value
        {
            continue;
        }

        // Judged against the current transaction table: a parent another
        // transaction is deleting does not count.
        let parents = ctx.storage.lookup_stable(&fk.table, &fk.column, value, &ctx.write).await?;
        if parents.is_empty() {
            return Err(DbError::ConstraintViolation(format!(
                "Foreign key violation: {}.{} = {} has no matching row in {}.{}",
                schema.name(),
                column.name,
                value,
                fk.table,
                fk.column
            )));
        }
    }
    Ok(())
}

/// No live row, committed or not, may still reference `old_row` through a column that is
/// going away (the row is deleted, or `new_row` changes the referenced value).
pub async fn check_inbound(
    schema: &TableSchema,
    old_row: &Row,
    new_row: Option<&Row>,
    ctx: &ExecutionContext<'_>,
) -> Result<()> {
    for reference in ctx.catalog.references_to(schema.name()) {
        let Some(target_idx) = schema.schema().find_column_index(&reference.target.column) else {
            continue;
        };
        let old_value = &old_row[target_idx];
        if old_value.is_null() {
            continue;
        }
        if let Some(new_row) = new_row
            && &new_row[target_idx] == old_value
        {
            continue;
        }

        // Includes children other transactions have inserted but not committed.
        let children = ctx
            .storage
            .lookup_live(&reference.table, &reference.column, old_value, &ctx.write)
            .await?;
        // A self-referencing row that is itself going away does not count.
        let same_table = reference.table.eq_ignore_ascii_case(schema.name());
        let blocking = children.iter().any(|child| !(same_table && child == old_row));
        if blocking {
            return Err(DbError::ConstraintViolation(format!(
                "Foreign key violation: {}.{} = {} is still referenced from {}.{}",
                schema.name(),
                reference.target.column,
                old_value,
                reference.table,
                reference.column
            )));
        }
    }
    Ok(())
}

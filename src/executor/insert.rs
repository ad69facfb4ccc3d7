use super::{constraints, ExecutionContext, Executor};
use crate::core::{DbError, Result, Value};
use crate::evaluator::{RowLayout, Scope};
use crate::result::QueryResult;
use crate::sql::{InsertStmt, Statement};

use async_trait::async_trait;

pub struct InsertExecutor;

#[async_trait]
impl Executor for InsertExecutor {
    fn name(&self) -> &'static str {
        "INSERT"
    }

    fn can_handle(&self, stmt: &Statement) -> bool {
        matches!(stmt, Statement::Insert(_))
    }

    async fn execute(&self, stmt: &Statement, ctx: &ExecutionContext<'_>) -> Result<QueryResult> {
        let Statement::Insert(insert) = stmt else {
            unreachable!();
        };
        self.execute_insert(insert, ctx).await
    }
}

impl InsertExecutor {
    async fn execute_insert(&self, insert: &InsertStmt, ctx: &ExecutionContext<'_>) -> Result<QueryResult> {
        let schema = ctx.catalog.get_table(&insert.table)?;
        let columns = schema.schema().columns();

        if insert.columns.len() != insert.values.len() {
            return Err(DbError::ExecutionError(format!(
                "INSERT into '{}' names {} columns but supplies {} values",
                insert.table,
                insert.columns.len(),
                insert.values.len()
            )));
        }

        let empty = RowLayout::new();
        let scope = Scope::new(&empty, &[]);
        let eval = ctx.evaluation();

        let mut row = vec![Value::Null; columns.len()];
        if insert.columns.is_empty() {
            // Positional VALUES list covering every column.
            if insert.values.len() != columns.len() {
                return Err(DbError::ExecutionError(format!(
                    "Table '{}' has {} columns but {} values were supplied",
                    insert.table,
                    columns.len(),
                    insert.values.len()
                )));
            }
            for (slot, expr) in row.iter_mut().zip(&insert.values) {
                *slot = eval.evaluate(expr, &scope)?;
            }
        } else {
            for (name, expr) in insert.columns.iter().zip(&insert.values) {
                let idx = schema
                    .schema()
                    .find_column_index(name)
                    .ok_or_else(|| DbError::ColumnNotFound(name.clone(), insert.table.clone()))?;
                row[idx] = eval.evaluate(expr, &scope)?;
            }
        }

        constraints::check_outbound(schema, &row, ctx).await?;
        ctx.storage.insert_row(&insert.table, row, &ctx.write).await?;

        Ok(QueryResult::affected(1))
    }
}

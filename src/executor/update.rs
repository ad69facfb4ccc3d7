use super::{constraints, ExecutionContext, Executor};
use crate::core::{DbError, Result};
use crate::evaluator::{RowLayout, Scope};
use crate::result::QueryResult;
use crate::sql::{Statement, UpdateStmt};

use async_trait::async_trait;

pub struct UpdateExecutor;

#[async_trait]
impl Executor for UpdateExecutor {
    fn name(&self) -> &'static str {
        "UPDATE"
    }

    fn can_handle(&self, stmt: &Statement) -> bool {
        matches!(stmt, Statement::Update(_))
    }

    async fn execute(&self, stmt: &Statement, ctx: &ExecutionContext<'_>) -> Result<QueryResult> {
        let Statement::Update(update) = stmt else {
            unreachable!();
        };
        self.execute_update(update, ctx).await
    }
}

impl UpdateExecutor {
    async fn execute_update(&self, update: &UpdateStmt, ctx: &ExecutionContext<'_>) -> Result<QueryResult> {
        let table_name = &update.table.name;
        let schema = ctx.catalog.get_table(table_name)?;

        let mut layout = RowLayout::new();
        layout.push(update.table.binding(), table_name, schema.column_names());

        let targets = update
            .assignments
            .iter()
            .map(|a| {
                schema
                    .schema()
                    .find_column_index(&a.column)
                    .ok_or_else(|| DbError::ColumnNotFound(a.column.clone(), table_name.clone()))
            })
            .collect::<Result<Vec<_>>>()?;

        let rows = ctx.storage.scan_table_with_ids(table_name, &ctx.read).await?;
        let eval = ctx.evaluation();

        // Compute every new row before touching storage.
        let mut changes = Vec::new();
        for (id, row) in rows {
            let scope = Scope::new(&layout, &row);
            if let Some(condition) = &update.selection
                && !eval.matches(condition, &scope)?
            {
                continue;
            }

            let mut new_row = row.clone();
            for (idx, assignment) in targets.iter().zip(&update.assignments) {
                new_row[*idx] = eval.evaluate(&assignment.value, &scope)?;
            }
            changes.push((id, row, new_row));
        }

        for (id, old_row, new_row) in &changes {
            constraints::check_outbound(schema, new_row, ctx).await?;
            constraints::check_inbound(schema, old_row, Some(new_row), ctx).await?;
            ctx.storage
                .update_row(table_name, *id, new_row.clone(), &ctx.read, &ctx.write)
                .await?;
        }

        Ok(QueryResult::affected(changes.len()))
    }
}

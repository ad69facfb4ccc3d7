use super::{constraints, ExecutionContext, Executor};
use crate::core::Result;
use crate::evaluator::{RowLayout, Scope};
use crate::result::QueryResult;
use crate::sql::{DeleteStmt, Statement};

use async_trait::async_trait;

pub struct DeleteExecutor;

#[async_trait]
impl Executor for DeleteExecutor {
    fn name(&self) -> &'static str {
        "DELETE"
    }

    fn can_handle(&self, stmt: &Statement) -> bool {
        matches!(stmt, Statement::Delete(_))
    }

    async fn execute(&self, stmt: &Statement, ctx: &ExecutionContext<'_>) -> Result<QueryResult> {
        let Statement::Delete(delete) = stmt else {
            unreachable!();
        };
        self.execute_delete(delete, ctx).await
    }
}

impl DeleteExecutor {
    async fn execute_delete(&self, delete: &DeleteStmt, ctx: &ExecutionContext<'_>) -> Result<QueryResult> {
        let table_name = &delete.table.name;
        let schema = ctx.catalog.get_table(table_name)?;

        let mut layout = RowLayout::new();
        layout.push(delete.table.binding(), table_name, schema.column_names());

        let rows = ctx.storage.scan_table_with_ids(table_name, &ctx.read).await?;
        let eval = ctx.evaluation();

        let mut doomed = Vec::new();
        for (id, row) in rows {
            if let Some(condition) = &delete.selection
                && !eval.matches(condition, &Scope::new(&layout, &row))?
            {
                continue;
            }
            doomed.push((id, row));
        }

        // Delete first so rows removed by this same statement no longer block
        // each other, then verify nothing outside still points at them.
        for (id, _) in &doomed {
            ctx.storage.delete_row(table_name, *id, &ctx.read, &ctx.write).await?;
        }
        for (_, row) in &doomed {
            constraints::check_inbound(schema, row, None, ctx).await?;
        }

        Ok(QueryResult::affected(doomed.len()))
    }
}

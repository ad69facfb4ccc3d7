use super::ExecutionContext;
use crate::core::{DbError, Result};
use crate::result::QueryResult;
use crate::sql::Statement;

use async_trait::async_trait;

#[async_trait]
pub trait Executor: Send + Sync {
    fn name(&self) -> &'static str;

    fn can_handle(&self, stmt: &Statement) -> bool;

    async fn execute(&self, stmt: &Statement, ctx: &ExecutionContext<'_>) -> Result<QueryResult>;
}

/// Dispatches a statement to the first executor that claims it.
pub struct ExecutorPipeline {
    executors: Vec<Box<dyn Executor>>,
}

impl ExecutorPipeline {
    pub fn new() -> Self {
        Self {
            executors: Vec::new(),
        }
    }

    pub fn with_default_executors() -> Self {
        let mut pipeline = Self::new();
        pipeline.register(Box::new(super::insert::InsertExecutor));
        pipeline.register(Box::new(super::update::UpdateExecutor));
        pipeline.register(Box::new(super::delete::DeleteExecutor));
        pipeline.register(Box::new(super::query::QueryExecutor));
        pipeline
    }

    pub fn register(&mut self, executor: Box<dyn Executor>) {
        self.executors.push(executor);
    }

    pub async fn execute(&self, stmt: &Statement, ctx: &ExecutionContext<'_>) -> Result<QueryResult> {
        for executor in &self.executors {
            if executor.can_handle(stmt) {
                log::trace!("{} executor handles statement", executor.name());
                return executor.execute(stmt, ctx).await;
            }
        }

        Err(DbError::UnsupportedOperation("No executor found for statement".into()))
    }
}

impl Default for ExecutorPipeline {
    fn default() -> Self {
        Self::with_default_executors()
    }
}

use crate::core::Snapshot;
use crate::evaluator::{EvaluationContext, EvaluatorRegistry};
use crate::sql::Params;
use crate::storage::{Catalog, InMemoryStorage};

/// Everything an executor needs to run one statement inside a transaction.
pub struct ExecutionContext<'a> {
    pub storage: &'a InMemoryStorage,
    pub catalog: &'a Catalog,
    pub evaluators: &'a EvaluatorRegistry,
    pub params: &'a Params,
    /// Begin snapshot of the transaction; all reads go through it.
    pub read: Snapshot,
    /// Current view of the transaction table, for conflict and constraint checks.
    pub write: Snapshot,
}

impl<'a> ExecutionContext<'a> {
    pub fn evaluation(&self) -> EvaluationContext<'_> {
        EvaluationContext::new(self.evaluators, self.params)
    }
}

use crate::core::Result;
use crate::result::QueryResult;
use crate::sql::{Params, Statement};
use crate::storage::TableSchema;
use crate::transaction::TransactionId;

use async_trait::async_trait;

/// A transactional relational store that accepts parameterized statements.
///
/// Every write of a transaction becomes visible to others atomically at
/// `commit`, and none of them does after `rollback`.
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn begin(&self) -> Result<TransactionId>;

    async fn execute(&self, txn: TransactionId, stmt: &Statement, params: &Params) -> Result<QueryResult>;

    async fn commit(&self, txn: TransactionId) -> Result<()>;

    /// Idempotent.
    async fn rollback(&self, txn: TransactionId) -> Result<()>;

    /// Next value of a named sequence. Sequences ignore transactions: a
    /// value handed out is never handed out again, even after a rollback.
    async fn next_sequence_value(&self, sequence: &str) -> Result<i64>;

    async fn create_table(&self, schema: TableSchema) -> Result<()>;

    async fn table_exists(&self, name: &str) -> bool;
}

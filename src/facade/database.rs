use super::DataSource;
use crate::core::{DbError, Result};
use crate::evaluator::EvaluatorRegistry;
use crate::executor::{ExecutionContext, ExecutorPipeline};
use crate::parser::SqlParserAdapter;
use crate::result::QueryResult;
use crate::sql::{Params, Statement};
use crate::storage::{Catalog, InMemoryStorage, TableSchema};
use crate::transaction::{TransactionId, TransactionManager};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::RwLock;

use async_trait::async_trait;

struct DatabaseState {
    storage: InMemoryStorage,
    catalog: Catalog,
}

/// In-memory MVCC database.
///
/// Statements share the state lock for reading; only table creation takes it
/// exclusively. Row-level isolation is provided by the per-table MVCC versions.
pub struct InMemoryDB {
    state: RwLock<DatabaseState>,
    parser: SqlParserAdapter,
    executor_pipeline: ExecutorPipeline,
    evaluators: EvaluatorRegistry,
    transaction_manager: TransactionManager,
    sequences: Mutex<HashMap<String, i64>>,
}

impl InMemoryDB {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(DatabaseState {
                storage: InMemoryStorage::new(),
                catalog: Catalog::new(),
            }),
            parser: SqlParserAdapter::new(),
            executor_pipeline: ExecutorPipeline::with_default_executors(),
            evaluators: EvaluatorRegistry::with_default_evaluators(),
            transaction_manager: TransactionManager::new(),
            sequences: Mutex::new(HashMap::new()),
        }
    }

    pub fn transaction_manager(&self) -> &TransactionManager {
        &self.transaction_manager
    }

    /// Parse `sql` (PostgreSQL dialect, `$n` placeholders) and run it.
    pub async fn execute_sql(&self, txn: TransactionId, sql: &str, params: &Params) -> Result<QueryResult> {
        let stmt = self.parser.parse_one(sql)?;
        self.execute(txn, &stmt, params).await
    }

    /// Run `sql` in its own short transaction.
    pub async fn execute_autocommit(&self, sql: &str, params: &Params) -> Result<QueryResult> {
        let txn = self.begin().await?;
        match self.execute_sql(txn, sql, params).await {
            Ok(result) => {
                self.commit(txn).await?;
                Ok(result)
            }
            Err(e) => {
                self.rollback(txn).await?;
                Err(e)
            }
        }
    }

    pub async fn table_names(&self) -> Vec<String> {
        let state = self.state.read().await;
        state.catalog.list_tables().into_iter().map(str::to_string).collect()
    }

    pub async fn row_count(&self, table: &str) -> Result<usize> {
        let state = self.state.read().await;
        state.storage.row_count(table).await
    }
}

impl Default for InMemoryDB {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DataSource for InMemoryDB {
    async fn begin(&self) -> Result<TransactionId> {
        self.transaction_manager.begin().await
    }

    async fn execute(&self, txn: TransactionId, stmt: &Statement, params: &Params) -> Result<QueryResult> {
        let read = self.transaction_manager.snapshot(txn).await?;
        let write = self.transaction_manager.current_snapshot(txn).await?;
        self.transaction_manager.record_statement(txn).await?;

        let state = self.state.read().await;
        let ctx = ExecutionContext {
            storage: &state.storage,
            catalog: &state.catalog,
            evaluators: &self.evaluators,
            params,
            read,
            write,
        };

        log::trace!("{} executing {} {}", txn, stmt, params);
        self.executor_pipeline.execute(stmt, &ctx).await
    }

    async fn commit(&self, txn: TransactionId) -> Result<()> {
        self.transaction_manager.commit(txn).await
    }

    async fn rollback(&self, txn: TransactionId) -> Result<()> {
        self.transaction_manager.rollback(txn).await
    }

    async fn next_sequence_value(&self, sequence: &str) -> Result<i64> {
        let mut sequences = self.sequences.lock()?;
        let next = sequences.entry(sequence.to_ascii_lowercase()).or_insert(0);
        *next = next
            .checked_add(1)
            .ok_or_else(|| DbError::ExecutionError(format!("Sequence '{}' exhausted", sequence)))?;
        Ok(*next)
    }

    async fn create_table(&self, schema: TableSchema) -> Result<()> {
        let mut state = self.state.write().await;
        let catalog = state.catalog.clone().with_table(schema.clone())?;
        state.storage.create_table(schema)?;
        state.catalog = catalog;
        Ok(())
    }

    async fn table_exists(&self, name: &str) -> bool {
        let state = self.state.read().await;
        state.catalog.table_exists(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Column, DataType, Value};

    async fn database() -> InMemoryDB {
        let db = InMemoryDB::new();
        db.create_table(TableSchema::new(
            "TEAM",
            vec![
                Column::new("ID", DataType::Integer).primary_key(),
                Column::new("NAME", DataType::Text),
            ],
        ))
        .await
        .unwrap();
        db.create_table(TableSchema::new(
            "MEMBER",
            vec![
                Column::new("ID", DataType::Integer).primary_key(),
                Column::new("USERNAME", DataType::Text).not_null(),
                Column::new("TEAM_ID", DataType::Integer).references("TEAM", "ID"),
            ],
        ))
        .await
        .unwrap();
        db
    }

    #[tokio::test]
    async fn test_commit_publishes_writes() {
        let db = database().await;
        let writer = db.begin().await.unwrap();
        db.execute_sql(writer, "INSERT INTO TEAM (ID, NAME) VALUES (1, 'teamA')", &Params::new())
            .await
            .unwrap();

        let reader = db.begin().await.unwrap();
        let before = db.execute_sql(reader, "SELECT * FROM TEAM", &Params::new()).await.unwrap();
        assert!(before.is_empty());

        db.commit(writer).await.unwrap();
        let after = db
            .execute_autocommit("SELECT NAME FROM TEAM", &Params::new())
            .await
            .unwrap();
        assert_eq!(after.rows, vec![vec![Value::from("teamA")]]);
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let db = database().await;
        let txn = db.begin().await.unwrap();
        db.execute_sql(txn, "INSERT INTO TEAM (ID, NAME) VALUES (1, 'teamA')", &Params::new())
            .await
            .unwrap();
        db.rollback(txn).await.unwrap();
        db.rollback(txn).await.unwrap();

        let result = db
            .execute_autocommit("SELECT COUNT(*) FROM TEAM", &Params::new())
            .await
            .unwrap();
        assert_eq!(result.scalar().unwrap(), &Value::Integer(0));
    }

    #[tokio::test]
    async fn test_foreign_keys_are_enforced() {
        let db = database().await;
        let err = db
            .execute_autocommit(
                "INSERT INTO MEMBER (ID, USERNAME, TEAM_ID) VALUES (1, 'kim', 99)",
                &Params::new(),
            )
            .await
            .unwrap_err();
        assert!(err.is_constraint_violation());

        db.execute_autocommit("INSERT INTO TEAM (ID, NAME) VALUES (1, 'teamA')", &Params::new())
            .await
            .unwrap();
        db.execute_autocommit(
            "INSERT INTO MEMBER (ID, USERNAME, TEAM_ID) VALUES ($1, $2, $3)",
            &Params::positional(vec![Value::Integer(1), Value::from("kim"), Value::Integer(1)]),
        )
        .await
        .unwrap();

        let err = db
            .execute_autocommit("DELETE FROM TEAM WHERE ID = 1", &Params::new())
            .await
            .unwrap_err();
        assert!(err.is_constraint_violation());
    }

    #[tokio::test]
    async fn test_sequences_ignore_rollback() {
        let db = database().await;
        let txn = db.begin().await.unwrap();
        assert_eq!(db.next_sequence_value("member_seq").await.unwrap(), 1);
        db.rollback(txn).await.unwrap();
        assert_eq!(db.next_sequence_value("member_seq").await.unwrap(), 2);
        assert_eq!(db.next_sequence_value("team_seq").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_join_order_and_paging() {
        let db = database().await;
        let txn = db.begin().await.unwrap();
        for (id, name) in [(1, "teamA"), (2, "teamB")] {
            db.execute_sql(
                txn,
                "INSERT INTO TEAM (ID, NAME) VALUES ($1, $2)",
                &Params::positional(vec![Value::Integer(id), Value::from(name)]),
            )
            .await
            .unwrap();
        }
        for (id, name, team) in [(1, "a", Some(1)), (2, "b", Some(2)), (3, "c", None)] {
            db.execute_sql(
                txn,
                "INSERT INTO MEMBER (ID, USERNAME, TEAM_ID) VALUES ($1, $2, $3)",
                &Params::positional(vec![Value::Integer(id), Value::from(name), Value::from(team)]),
            )
            .await
            .unwrap();
        }

        let result = db
            .execute_sql(
                txn,
                "SELECT m.USERNAME, t.NAME FROM MEMBER m LEFT JOIN TEAM t ON m.TEAM_ID = t.ID \
                 ORDER BY m.ID DESC LIMIT 2 OFFSET 1",
                &Params::new(),
            )
            .await
            .unwrap();
        assert_eq!(
            result.rows,
            vec![
                vec![Value::from("b"), Value::from("teamB")],
                vec![Value::from("a"), Value::from("teamA")],
            ]
        );
    }
}

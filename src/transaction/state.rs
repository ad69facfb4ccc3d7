use crate::core::{DbError, Result, Snapshot};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Global transaction ID counter
static NEXT_TXN_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a data-source transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(pub u64);

impl TransactionId {
    pub fn new() -> Self {
        TransactionId(NEXT_TXN_ID.fetch_add(1, Ordering::SeqCst))
    }

    pub(crate) fn next_raw() -> u64 {
        NEXT_TXN_ID.load(Ordering::SeqCst)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "txn_{}", self.0)
    }
}

/// ```text
/// Active ──commit──> Committed
///   │
///   └──rollback──> Aborted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    Aborted,
}

impl TransactionState {
    pub fn is_active(&self) -> bool {
        matches!(self, TransactionState::Active)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionState::Committed | TransactionState::Aborted)
    }
}

impl std::fmt::Display for TransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionState::Active => write!(f, "ACTIVE"),
            TransactionState::Committed => write!(f, "COMMITTED"),
            TransactionState::Aborted => write!(f, "ABORTED"),
        }
    }
}

#[derive(Debug)]
pub struct Transaction {
    id: TransactionId,
    state: TransactionState,
    /// Snapshot taken at begin; all reads of this transaction use it.
    snapshot: Snapshot,
    statements: usize,
    start_time: Instant,
}

impl Transaction {
    pub fn new(id: TransactionId, snapshot: Snapshot) -> Self {
        Self {
            id,
            state: TransactionState::Active,
            snapshot,
            statements: 0,
            start_time: Instant::now(),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn statement_count(&self) -> usize {
        self.statements
    }

    pub fn duration(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn record_statement(&mut self) -> Result<()> {
        if !self.state.is_active() {
            return Err(DbError::ExecutionError(format!(
                "Cannot execute: transaction {} is {}",
                self.id, self.state
            )));
        }
        self.statements += 1;
        Ok(())
    }

    pub fn commit(&mut self) -> Result<()> {
        if !self.state.is_active() {
            return Err(DbError::ExecutionError(format!(
                "Cannot commit: transaction {} is already {}",
                self.id, self.state
            )));
        }
        self.state = TransactionState::Committed;
        Ok(())
    }

    pub fn rollback(&mut self) -> Result<()> {
        if !self.state.is_active() {
            return Err(DbError::ExecutionError(format!(
                "Cannot rollback: transaction {} is already {}",
                self.id, self.state
            )));
        }
        self.state = TransactionState::Aborted;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn transaction() -> Transaction {
        let id = TransactionId::new();
        let snapshot = Snapshot {
            tx_id: id.0,
            active: Arc::new(HashSet::new()),
            aborted: Arc::new(HashSet::new()),
            max_tx_id: id.0,
        };
        Transaction::new(id, snapshot)
    }

    #[test]
    fn test_transaction_id_generation() {
        let id1 = TransactionId::new();
        let id2 = TransactionId::new();
        assert!(id2.as_u64() > id1.as_u64());
    }

    #[test]
    fn test_transaction_lifecycle() {
        let mut txn = transaction();
        assert!(txn.state().is_active());

        txn.record_statement().unwrap();
        assert_eq!(txn.statement_count(), 1);

        txn.commit().unwrap();
        assert!(txn.state().is_terminal());
        assert!(txn.commit().is_err());
        assert!(txn.record_statement().is_err());
    }
}

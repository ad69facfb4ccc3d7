use super::{Transaction, TransactionId, TransactionState};
use crate::core::{DbError, Result, Snapshot};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

pub struct TransactionManager {
    transactions: RwLock<HashMap<TransactionId, Transaction>>,

    // Copy-on-write id sets: a snapshot just clones the Arc.
    active_ids: RwLock<Arc<HashSet<u64>>>,
    aborted_ids: RwLock<Arc<HashSet<u64>>>,
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionManager {
    pub fn new() -> Self {
        Self {
            transactions: RwLock::new(HashMap::new()),
            active_ids: RwLock::new(Arc::new(HashSet::new())),
            aborted_ids: RwLock::new(Arc::new(HashSet::new())),
        }
    }

    pub async fn begin(&self) -> Result<TransactionId> {
        // Register as active before the id is visible to anyone else.
        let mut active_lock = self.active_ids.write().await;
        let transaction_id = TransactionId::new();

        let snapshot = Snapshot {
            tx_id: transaction_id.0,
            active: active_lock.clone(),
            aborted: self.aborted_ids.read().await.clone(),
            max_tx_id: transaction_id.0,
        };

        let mut new_set = (**active_lock).clone();
        new_set.insert(transaction_id.0);
        *active_lock = Arc::new(new_set);
        drop(active_lock);

        self.transactions
            .write()
            .await
            .insert(transaction_id, Transaction::new(transaction_id, snapshot));

        Ok(transaction_id)
    }

    /// The begin snapshot of an active transaction.
    pub async fn snapshot(&self, txn_id: TransactionId) -> Result<Snapshot> {
        let transactions = self.transactions.read().await;
        transactions
            .get(&txn_id)
            .map(|txn| txn.snapshot().clone())
            .ok_or_else(|| DbError::ExecutionError(format!("Transaction {} is not active", txn_id)))
    }

    /// A snapshot of the transaction table as it is right now, seen from
    /// `txn_id`. Used for conflict and constraint checks.
    pub async fn current_snapshot(&self, txn_id: TransactionId) -> Result<Snapshot> {
        let active = self.active_ids.read().await.clone();
        let aborted = self.aborted_ids.read().await.clone();
        Ok(Snapshot {
            tx_id: txn_id.0,
            active,
            aborted,
            max_tx_id: TransactionId::next_raw(),
        })
    }

    pub async fn record_statement(&self, txn_id: TransactionId) -> Result<()> {
        let mut transactions = self.transactions.write().await;
        transactions
            .get_mut(&txn_id)
            .ok_or_else(|| DbError::ExecutionError(format!("Transaction {} is not active", txn_id)))?
            .record_statement()
    }

    pub async fn state(&self, txn_id: TransactionId) -> Option<TransactionState> {
        let transactions = self.transactions.read().await;
        transactions.get(&txn_id).map(|txn| txn.state())
    }

    pub async fn commit(&self, txn_id: TransactionId) -> Result<()> {
        let mut transactions = self.transactions.write().await;
        let mut transaction = transactions
            .remove(&txn_id)
            .ok_or_else(|| DbError::ExecutionError(format!("Transaction {} not found", txn_id)))?;
        transaction.commit()?;

        // Leaving the active set publishes every version at once.
        let mut active_lock = self.active_ids.write().await;
        let mut new_set = (**active_lock).clone();
        new_set.remove(&txn_id.0);
        *active_lock = Arc::new(new_set);

        Ok(())
    }

    /// Abort `txn_id`. Rolling back an unknown or finished transaction is a no-op.
    pub async fn rollback(&self, txn_id: TransactionId) -> Result<()> {
        let mut transactions = self.transactions.write().await;
        let Some(mut transaction) = transactions.remove(&txn_id) else {
            return Ok(());
        };
        transaction.rollback()?;

        // Mark aborted before leaving the active set so no snapshot can
        // observe the versions as committed in between.
        {
            let mut aborted_lock = self.aborted_ids.write().await;
            let mut new_set = (**aborted_lock).clone();
            new_set.insert(txn_id.0);
            *aborted_lock = Arc::new(new_set);
        }
        {
            let mut active_lock = self.active_ids.write().await;
            let mut new_set = (**active_lock).clone();
            new_set.remove(&txn_id.0);
            *active_lock = Arc::new(new_set);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_snapshot_excludes_concurrent_transactions() {
        let manager = TransactionManager::new();
        let t1 = manager.begin().await.unwrap();
        let t2 = manager.begin().await.unwrap();

        let s2 = manager.snapshot(t2).await.unwrap();
        assert!(s2.active.contains(&t1.0));
        assert!(!s2.is_committed(t1.0));

        manager.commit(t1).await.unwrap();
        // Repeatable read: the begin snapshot does not change.
        assert!(!manager.snapshot(t2).await.unwrap().is_committed(t1.0));
        assert!(manager.current_snapshot(t2).await.unwrap().is_committed(t1.0));
    }

    #[tokio::test]
    async fn test_rollback_is_idempotent() {
        let manager = TransactionManager::new();
        let t1 = manager.begin().await.unwrap();

        manager.rollback(t1).await.unwrap();
        manager.rollback(t1).await.unwrap();

        let snapshot = manager.current_snapshot(TransactionId::new()).await.unwrap();
        assert!(snapshot.is_aborted(t1.0));
        assert!(manager.commit(t1).await.is_err());
    }
}

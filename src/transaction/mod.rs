// ============================================================================
// Transaction Management Module
// ============================================================================
//
// Snapshot isolation over MVCC row versions. A transaction reads the snapshot
// taken when it began; its own writes become visible to others all at once
// when its id leaves the active set.
//
// ============================================================================

pub mod manager;
pub mod state;

pub use manager::TransactionManager;
pub use state::{Transaction, TransactionId, TransactionState};

//! Dirty checking: snapshots of persistent state, per-instance diffs and
//! the ordered write plan a flush executes.

pub mod diff;
pub mod plan;
pub mod report;
pub mod snapshot;

pub use diff::{diff, key_difference, CollectionChange, ElementChange, EntityChanges};
pub use plan::{plan, ChangeSet, EntityWrite, PlannedWrite, WriteKind, WritePlan};
pub use report::FlushReport;
pub use snapshot::{EntityKey, EntitySnapshot, SnapshotValue};

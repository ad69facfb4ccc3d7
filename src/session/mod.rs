//! Persistence contexts: the unit of work, its flush and its queries.

pub mod flush;
pub mod loader;
pub mod query;
pub mod unit;
pub mod unit_of_work;

pub use query::Query;
pub use unit::PersistenceUnit;
pub use unit_of_work::{CancelHandle, UnitOfWork, UnitStatus};

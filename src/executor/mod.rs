pub mod constraints;
pub mod context;
pub mod delete;
pub mod executor;
pub mod insert;
pub mod query;
pub mod sort;
pub mod update;

pub use context::ExecutionContext;
pub use executor::{Executor, ExecutorPipeline};

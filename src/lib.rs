// ============================================================================
// memorm Library
// ============================================================================
//
// An object-relational mapping core over a transactional in-memory SQL store.
//
//   metadata  - entity types, mappings and named queries
//   entity    - runtime instances addressed by handles
//   tracker   - snapshots, diffs and write plans
//   query     - the object query language and its translation to SQL
//   session   - persistence units and units of work
//   facade    - the data-source contract and the MVCC in-memory store

pub mod config;
pub mod core;
pub mod entity;
pub mod facade;
pub mod metadata;
pub mod query;
pub mod result;
pub mod session;
pub mod sql;
pub mod storage;
pub mod tracker;
pub mod transaction;
mod evaluator;
mod executor;
mod expression;
mod parser;
mod plugins;

// Re-export main types for convenience
pub use config::{FlushMode, PersistenceConfig};
pub use core::{DataType, DbError, Result, Value};
pub use entity::{Element, ElementList, EmbeddedValue, EntityHandle, LifecycleState};
pub use facade::{DataSource, InMemoryDB};
pub use metadata::{
    BasicAttribute, Cardinality, CascadeType, CollectionKind, ElementCollectionDescriptor, ElementKind,
    EmbeddableDescriptor, EmbeddableField, EmbeddedAttribute, EntityDescriptor, EnumDescriptor, FetchType, IdDescriptor,
    Inheritance, InheritanceStrategy, KeyStrategy, MappingDocument, Metamodel, MetamodelBuilder,
    NamedQueryDescriptor, RelationshipDescriptor, RelationshipMapping,
};
pub use query::QueryValue;
pub use result::QueryResult;
pub use session::{CancelHandle, PersistenceUnit, Query, UnitOfWork, UnitStatus};
pub use tracker::FlushReport;
pub use transaction::TransactionId;

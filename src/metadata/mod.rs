//! Mapping metadata: descriptors as declared, and the validated
//! [`Metamodel`] the rest of the crate consumes.

pub mod builder;
pub mod descriptor;
pub mod model;

pub use builder::{MappingDocument, MetamodelBuilder};
pub use descriptor::{
    BasicAttribute, Cardinality, CascadeType, CollectionKind, ElementCollectionDescriptor, ElementKind,
    EmbeddableDescriptor, EmbeddableField, EmbeddedAttribute, EntityDescriptor, EnumDescriptor, FetchType, IdDescriptor,
    Inheritance, InheritanceStrategy, KeyStrategy, NamedQueryDescriptor, RelationshipDescriptor,
    RelationshipMapping,
};
pub use model::{
    Attribute, AttributeKind, BasicMapping, ElementMapping, ElementShape, EmbeddedMapping, EntityType, FieldColumn,
    IdMapping, Metamodel, LIST_POSITION_COLUMN,
};

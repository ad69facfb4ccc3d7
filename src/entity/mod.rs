//! Runtime representation of entity instances inside a unit of work.

pub mod arena;
pub mod value;

pub use arena::{Arena, Slot};
pub use value::{
    AttributeValue, DeferredLoad, DeferredSource, Element, ElementList, ElementValues, EmbeddedValue,
    EntityCollection, Reference,
};

use crate::core::Value;
use crate::metadata::{AttributeKind, Cardinality, EntityType};
use std::collections::BTreeMap;
use std::fmt;

/// Identity of one instance inside one unit of work. Two handles are equal
/// exactly when they denote the same instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityHandle {
    unit: u64,
    index: usize,
}

impl EntityHandle {
    pub(crate) fn new(unit: u64, index: usize) -> Self {
        Self { unit, index }
    }

    pub fn unit(&self) -> u64 {
        self.unit
    }

    pub(crate) fn index(&self) -> usize {
        self.index
    }
}

impl fmt::Display for EntityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "uow{}#{}", self.unit, self.index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Created but never persisted; not in the identity map.
    Transient,
    Managed,
    /// Scheduled for deletion. Terminal.
    Removed,
    /// No longer tracked.
    Detached,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Transient => "transient",
            LifecycleState::Managed => "managed",
            LifecycleState::Removed => "removed",
            LifecycleState::Detached => "detached",
        };
        write!(f, "{}", name)
    }
}

/// Concrete type and current attribute values of one instance.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityData {
    entity: String,
    attributes: BTreeMap<String, AttributeValue>,
}

impl EntityData {
    /// Every attribute empty: NULL values, no references, empty loaded
    /// collections.
    pub fn new(entity_type: &EntityType) -> Self {
        let mut attributes = BTreeMap::new();
        attributes.insert(entity_type.id.name.clone(), AttributeValue::Basic(Value::Null));
        for attribute in &entity_type.attributes {
            let value = match &attribute.kind {
                AttributeKind::Basic(_) => AttributeValue::Basic(Value::Null),
                AttributeKind::Embedded(_) => AttributeValue::Embedded(None),
                AttributeKind::Relationship(rel) => match rel.cardinality {
                    Cardinality::OneToOne | Cardinality::ManyToOne => AttributeValue::Reference(Reference::Null),
                    Cardinality::OneToMany | Cardinality::ManyToMany => {
                        AttributeValue::Collection(EntityCollection::Loaded(Vec::new()))
                    }
                },
                AttributeKind::Elements(elements) => {
                    AttributeValue::Elements(ElementValues::Loaded(ElementList::new(elements.kind)))
                }
            };
            attributes.insert(attribute.name.clone(), value);
        }
        Self {
            entity: entity_type.name.clone(),
            attributes,
        }
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn get(&self, attribute: &str) -> Option<&AttributeValue> {
        self.attributes.get(attribute)
    }

    pub fn get_mut(&mut self, attribute: &str) -> Option<&mut AttributeValue> {
        self.attributes.get_mut(attribute)
    }

    pub fn set(&mut self, attribute: &str, value: AttributeValue) {
        self.attributes.insert(attribute.to_string(), value);
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &AttributeValue)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Current value of the key attribute.
    pub fn key(&self, entity_type: &EntityType) -> &Value {
        match self.attributes.get(&entity_type.id.name) {
            Some(AttributeValue::Basic(value)) => value,
            _ => &Value::Null,
        }
    }
}

use crate::core::{DbError, Result, Value};
use crate::entity::{
    Arena, AttributeValue, DeferredSource, Element, ElementValues, EmbeddedValue, EntityCollection, EntityData,
    Reference,
};
use crate::metadata::{AttributeKind, EntityType, Metamodel};
use std::collections::BTreeMap;

/// Key of an instance together with its concrete type.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityKey {
    pub entity: String,
    pub key: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotValue {
    Basic(Value),
    Embedded(Option<EmbeddedValue>),
    /// Target key of an owning to-one reference.
    Reference(Option<Value>),
    Collection(Vec<EntityKey>),
    Elements(Vec<Element>),
}

/// Persistent state of one instance as of its last load or flush.
/// Unloaded associations are absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntitySnapshot {
    values: BTreeMap<String, SnapshotValue>,
}

impl EntitySnapshot {
    pub fn capture(model: &Metamodel, entity_type: &EntityType, data: &EntityData, arena: &Arena) -> Result<Self> {
        let mut values = BTreeMap::new();
        values.insert(
            entity_type.id.name.clone(),
            SnapshotValue::Basic(data.key(entity_type).clone()),
        );

        for attribute in &entity_type.attributes {
            let Some(current) = data.get(&attribute.name) else {
                continue;
            };
            let captured = match (&attribute.kind, current) {
                (AttributeKind::Basic(_), AttributeValue::Basic(value)) => Some(SnapshotValue::Basic(value.clone())),
                (AttributeKind::Embedded(_), AttributeValue::Embedded(value)) => {
                    Some(SnapshotValue::Embedded(value.clone()))
                }
                (AttributeKind::Relationship(rel), AttributeValue::Reference(reference)) => {
                    if attribute.join_column().is_none() {
                        None
                    } else {
                        let target = model.require_entity(&rel.target)?;
                        let key = match reference {
                            Reference::Null => None,
                            Reference::Instance(handle) => {
                                Some(arena.key_of(*handle, &target.id.name).ok_or_else(|| {
                                    DbError::IllegalState(format!(
                                        "'{}.{}' refers to an instance without a key",
                                        entity_type.name, attribute.name
                                    ))
                                })?)
                            }
                            Reference::Deferred(deferred) => match &deferred.source {
                                DeferredSource::Key(key) => Some(key.clone()),
                                DeferredSource::Owner { .. } => None,
                            },
                        };
                        Some(SnapshotValue::Reference(key))
                    }
                }
                (AttributeKind::Relationship(rel), AttributeValue::Collection(EntityCollection::Loaded(handles))) => {
                    let target = model.require_entity(&rel.target)?;
                    let mut keys = Vec::with_capacity(handles.len());
                    for handle in handles {
                        let key = arena.key_of(*handle, &target.id.name).ok_or_else(|| {
                            DbError::IllegalState(format!(
                                "'{}.{}' holds an instance without a key",
                                entity_type.name, attribute.name
                            ))
                        })?;
                        keys.push(EntityKey {
                            entity: arena.get(*handle)?.data.entity().to_string(),
                            key,
                        });
                    }
                    Some(SnapshotValue::Collection(keys))
                }
                (AttributeKind::Elements(_), AttributeValue::Elements(ElementValues::Loaded(list))) => {
                    Some(SnapshotValue::Elements(list.as_slice().to_vec()))
                }
                _ => None,
            };
            if let Some(captured) = captured {
                values.insert(attribute.name.clone(), captured);
            }
        }

        Ok(Self { values })
    }

    pub fn get(&self, attribute: &str) -> Option<&SnapshotValue> {
        self.values.get(attribute)
    }

    /// Record an association that was loaded after the snapshot was taken.
    pub fn record(&mut self, attribute: &str, value: SnapshotValue) {
        self.values.insert(attribute.to_string(), value);
    }

    pub fn basic(&self, attribute: &str) -> &Value {
        match self.values.get(attribute) {
            Some(SnapshotValue::Basic(value)) => value,
            _ => &Value::Null,
        }
    }

    pub fn embedded(&self, attribute: &str) -> Option<&EmbeddedValue> {
        match self.values.get(attribute) {
            Some(SnapshotValue::Embedded(value)) => value.as_ref(),
            _ => None,
        }
    }

    pub fn reference(&self, attribute: &str) -> Option<&Value> {
        match self.values.get(attribute) {
            Some(SnapshotValue::Reference(key)) => key.as_ref(),
            _ => None,
        }
    }

    pub fn collection(&self, attribute: &str) -> Option<&[EntityKey]> {
        match self.values.get(attribute) {
            Some(SnapshotValue::Collection(keys)) => Some(keys),
            _ => None,
        }
    }
}

use super::snapshot::{EntityKey, EntitySnapshot, SnapshotValue};
use crate::core::{DbError, Result};
use crate::entity::Element;
use crate::metadata::{AttributeKind, CollectionKind, EntityType};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityChanges {
    /// Basic, embedded and owning to-one attributes whose value changed.
    pub attributes: Vec<String>,
    pub collections: Vec<CollectionChange>,
    pub elements: Vec<ElementChange>,
}

impl EntityChanges {
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty() && self.collections.is_empty() && self.elements.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectionChange {
    pub attribute: String,
    pub added: Vec<EntityKey>,
    pub removed: Vec<EntityKey>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElementChange {
    pub attribute: String,
    /// Delete every row of the owner before inserting `added`.
    pub rewrite: bool,
    pub removed: Vec<Element>,
    /// For lists, the complete list in order.
    pub added: Vec<Element>,
}

/// Compare the current state of an instance with its snapshot. `old` is
/// `None` for instances that have no row yet.
pub fn diff(entity_type: &EntityType, old: Option<&EntitySnapshot>, new: &EntitySnapshot) -> Result<EntityChanges> {
    let mut changes = EntityChanges::default();

    if let Some(old) = old {
        let key = &entity_type.id.name;
        if old.basic(key) != new.basic(key) {
            return Err(DbError::IllegalState(format!(
                "Key of managed {} changed from {} to {}",
                entity_type.name,
                old.basic(key),
                new.basic(key)
            )));
        }
    }

    for attribute in &entity_type.attributes {
        let Some(current) = new.get(&attribute.name) else {
            continue;
        };
        let previous = old.and_then(|old| old.get(&attribute.name));

        match (&attribute.kind, current) {
            (AttributeKind::Basic(_), _) | (AttributeKind::Embedded(_), _) | (_, SnapshotValue::Reference(_)) => {
                if let Some(previous) = previous
                    && previous != current
                {
                    changes.attributes.push(attribute.name.clone());
                }
            }
            (_, SnapshotValue::Collection(keys)) => {
                let (added, removed) = match (old, previous) {
                    (None, _) => (keys.clone(), Vec::new()),
                    (Some(_), Some(SnapshotValue::Collection(before))) => key_difference(before, keys),
                    // Loaded only after the snapshot was taken.
                    (Some(_), _) => continue,
                };
                if !added.is_empty() || !removed.is_empty() {
                    changes.collections.push(CollectionChange {
                        attribute: attribute.name.clone(),
                        added,
                        removed,
                    });
                }
            }
            (AttributeKind::Elements(mapping), SnapshotValue::Elements(elements)) => {
                let change = match (old, previous) {
                    (None, _) => ElementChange {
                        attribute: attribute.name.clone(),
                        rewrite: false,
                        removed: Vec::new(),
                        added: elements.clone(),
                    },
                    (Some(_), Some(SnapshotValue::Elements(before))) => {
                        if before == elements {
                            continue;
                        }
                        match mapping.kind {
                            CollectionKind::List => ElementChange {
                                attribute: attribute.name.clone(),
                                rewrite: true,
                                removed: Vec::new(),
                                added: elements.clone(),
                            },
                            CollectionKind::Set => ElementChange {
                                attribute: attribute.name.clone(),
                                rewrite: false,
                                removed: before.iter().filter(|e| !elements.contains(e)).cloned().collect(),
                                added: elements.iter().filter(|e| !before.contains(e)).cloned().collect(),
                            },
                        }
                    }
                    (Some(_), _) => continue,
                };
                if change.rewrite || !change.added.is_empty() || !change.removed.is_empty() {
                    changes.elements.push(change);
                }
            }
            _ => {}
        }
    }

    Ok(changes)
}

/// Keys in `after` but not `before`, and keys in `before` but not `after`.
pub fn key_difference(before: &[EntityKey], after: &[EntityKey]) -> (Vec<EntityKey>, Vec<EntityKey>) {
    let added = after
        .iter()
        .filter(|a| !before.iter().any(|b| b.key == a.key))
        .cloned()
        .collect();
    let removed = before
        .iter()
        .filter(|b| !after.iter().any(|a| a.key == b.key))
        .cloned()
        .collect();
    (added, removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{DataType, Value};
    use crate::entity::EmbeddedValue;
    use crate::metadata::{ElementCollectionDescriptor, EmbeddableDescriptor, EntityDescriptor, KeyStrategy, Metamodel};

    fn member_type() -> EntityType {
        let model = Metamodel::builder()
            .embeddable(EmbeddableDescriptor::new("Address").field("city", DataType::Text))
            .entity(
                EntityDescriptor::new("Member")
                    .id("id", DataType::Integer, KeyStrategy::Assigned)
                    .basic("username", DataType::Text)
                    .embedded("address", "Address")
                    .element_collection(ElementCollectionDescriptor::basic(
                        "favoriteFoods",
                        "FAVORITE_FOOD",
                        "MEMBER_ID",
                        "FOOD_NAME",
                        DataType::Text,
                    )),
            )
            .build()
            .unwrap();
        model.entity("Member").unwrap().clone()
    }

    fn snapshot(username: &str, city: &str, foods: &[&str]) -> EntitySnapshot {
        let mut snapshot = EntitySnapshot::default();
        snapshot.record("id", SnapshotValue::Basic(Value::Integer(1)));
        snapshot.record("username", SnapshotValue::Basic(Value::from(username)));
        snapshot.record(
            "address",
            SnapshotValue::Embedded(Some(EmbeddedValue::new().with("city", city))),
        );
        snapshot.record(
            "favoriteFoods",
            SnapshotValue::Elements(foods.iter().map(|f| Element::from(*f)).collect()),
        );
        snapshot
    }

    #[test]
    fn test_unchanged_instance_has_no_changes() {
        let member = member_type();
        let before = snapshot("member1", "Seoul", &["chicken"]);
        let changes = diff(&member, Some(&before), &before.clone()).unwrap();
        assert!(changes.is_empty());
    }

    #[test]
    fn test_changed_attributes_and_set_elements() {
        let member = member_type();
        let before = snapshot("member1", "Seoul", &["chicken", "jokbal"]);
        let after = snapshot("member1", "Busan", &["jokbal", "pizza"]);

        let changes = diff(&member, Some(&before), &after).unwrap();
        assert_eq!(changes.attributes, vec!["address"]);
        assert_eq!(changes.elements.len(), 1);
        assert_eq!(changes.elements[0].removed, vec![Element::from("chicken")]);
        assert_eq!(changes.elements[0].added, vec![Element::from("pizza")]);
        assert!(!changes.elements[0].rewrite);
    }

    #[test]
    fn test_new_instance_adds_all_elements() {
        let member = member_type();
        let after = snapshot("member1", "Seoul", &["chicken", "pizza"]);
        let changes = diff(&member, None, &after).unwrap();
        assert!(changes.attributes.is_empty());
        assert_eq!(changes.elements[0].added.len(), 2);
    }

    #[test]
    fn test_key_change_is_rejected() {
        let member = member_type();
        let before = snapshot("member1", "Seoul", &[]);
        let mut after = before.clone();
        after.record("id", SnapshotValue::Basic(Value::Integer(2)));
        assert!(matches!(diff(&member, Some(&before), &after), Err(DbError::IllegalState(_))));
    }

    #[test]
    fn test_key_difference() {
        let key = |k: i64| EntityKey {
            entity: "Member".into(),
            key: Value::Integer(k),
        };
        let (added, removed) = key_difference(&[key(1), key(2)], &[key(2), key(3)]);
        assert_eq!(added, vec![key(3)]);
        assert_eq!(removed, vec![key(1)]);
    }
}

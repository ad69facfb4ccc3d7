use super::EntityHandle;
use crate::core::Value;
use crate::metadata::CollectionKind;
use std::collections::BTreeMap;
use std::fmt;

/// Value of an embeddable: fields without identity, copied and compared
/// by value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct EmbeddedValue {
    fields: BTreeMap<String, Value>,
}

impl EmbeddedValue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.set(field, value);
        self
    }

    pub fn set(&mut self, field: &str, value: impl Into<Value>) {
        self.fields.insert(field.to_string(), value.into());
    }

    /// `Null` for fields that were never set.
    pub fn get(&self, field: &str) -> &Value {
        self.fields.get(field).unwrap_or(&Value::Null)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_all_null(&self) -> bool {
        self.fields.values().all(Value::is_null)
    }
}

impl fmt::Display for EmbeddedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.fields.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

/// One element of an element collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Element {
    Value(Value),
    Embedded(EmbeddedValue),
}

impl From<Value> for Element {
    fn from(value: Value) -> Self {
        Element::Value(value)
    }
}

impl From<&str> for Element {
    fn from(value: &str) -> Self {
        Element::Value(Value::from(value))
    }
}

impl From<i64> for Element {
    fn from(value: i64) -> Self {
        Element::Value(Value::Integer(value))
    }
}

impl From<EmbeddedValue> for Element {
    fn from(value: EmbeddedValue) -> Self {
        Element::Embedded(value)
    }
}

/// Loaded contents of an element collection. Sets ignore duplicate
/// inserts; lists keep order and duplicates.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementList {
    kind: CollectionKind,
    items: Vec<Element>,
}

impl ElementList {
    pub fn new(kind: CollectionKind) -> Self {
        Self {
            kind,
            items: Vec::new(),
        }
    }

    pub fn kind(&self) -> CollectionKind {
        self.kind
    }

    /// Returns false when a set already holds `element`.
    pub fn insert(&mut self, element: impl Into<Element>) -> bool {
        let element = element.into();
        if self.kind == CollectionKind::Set && self.items.contains(&element) {
            return false;
        }
        self.items.push(element);
        true
    }

    /// Removes the first occurrence.
    pub fn remove(&mut self, element: &Element) -> bool {
        match self.items.iter().position(|e| e == element) {
            Some(idx) => {
                self.items.remove(idx);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, element: &Element) -> bool {
        self.items.contains(element)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Element> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[Element] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

/// An association that has not been loaded yet.
#[derive(Debug, Clone, PartialEq)]
pub struct DeferredLoad {
    /// Declared target type.
    pub target: String,
    pub source: DeferredSource,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeferredSource {
    /// Foreign key read from the owner's row.
    Key(Value),
    /// Rows found through the owner's key, e.g. the inverse side of a
    /// relationship or an element collection table.
    Owner { key: Value },
}

impl DeferredLoad {
    pub fn by_key(target: &str, key: Value) -> Self {
        Self {
            target: target.to_string(),
            source: DeferredSource::Key(key),
        }
    }

    pub fn by_owner(target: &str, key: Value) -> Self {
        Self {
            target: target.to_string(),
            source: DeferredSource::Owner { key },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reference {
    Null,
    Instance(EntityHandle),
    Deferred(DeferredLoad),
}

#[derive(Debug, Clone, PartialEq)]
pub enum EntityCollection {
    Loaded(Vec<EntityHandle>),
    Deferred(DeferredLoad),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ElementValues {
    Loaded(ElementList),
    Deferred(DeferredLoad),
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Basic(Value),
    Embedded(Option<EmbeddedValue>),
    Reference(Reference),
    Collection(EntityCollection),
    Elements(ElementValues),
}

impl AttributeValue {
    pub fn is_deferred(&self) -> bool {
        matches!(
            self,
            AttributeValue::Reference(Reference::Deferred(_))
                | AttributeValue::Collection(EntityCollection::Deferred(_))
                | AttributeValue::Elements(ElementValues::Deferred(_))
        )
    }
}

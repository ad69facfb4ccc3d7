use super::{EntityData, EntityHandle, LifecycleState};
use crate::core::{DbError, Result, Value};
use crate::tracker::EntitySnapshot;

/// Bookkeeping for one instance.
#[derive(Debug, Clone)]
pub struct Slot {
    pub data: EntityData,
    pub state: LifecycleState,
    /// Key the instance is registered under in the identity map.
    pub key: Option<Value>,
    /// Last known persistent state; `None` until the row exists.
    pub snapshot: Option<EntitySnapshot>,
    /// Persisted in this unit of work and not flushed yet.
    pub pending_insert: bool,
}

/// Owns every instance a unit of work has created or loaded. Instances are
/// never freed before the unit of work itself, so handles stay valid.
#[derive(Debug)]
pub struct Arena {
    unit: u64,
    slots: Vec<Slot>,
}

impl Arena {
    pub fn new(unit: u64) -> Self {
        Self {
            unit,
            slots: Vec::new(),
        }
    }

    pub fn unit(&self) -> u64 {
        self.unit
    }

    pub fn alloc(&mut self, data: EntityData, state: LifecycleState) -> EntityHandle {
        self.slots.push(Slot {
            data,
            state,
            key: None,
            snapshot: None,
            pending_insert: false,
        });
        EntityHandle::new(self.unit, self.slots.len() - 1)
    }

    pub fn get(&self, handle: EntityHandle) -> Result<&Slot> {
        self.check(handle)?;
        Ok(&self.slots[handle.index()])
    }

    pub fn get_mut(&mut self, handle: EntityHandle) -> Result<&mut Slot> {
        self.check(handle)?;
        Ok(&mut self.slots[handle.index()])
    }

    /// Registered key, or the key attribute's current value.
    pub fn key_of(&self, handle: EntityHandle, key_attribute: &str) -> Option<Value> {
        let slot = self.slots.get(handle.index())?;
        if let Some(key) = &slot.key {
            return Some(key.clone());
        }
        match slot.data.get(key_attribute) {
            Some(super::AttributeValue::Basic(value)) if !value.is_null() => Some(value.clone()),
            _ => None,
        }
    }

    pub fn handles(&self) -> impl Iterator<Item = EntityHandle> + '_ {
        (0..self.slots.len()).map(|index| EntityHandle::new(self.unit, index))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn check(&self, handle: EntityHandle) -> Result<()> {
        if handle.unit() != self.unit {
            return Err(DbError::IllegalState(format!(
                "{} belongs to another unit of work",
                handle
            )));
        }
        if handle.index() >= self.slots.len() {
            return Err(DbError::IllegalState(format!("{} is not a known instance", handle)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DataType;
    use crate::metadata::{EntityDescriptor, KeyStrategy, Metamodel};

    #[test]
    fn test_handles_are_scoped_to_their_arena() {
        let model = Metamodel::builder()
            .entity(EntityDescriptor::new("Team").id("id", DataType::Integer, KeyStrategy::Assigned))
            .build()
            .unwrap();
        let team = model.entity("Team").unwrap();

        let mut first = Arena::new(1);
        let second = Arena::new(2);
        let handle = first.alloc(EntityData::new(team), LifecycleState::Transient);

        assert!(first.get(handle).is_ok());
        assert!(matches!(second.get(handle), Err(DbError::IllegalState(_))));
        assert_eq!(first.key_of(handle, "id"), None);

        first.get_mut(handle).unwrap().key = Some(Value::Integer(7));
        assert_eq!(first.key_of(handle, "id"), Some(Value::Integer(7)));
    }
}

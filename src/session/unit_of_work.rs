//! The unit of work: identity map, lifecycle transitions and attribute
//! access for the instances of one transaction.

use crate::config::{FlushMode, PersistenceConfig};
use crate::core::{DbError, Result, Value};
use crate::entity::{
    Arena, AttributeValue, ElementList, ElementValues, EmbeddedValue, EntityCollection, EntityData, EntityHandle,
    LifecycleState, Reference,
};
use crate::facade::DataSource;
use crate::metadata::{Attribute, AttributeKind, CascadeType, KeyStrategy, Metamodel};
use crate::result::QueryResult;
use crate::sql::{Params, Statement};
use crate::transaction::TransactionId;
use async_recursion::async_recursion;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{Level, event};
use uuid::Uuid;

static NEXT_UNIT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitStatus {
    Active,
    /// A flush, timeout or cancellation aborted the transaction; only
    /// `rollback` is accepted.
    Failed,
    Committed,
    RolledBack,
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UnitStatus::Active => "active",
            UnitStatus::Failed => "failed",
            UnitStatus::Committed => "committed",
            UnitStatus::RolledBack => "rolled back",
        };
        write!(f, "{}", name)
    }
}

/// Cancels a unit of work from another task. The transaction is rolled back
/// right away, even while the unit of work is idle; its in-flight
/// data-source call, or the next one, fails with [`DbError::Cancelled`].
#[derive(Debug, Clone)]
pub struct CancelHandle {
    cancelled: Arc<watch::Sender<bool>>,
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self {
            cancelled: Arc::new(watch::channel(false).0),
        }
    }
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.cancelled.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.borrow()
    }

    async fn cancelled(&self) {
        let mut receiver = self.cancelled.subscribe();
        // The sender lives as long as this handle.
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }
}

/// Roll `txn` back once `deadline` passes or `cancel` fires, whether or not
/// the unit of work is using the data source at that moment.
fn watch_expiry(
    source: Arc<dyn DataSource>,
    txn: TransactionId,
    unit: u64,
    deadline: Option<Instant>,
    cancel: CancelHandle,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let expired = async {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };
        let reason = tokio::select! {
            _ = expired => "timed out",
            _ = cancel.cancelled() => "cancelled",
        };
        match source.rollback(txn).await {
            Ok(()) => event!(Level::INFO, unit, txn = %txn, reason, "transaction released"),
            Err(error) => event!(Level::WARN, unit, txn = %txn, error = %error, "rollback of expired unit of work failed"),
        }
    })
}

/// One transaction's worth of tracked instances.
///
/// Every instance is addressed by an [`EntityHandle`] issued by this unit of
/// work; handles from another unit of work are rejected. Managed instances are
/// unique per (root entity type, key), so two lookups of the same row yield
/// the same handle.
pub struct UnitOfWork {
    pub(super) id: u64,
    pub(super) model: Arc<Metamodel>,
    pub(super) source: Arc<dyn DataSource>,
    pub(super) config: PersistenceConfig,
    pub(super) txn: TransactionId,
    pub(super) status: UnitStatus,
    pub(super) arena: Arena,
    /// Managed and removed instances by (root entity type, key).
    pub(super) identity: HashMap<(String, Value), EntityHandle>,
    pub(super) deadline: Option<Instant>,
    pub(super) cancel: CancelHandle,
    expiry: JoinHandle<()>,
}

impl UnitOfWork {
    pub(crate) async fn begin(
        model: Arc<Metamodel>,
        source: Arc<dyn DataSource>,
        config: PersistenceConfig,
    ) -> Result<Self> {
        let id = NEXT_UNIT_ID.fetch_add(1, Ordering::Relaxed);
        let txn = source.begin().await?;
        let deadline = config.unit_timeout.map(|timeout| Instant::now() + timeout);
        let cancel = CancelHandle::default();
        let expiry = watch_expiry(source.clone(), txn, id, deadline, cancel.clone());
        event!(Level::DEBUG, unit = id, txn = %txn, persistence_unit = %config.unit_name, "unit of work opened");

        Ok(Self {
            id,
            model,
            source,
            config,
            txn,
            status: UnitStatus::Active,
            arena: Arena::new(id),
            identity: HashMap::new(),
            deadline,
            cancel,
            expiry,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn status(&self) -> UnitStatus {
        self.status
    }

    pub fn transaction_id(&self) -> TransactionId {
        self.txn
    }

    pub fn metamodel(&self) -> &Metamodel {
        &self.model
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Abort the transaction now. Later operations fail; `rollback` still
    /// detaches everything.
    pub async fn cancel(&mut self) {
        self.cancel.cancel();
        if self.status == UnitStatus::Active
            && let Err(error) = self.fail::<()>(DbError::Cancelled).await
        {
            event!(Level::DEBUG, unit = self.id, error = %error, "unit of work cancelled");
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// New transient instance of a concrete entity type.
    pub fn instantiate(&mut self, entity: &str) -> Result<EntityHandle> {
        self.ensure_active()?;
        let entity_type = self.model.require_entity(entity)?;
        if entity_type.is_abstract {
            return Err(DbError::IllegalState(format!(
                "Cannot instantiate abstract entity '{}'",
                entity
            )));
        }
        Ok(self.arena.alloc(EntityData::new(entity_type), LifecycleState::Transient))
    }

    /// Make a transient instance managed, assigning its key. The row is
    /// written at the next flush. Persisting a managed instance only cascades.
    pub async fn persist(&mut self, handle: EntityHandle) -> Result<()> {
        self.ensure_active()?;
        let state = self.arena.get(handle)?.state;
        if matches!(state, LifecycleState::Removed | LifecycleState::Detached) {
            return Err(DbError::IllegalState(format!(
                "Cannot persist {} instance {}",
                state, handle
            )));
        }
        self.cascade_persist(handle, &mut HashSet::new()).await
    }

    #[async_recursion]
    pub(super) async fn cascade_persist(
        &mut self,
        handle: EntityHandle,
        visited: &mut HashSet<EntityHandle>,
    ) -> Result<()> {
        if !visited.insert(handle) {
            return Ok(());
        }
        match self.arena.get(handle)?.state {
            LifecycleState::Transient => self.attach_new(handle).await?,
            LifecycleState::Managed => {}
            LifecycleState::Removed => return Ok(()),
            LifecycleState::Detached => {
                return Err(DbError::IllegalState(format!(
                    "Cannot cascade persist to detached instance {}",
                    handle
                )));
            }
        }
        for target in self.cascade_targets(handle, CascadeType::Persist)? {
            self.cascade_persist(target, visited).await?;
        }
        Ok(())
    }

    async fn attach_new(&mut self, handle: EntityHandle) -> Result<()> {
        let model = self.model.clone();
        let entity_type = model.require_entity(self.arena.get(handle)?.data.entity())?;
        let current = self.arena.get(handle)?.data.key(entity_type).clone();

        let key = if !current.is_null() {
            current
        } else {
            match entity_type.id.strategy {
                KeyStrategy::Assigned => {
                    return Err(DbError::IllegalState(format!(
                        "{} {} needs an assigned '{}' before persist",
                        entity_type.name, handle, entity_type.id.name
                    )));
                }
                KeyStrategy::Sequence => {
                    let sequence = format!("{}_SEQ", entity_type.root);
                    let source = self.source.clone();
                    Value::Integer(self.bounded(source.next_sequence_value(&sequence)).await?)
                }
                KeyStrategy::Uuid => Value::Text(Uuid::new_v4().to_string()),
            }
        };

        let identity = (entity_type.root.clone(), key.clone());
        if self.identity.contains_key(&identity) {
            return Err(DbError::DuplicateKey {
                entity: entity_type.name.clone(),
                key: key.to_string(),
            });
        }

        let slot = self.arena.get_mut(handle)?;
        slot.data.set(&entity_type.id.name, AttributeValue::Basic(key.clone()));
        slot.key = Some(key);
        slot.state = LifecycleState::Managed;
        slot.pending_insert = true;
        self.identity.insert(identity, handle);
        event!(Level::TRACE, unit = self.id, %handle, entity = %entity_type.name, "persisted");
        Ok(())
    }

    /// Managed instance of `entity` (or a subtype) with `key`. The identity
    /// map is consulted before the data source. Removed instances and
    /// instances of an unrelated type are not found.
    pub async fn find(&mut self, entity: &str, key: impl Into<Value>) -> Result<Option<EntityHandle>> {
        self.ensure_active()?;
        let key = key.into();
        let model = self.model.clone();
        let entity_type = model.require_entity(entity)?;
        if key.is_null() {
            return Ok(None);
        }

        if let Some(&handle) = self.identity.get(&(entity_type.root.clone(), key.clone())) {
            let slot = self.arena.get(handle)?;
            let visible =
                slot.state == LifecycleState::Managed && model.is_assignable(slot.data.entity(), &entity_type.name);
            return Ok(visible.then_some(handle));
        }

        self.load_by_key(entity_type, key).await
    }

    /// Schedule a managed instance for deletion, cascading along `Remove`
    /// relationships.
    pub async fn remove(&mut self, handle: EntityHandle) -> Result<()> {
        self.ensure_active()?;
        let state = self.arena.get(handle)?.state;
        if state != LifecycleState::Managed {
            return Err(DbError::IllegalState(format!(
                "Cannot remove {} instance {}",
                state, handle
            )));
        }
        self.cascade_remove(handle, &mut HashSet::new()).await
    }

    #[async_recursion]
    pub(super) async fn cascade_remove(
        &mut self,
        handle: EntityHandle,
        visited: &mut HashSet<EntityHandle>,
    ) -> Result<()> {
        if !visited.insert(handle) || self.arena.get(handle)?.state != LifecycleState::Managed {
            return Ok(());
        }
        self.arena.get_mut(handle)?.state = LifecycleState::Removed;
        event!(Level::TRACE, unit = self.id, %handle, "removed");

        let model = self.model.clone();
        let entity_type = model.require_entity(self.arena.get(handle)?.data.entity())?;
        for attribute in &entity_type.attributes {
            if attribute.relationship().is_some_and(|rel| rel.cascades(CascadeType::Remove)) {
                self.resolve_attribute(handle, &attribute.name).await?;
            }
        }
        for target in self.cascade_targets(handle, CascadeType::Remove)? {
            self.cascade_remove(target, visited).await?;
        }
        Ok(())
    }

    /// Instances reachable through loaded relationships that cascade `cascade`.
    pub(super) fn cascade_targets(&self, handle: EntityHandle, cascade: CascadeType) -> Result<Vec<EntityHandle>> {
        let slot = self.arena.get(handle)?;
        let entity_type = self.model.require_entity(slot.data.entity())?;
        let mut targets = Vec::new();
        for attribute in &entity_type.attributes {
            if !attribute.relationship().is_some_and(|rel| rel.cascades(cascade)) {
                continue;
            }
            match slot.data.get(&attribute.name) {
                Some(AttributeValue::Reference(Reference::Instance(target))) => targets.push(*target),
                Some(AttributeValue::Collection(EntityCollection::Loaded(handles))) => {
                    targets.extend(handles.iter().copied())
                }
                _ => {}
            }
        }
        Ok(targets)
    }

    /// Stop tracking one instance. Unflushed changes to it are discarded.
    pub fn detach(&mut self, handle: EntityHandle) -> Result<()> {
        self.ensure_active()?;
        let model = self.model.clone();
        let slot = self.arena.get_mut(handle)?;
        if !matches!(slot.state, LifecycleState::Managed | LifecycleState::Removed) {
            return Ok(());
        }
        slot.state = LifecycleState::Detached;
        slot.pending_insert = false;
        let root = model.require_entity(slot.data.entity())?.root.clone();
        if let Some(key) = slot.key.clone() {
            self.identity.remove(&(root, key));
        }
        Ok(())
    }

    /// Detach every instance.
    pub fn clear(&mut self) -> Result<()> {
        self.ensure_active()?;
        self.detach_all();
        Ok(())
    }

    pub(super) fn detach_all(&mut self) {
        let handles: Vec<_> = self.arena.handles().collect();
        for handle in handles {
            if let Ok(slot) = self.arena.get_mut(handle)
                && matches!(slot.state, LifecycleState::Managed | LifecycleState::Removed)
            {
                slot.state = LifecycleState::Detached;
                slot.pending_insert = false;
            }
        }
        self.identity.clear();
    }

    pub fn contains(&self, handle: EntityHandle) -> bool {
        matches!(self.arena.get(handle), Ok(slot) if slot.state == LifecycleState::Managed)
    }

    pub fn state(&self, handle: EntityHandle) -> Result<LifecycleState> {
        Ok(self.arena.get(handle)?.state)
    }

    /// Concrete entity type of an instance.
    pub fn entity_of(&self, handle: EntityHandle) -> Result<&str> {
        Ok(self.arena.get(handle)?.data.entity())
    }

    pub fn key_of(&self, handle: EntityHandle) -> Result<Value> {
        let slot = self.arena.get(handle)?;
        let entity_type = self.model.require_entity(slot.data.entity())?;
        self.arena
            .key_of(handle, &entity_type.id.name)
            .ok_or_else(|| DbError::IllegalState(format!("{} has no key yet", handle)))
    }

    pub(super) fn handles_in(&self, state: LifecycleState) -> Vec<EntityHandle> {
        self.arena
            .handles()
            .filter(|handle| self.arena.get(*handle).is_ok_and(|slot| slot.state == state))
            .collect()
    }

    // ========================================================================
    // Attributes
    // ========================================================================

    /// Value of a basic or key attribute.
    pub fn get(&self, handle: EntityHandle, attribute: &str) -> Result<Value> {
        let slot = self.arena.get(handle)?;
        match slot.data.get(attribute) {
            Some(AttributeValue::Basic(value)) => Ok(value.clone()),
            Some(_) => Err(not_a(slot.data.entity(), attribute, "basic attribute")),
            None => Err(no_attribute(slot.data.entity(), attribute)),
        }
    }

    pub fn get_mut(&mut self, handle: EntityHandle, attribute: &str) -> Result<&mut Value> {
        self.ensure_mutable(handle)?;
        let slot = self.arena.get_mut(handle)?;
        let entity = slot.data.entity().to_string();
        match slot.data.get_mut(attribute) {
            Some(AttributeValue::Basic(value)) => Ok(value),
            _ => Err(not_a(&entity, attribute, "basic attribute")),
        }
    }

    pub fn set(&mut self, handle: EntityHandle, attribute: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        self.ensure_mutable(handle)?;
        let model = self.model.clone();
        let slot = self.arena.get_mut(handle)?;
        let entity_type = model.require_entity(slot.data.entity())?;

        let (data_type, enumeration) = if entity_type.is_id(attribute) {
            (entity_type.id.data_type, None)
        } else {
            match entity_type.attribute(attribute).map(|a| &a.kind) {
                Some(AttributeKind::Basic(basic)) => (basic.data_type, basic.enumeration.as_deref()),
                Some(_) => return Err(not_a(&entity_type.name, attribute, "basic attribute")),
                None => return Err(no_attribute(&entity_type.name, attribute)),
            }
        };
        if !data_type.is_compatible(&value) {
            return Err(DbError::TypeMismatch(format!(
                "'{}.{}' expects {}, got {}",
                entity_type.name,
                attribute,
                data_type,
                value.type_name()
            )));
        }
        if let (Some(enumeration), Some(constant)) = (enumeration.and_then(|name| model.enumeration(name)), value.as_str())
            && !enumeration.contains(constant)
        {
            return Err(DbError::TypeMismatch(format!(
                "'{}.{}' expects a constant of {}, got '{}'",
                entity_type.name, attribute, enumeration.name, constant
            )));
        }

        slot.data.set(attribute, AttributeValue::Basic(value));
        Ok(())
    }

    /// Embedded value, `None` when every field is NULL.
    pub fn embedded(&self, handle: EntityHandle, attribute: &str) -> Result<Option<EmbeddedValue>> {
        let slot = self.arena.get(handle)?;
        match slot.data.get(attribute) {
            Some(AttributeValue::Embedded(value)) => Ok(value.clone()),
            Some(_) => Err(not_a(slot.data.entity(), attribute, "embedded attribute")),
            None => Err(no_attribute(slot.data.entity(), attribute)),
        }
    }

    /// Replace an embedded value as a whole.
    pub fn set_embedded(&mut self, handle: EntityHandle, attribute: &str, value: Option<EmbeddedValue>) -> Result<()> {
        self.ensure_mutable(handle)?;
        let model = self.model.clone();
        let slot = self.arena.get_mut(handle)?;
        let entity_type = model.require_entity(slot.data.entity())?;
        let Some(AttributeKind::Embedded(mapping)) = entity_type.attribute(attribute).map(|a| &a.kind) else {
            return Err(not_a(&entity_type.name, attribute, "embedded attribute"));
        };
        if let Some(value) = &value
            && let Some((field, _)) = value.fields().find(|(field, _)| !mapping.fields.iter().any(|f| f.field == *field))
        {
            return Err(DbError::Mapping(format!(
                "Embeddable '{}' has no field '{}'",
                mapping.embeddable, field
            )));
        }

        slot.data.set(attribute, AttributeValue::Embedded(value.filter(|v| !v.is_all_null())));
        Ok(())
    }

    /// Target of a single-valued association, loading it if deferred.
    pub async fn reference(&mut self, handle: EntityHandle, attribute: &str) -> Result<Option<EntityHandle>> {
        self.resolve_attribute(handle, attribute).await?;
        let slot = self.arena.get(handle)?;
        match slot.data.get(attribute) {
            Some(AttributeValue::Reference(Reference::Instance(target))) => Ok(Some(*target)),
            Some(AttributeValue::Reference(_)) => Ok(None),
            Some(_) => Err(not_a(slot.data.entity(), attribute, "single-valued association")),
            None => Err(no_attribute(slot.data.entity(), attribute)),
        }
    }

    pub fn set_reference(&mut self, handle: EntityHandle, attribute: &str, target: Option<EntityHandle>) -> Result<()> {
        self.ensure_mutable(handle)?;
        let model = self.model.clone();
        let entity_type = model.require_entity(self.arena.get(handle)?.data.entity())?;
        let rel = match entity_type.attribute(attribute).and_then(Attribute::relationship) {
            Some(rel) if !rel.cardinality.is_collection() => rel,
            _ => return Err(not_a(&entity_type.name, attribute, "single-valued association")),
        };

        let reference = match target {
            Some(target) => {
                let target_entity = self.arena.get(target)?.data.entity();
                if !model.is_assignable(target_entity, &rel.target) {
                    return Err(DbError::TypeMismatch(format!(
                        "'{}.{}' expects {}, got {}",
                        entity_type.name, attribute, rel.target, target_entity
                    )));
                }
                Reference::Instance(target)
            }
            None => Reference::Null,
        };
        self.arena.get_mut(handle)?.data.set(attribute, AttributeValue::Reference(reference));
        Ok(())
    }

    /// Members of a collection association, loading them if deferred.
    pub async fn collection(&mut self, handle: EntityHandle, attribute: &str) -> Result<Vec<EntityHandle>> {
        self.resolve_attribute(handle, attribute).await?;
        let slot = self.arena.get(handle)?;
        match slot.data.get(attribute) {
            Some(AttributeValue::Collection(EntityCollection::Loaded(handles))) => Ok(handles.clone()),
            _ => Err(not_a(slot.data.entity(), attribute, "collection association")),
        }
    }

    pub async fn collection_mut(&mut self, handle: EntityHandle, attribute: &str) -> Result<&mut Vec<EntityHandle>> {
        self.ensure_mutable(handle)?;
        self.resolve_attribute(handle, attribute).await?;
        let slot = self.arena.get_mut(handle)?;
        let entity = slot.data.entity().to_string();
        match slot.data.get_mut(attribute) {
            Some(AttributeValue::Collection(EntityCollection::Loaded(handles))) => Ok(handles),
            _ => Err(not_a(&entity, attribute, "collection association")),
        }
    }

    /// Element collection contents, loading them if deferred.
    pub async fn elements(&mut self, handle: EntityHandle, attribute: &str) -> Result<ElementList> {
        self.resolve_attribute(handle, attribute).await?;
        let slot = self.arena.get(handle)?;
        match slot.data.get(attribute) {
            Some(AttributeValue::Elements(ElementValues::Loaded(list))) => Ok(list.clone()),
            _ => Err(not_a(slot.data.entity(), attribute, "element collection")),
        }
    }

    pub async fn elements_mut(&mut self, handle: EntityHandle, attribute: &str) -> Result<&mut ElementList> {
        self.ensure_mutable(handle)?;
        self.resolve_attribute(handle, attribute).await?;
        let slot = self.arena.get_mut(handle)?;
        let entity = slot.data.entity().to_string();
        match slot.data.get_mut(attribute) {
            Some(AttributeValue::Elements(ElementValues::Loaded(list))) => Ok(list),
            _ => Err(not_a(&entity, attribute, "element collection")),
        }
    }

    // ========================================================================
    // Data-source access
    // ========================================================================

    pub(super) fn ensure_active(&self) -> Result<()> {
        match self.status {
            UnitStatus::Active => Ok(()),
            status => Err(DbError::IllegalState(format!("Unit of work {} is {}", self.id, status))),
        }
    }

    fn ensure_mutable(&self, handle: EntityHandle) -> Result<()> {
        self.ensure_active()?;
        match self.arena.get(handle)?.state {
            LifecycleState::Transient | LifecycleState::Managed => Ok(()),
            state => Err(DbError::IllegalState(format!(
                "Cannot modify {} instance {}",
                state, handle
            ))),
        }
    }

    /// Abort the data-source transaction and mark the unit of work failed.
    pub(super) async fn fail<T>(&mut self, error: DbError) -> Result<T> {
        if self.status == UnitStatus::Active {
            if let Err(rollback_error) = self.source.rollback(self.txn).await {
                event!(Level::WARN, unit = self.id, error = %rollback_error, "rollback after failure did not complete");
            }
            self.status = UnitStatus::Failed;
            event!(Level::WARN, unit = self.id, txn = %self.txn, error = %error, "unit of work failed");
        }
        Err(error)
    }

    /// The transaction is finished; nothing is left for the expiry watcher.
    pub(super) fn stop_expiry(&self) {
        self.expiry.abort();
    }

    fn timeout_error(&self) -> DbError {
        DbError::Timeout(format!(
            "Unit of work {} exceeded its {:?} limit",
            self.id,
            self.config.unit_timeout.unwrap_or_default()
        ))
    }

    /// Fail the unit of work if it was cancelled or its deadline has passed.
    pub(super) async fn ensure_unexpired(&mut self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return self.fail(DbError::Cancelled).await;
        }
        if let Some(deadline) = self.deadline
            && Instant::now() >= deadline
        {
            let error = self.timeout_error();
            return self.fail(error).await;
        }
        Ok(())
    }

    /// Run one data-source call under the unit's deadline and cancellation.
    pub(super) async fn bounded<T, F>(&mut self, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send,
        T: Send,
    {
        self.ensure_unexpired().await?;
        let deadline = self.deadline;
        let cancel = self.cancel.clone();
        let timed = async move {
            match deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, call).await.ok(),
                None => Some(call.await),
            }
        };

        tokio::select! {
            outcome = timed => match outcome {
                Some(result) => result,
                None => {
                    let error = self.timeout_error();
                    self.fail(error).await
                }
            },
            _ = cancel.cancelled() => self.fail(DbError::Cancelled).await,
        }
    }

    /// Execute one statement in this unit's transaction.
    pub(super) async fn round_trip(&mut self, statement: &Statement, params: &Params) -> Result<QueryResult> {
        self.ensure_active()?;
        if self.config.show_sql {
            log::info!(target: "memorm::sql", "{} {}", statement, params);
        } else {
            log::debug!(target: "memorm::sql", "{} {}", statement, params);
        }
        let source = self.source.clone();
        let txn = self.txn;
        self.bounded(source.execute(txn, statement, params)).await
    }

    pub(super) async fn auto_flush(&mut self) -> Result<()> {
        if self.config.flush_mode == FlushMode::Auto {
            self.flush().await?;
        }
        Ok(())
    }
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        self.expiry.abort();
        if self.status != UnitStatus::Active {
            return;
        }
        let source = self.source.clone();
        let txn = self.txn;
        let unit = self.id;
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                if let Err(error) = source.rollback(txn).await {
                    log::warn!("Rollback of abandoned unit of work {} failed: {}", unit, error);
                }
            });
        }
    }
}

impl fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("id", &self.id)
            .field("txn", &self.txn)
            .field("status", &self.status)
            .field("tracked", &self.identity.len())
            .finish()
    }
}

pub(super) fn no_attribute(entity: &str, attribute: &str) -> DbError {
    DbError::Mapping(format!("Entity '{}' has no attribute '{}'", entity, attribute))
}

fn not_a(entity: &str, attribute: &str, what: &str) -> DbError {
    DbError::Mapping(format!("'{}.{}' is not a {}", entity, attribute, what))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_handle_is_shared() {
        let handle = CancelHandle::default();
        let other = handle.clone();
        assert!(!other.is_cancelled());
        handle.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(UnitStatus::RolledBack.to_string(), "rolled back");
        assert_eq!(UnitStatus::Failed.to_string(), "failed");
    }
}

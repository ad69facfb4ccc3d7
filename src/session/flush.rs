// ============================================================================
// Flush, commit and rollback
// ============================================================================
//
// A flush cascades persists, removes orphans, diffs every managed instance
// against its snapshot and issues the planned writes in the unit's
// transaction. Any failure aborts the transaction: the data source never
// keeps part of a flush.

use super::unit_of_work::{UnitOfWork, UnitStatus};
use crate::core::{DbError, Result, Value};
use crate::entity::{AttributeValue, DeferredSource, EntityCollection, EntityHandle, LifecycleState, Reference};
use crate::metadata::EntityType;
use crate::tracker::{self, ChangeSet, EntityChanges, EntitySnapshot, EntityWrite, FlushReport};
use std::collections::HashSet;
use tracing::{Instrument, Level, event, info_span};

impl UnitOfWork {
    /// Write pending changes without committing.
    pub async fn flush(&mut self) -> Result<FlushReport> {
        self.ensure_active()?;
        self.ensure_unexpired().await?;
        let span = info_span!("memorm.flush", unit = self.id, txn = %self.txn);
        match self.write_changes().instrument(span).await {
            Ok(report) => Ok(report),
            Err(error) => self.fail(error).await,
        }
    }

    async fn write_changes(&mut self) -> Result<FlushReport> {
        let mut visited = HashSet::new();
        for handle in self.handles_in(LifecycleState::Managed) {
            self.cascade_persist(handle, &mut visited).await?;
        }
        self.remove_orphans().await?;

        let changes = self.change_set()?;
        let model = self.model.clone();
        let plan = tracker::plan(&model, &changes)?;

        let mut report = FlushReport::default();
        for write in &plan.writes {
            self.round_trip(&write.statement, &write.params).await?;
            report.record(write.kind, write.statement.to_string());
        }
        self.after_flush()?;

        if !report.is_empty() {
            event!(Level::DEBUG, unit = self.id, %report, "flushed");
        }
        Ok(report)
    }

    /// Removes targets dropped from an orphan-removing relationship since the
    /// last flush.
    async fn remove_orphans(&mut self) -> Result<()> {
        let model = self.model.clone();
        let mut orphans = Vec::new();

        for handle in self.handles_in(LifecycleState::Managed) {
            let slot = self.arena.get(handle)?;
            let Some(snapshot) = &slot.snapshot else {
                continue;
            };
            let entity_type = model.require_entity(slot.data.entity())?;
            for attribute in &entity_type.attributes {
                let Some(rel) = attribute.relationship() else {
                    continue;
                };
                if !rel.orphan_removal {
                    continue;
                }
                let target = model.require_entity(&rel.target)?;

                let dropped: Vec<Value> = match slot.data.get(&attribute.name) {
                    Some(AttributeValue::Collection(EntityCollection::Loaded(current))) => {
                        let current: Vec<Value> = current
                            .iter()
                            .filter_map(|h| self.arena.key_of(*h, &target.id.name))
                            .collect();
                        snapshot
                            .collection(&attribute.name)
                            .unwrap_or_default()
                            .iter()
                            .filter(|before| !current.contains(&before.key))
                            .map(|before| before.key.clone())
                            .collect()
                    }
                    Some(AttributeValue::Reference(reference)) if attribute.join_column().is_some() => {
                        let current = match reference {
                            Reference::Instance(h) => self.arena.key_of(*h, &target.id.name),
                            Reference::Deferred(deferred) => match &deferred.source {
                                DeferredSource::Key(key) => Some(key.clone()),
                                DeferredSource::Owner { .. } => None,
                            },
                            Reference::Null => None,
                        };
                        match snapshot.reference(&attribute.name) {
                            Some(before) if current.as_ref() != Some(before) => vec![before.clone()],
                            _ => Vec::new(),
                        }
                    }
                    _ => Vec::new(),
                };

                for key in dropped {
                    if let Some(&orphan) = self.identity.get(&(target.root.clone(), key)) {
                        orphans.push(orphan);
                    }
                }
            }
        }

        let mut visited = HashSet::new();
        for orphan in orphans {
            event!(Level::TRACE, unit = self.id, %orphan, "orphan removed");
            self.cascade_remove(orphan, &mut visited).await?;
        }
        Ok(())
    }

    fn change_set(&self) -> Result<ChangeSet> {
        let mut changes = ChangeSet::default();
        for handle in self.arena.handles() {
            let slot = self.arena.get(handle)?;
            let entity_type = self.model.require_entity(slot.data.entity())?;
            match slot.state {
                LifecycleState::Managed => {
                    self.check_targets(handle, entity_type)?;
                    let key = self.key_of(handle)?;
                    let current = EntitySnapshot::capture(&self.model, entity_type, &slot.data, &self.arena)?;
                    match &slot.snapshot {
                        None => {
                            let diffed = tracker::diff(entity_type, None, &current)?;
                            changes.inserts.push(EntityWrite {
                                handle,
                                entity: entity_type.name.clone(),
                                key,
                                state: current,
                                changes: diffed,
                            });
                        }
                        Some(previous) => {
                            let diffed = tracker::diff(entity_type, Some(previous), &current)?;
                            if !diffed.is_empty() {
                                changes.updates.push(EntityWrite {
                                    handle,
                                    entity: entity_type.name.clone(),
                                    key,
                                    state: current,
                                    changes: diffed,
                                });
                            }
                        }
                    }
                }
                LifecycleState::Removed => {
                    if let (Some(previous), Some(key)) = (&slot.snapshot, &slot.key) {
                        changes.deletes.push(EntityWrite {
                            handle,
                            entity: entity_type.name.clone(),
                            key: key.clone(),
                            state: previous.clone(),
                            changes: EntityChanges::default(),
                        });
                    }
                }
                LifecycleState::Transient | LifecycleState::Detached => {}
            }
        }
        Ok(changes)
    }

    /// Managed instances may only refer to persisted instances.
    fn check_targets(&self, handle: EntityHandle, entity_type: &EntityType) -> Result<()> {
        let slot = self.arena.get(handle)?;
        for attribute in &entity_type.attributes {
            let targets: &[EntityHandle] = match slot.data.get(&attribute.name) {
                Some(AttributeValue::Reference(Reference::Instance(target))) => std::slice::from_ref(target),
                Some(AttributeValue::Collection(EntityCollection::Loaded(targets))) => targets,
                _ => continue,
            };
            for &target in targets {
                if self.arena.get(target)?.state == LifecycleState::Transient {
                    return Err(DbError::IllegalState(format!(
                        "'{}.{}' of {} refers to transient instance {}; persist it or cascade persist to it",
                        entity_type.name, attribute.name, handle, target
                    )));
                }
            }
        }
        Ok(())
    }

    /// Flushed state becomes the new snapshot; removed instances leave the
    /// identity map.
    fn after_flush(&mut self) -> Result<()> {
        let model = self.model.clone();
        let handles: Vec<_> = self.arena.handles().collect();
        for handle in handles {
            let slot = self.arena.get(handle)?;
            let entity_type = model.require_entity(slot.data.entity())?;
            match slot.state {
                LifecycleState::Managed => {
                    let snapshot = EntitySnapshot::capture(&model, entity_type, &slot.data, &self.arena)?;
                    let slot = self.arena.get_mut(handle)?;
                    slot.snapshot = Some(snapshot);
                    slot.pending_insert = false;
                }
                LifecycleState::Removed => {
                    let slot = self.arena.get_mut(handle)?;
                    slot.snapshot = None;
                    slot.pending_insert = false;
                    if let Some(key) = slot.key.take() {
                        self.identity.remove(&(entity_type.root.clone(), key));
                    }
                }
                LifecycleState::Transient | LifecycleState::Detached => {}
            }
        }
        Ok(())
    }

    /// Flush, commit the transaction and detach every instance. On failure
    /// the unit of work is rolled back.
    pub async fn commit(&mut self) -> Result<FlushReport> {
        self.ensure_active()?;
        let span = info_span!("memorm.commit", unit = self.id, txn = %self.txn);
        match self.flush_and_commit().instrument(span).await {
            Ok(report) => Ok(report),
            Err(error) => {
                event!(Level::ERROR, unit = self.id, error = %error, "commit failed");
                if let Err(rollback_error) = self.rollback().await {
                    event!(Level::WARN, unit = self.id, error = %rollback_error, "rollback after failed commit did not complete");
                }
                Err(error)
            }
        }
    }

    async fn flush_and_commit(&mut self) -> Result<FlushReport> {
        let report = self.flush().await?;
        let source = self.source.clone();
        let txn = self.txn;
        self.bounded(source.commit(txn)).await?;
        self.stop_expiry();
        self.detach_all();
        self.status = UnitStatus::Committed;
        event!(Level::INFO, unit = self.id, txn = %txn, statements = report.statement_count(), "committed");
        Ok(report)
    }

    /// Discard the transaction and detach every instance. Rolling back a
    /// finished unit of work does nothing.
    pub async fn rollback(&mut self) -> Result<()> {
        if matches!(self.status, UnitStatus::Committed | UnitStatus::RolledBack) {
            return Ok(());
        }
        let span = info_span!("memorm.rollback", unit = self.id, txn = %self.txn);
        let source = self.source.clone();
        let txn = self.txn;
        async { source.rollback(txn).await }.instrument(span).await?;

        self.stop_expiry();
        self.detach_all();
        self.status = UnitStatus::RolledBack;
        event!(Level::INFO, unit = self.id, txn = %txn, "rolled back");
        Ok(())
    }
}

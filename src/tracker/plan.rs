// ============================================================================
// Write planning
// ============================================================================
//
// Turns a change set into parameterized statements, in an order the
// data source's foreign keys accept:
//
//   entity inserts (referenced rows first)
//   -> foreign keys left NULL to break insert cycles
//   -> collection rows added
//   -> entity updates
//   -> collection rows removed
//   -> rows owned by removed instances
//   -> entity deletes (referencing rows first)

use super::diff::{CollectionChange, ElementChange, EntityChanges};
use super::snapshot::EntitySnapshot;
use crate::core::{DbError, Result, Value};
use crate::entity::{Element, EntityHandle};
use crate::metadata::{AttributeKind, ElementMapping, ElementShape, EntityType, Metamodel, RelationshipMapping};
use crate::sql::{Assignment, DeleteStmt, Expr, InsertStmt, ParamRef, Params, Statement, TableRef, UpdateStmt};
use std::collections::{HashMap, HashSet};

/// One instance that needs writing.
#[derive(Debug, Clone)]
pub struct EntityWrite {
    pub handle: EntityHandle,
    /// Concrete type.
    pub entity: String,
    pub key: Value,
    /// Current state for inserts and updates, last flushed state for deletes.
    pub state: EntitySnapshot,
    pub changes: EntityChanges,
}

#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub inserts: Vec<EntityWrite>,
    pub updates: Vec<EntityWrite>,
    pub deletes: Vec<EntityWrite>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Insert,
    Update,
    Delete,
    /// Link, element or foreign-key rows of a collection.
    Collection,
}

#[derive(Debug, Clone)]
pub struct PlannedWrite {
    pub kind: WriteKind,
    pub statement: Statement,
    pub params: Params,
}

#[derive(Debug, Clone, Default)]
pub struct WritePlan {
    pub writes: Vec<PlannedWrite>,
}

impl WritePlan {
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    fn push(&mut self, kind: WriteKind, (statement, params): (Statement, Params)) {
        self.writes.push(PlannedWrite { kind, statement, params });
    }
}

pub fn plan(model: &Metamodel, changes: &ChangeSet) -> Result<WritePlan> {
    let mut plan = WritePlan::default();

    let (insert_order, fixups) = insert_order(model, &changes.inserts)?;
    for (idx, nulled) in &insert_order {
        let write = &changes.inserts[*idx];
        let entity_type = model.require_entity(&write.entity)?;
        let mut values = row_values(entity_type, write, None)?;
        for (column, value) in values.iter_mut() {
            if nulled.iter().any(|c| c == column) {
                *value = Value::Null;
            }
        }
        plan.push(WriteKind::Insert, insert(entity_type.table_name()?, values));
    }

    for (idx, attributes) in fixups {
        let write = &changes.inserts[idx];
        let entity_type = model.require_entity(&write.entity)?;
        let sets = row_values(entity_type, write, Some(&attributes))?;
        plan.push(WriteKind::Update, update_by_key(entity_type, &write.key, sets)?);
    }

    for write in changes.inserts.iter().chain(changes.updates.iter()) {
        let owner = model.require_entity(&write.entity)?;
        for change in &write.changes.elements {
            element_additions(owner, &write.key, change, &mut plan)?;
        }
        for change in &write.changes.collections {
            collection_additions(model, owner, &write.key, change, &mut plan)?;
        }
    }

    for write in &changes.updates {
        if write.changes.attributes.is_empty() {
            continue;
        }
        let entity_type = model.require_entity(&write.entity)?;
        let sets = row_values(entity_type, write, Some(&write.changes.attributes))?;
        plan.push(WriteKind::Update, update_by_key(entity_type, &write.key, sets)?);
    }

    for write in &changes.updates {
        let owner = model.require_entity(&write.entity)?;
        for change in &write.changes.elements {
            element_removals(owner, &write.key, change, &mut plan)?;
        }
        for change in &write.changes.collections {
            collection_removals(model, owner, &write.key, change, &mut plan)?;
        }
    }

    for write in &changes.deletes {
        owned_rows(model, model.require_entity(&write.entity)?, &write.key, &mut plan)?;
    }

    delete_in_order(model, &changes.deletes, &mut plan)?;

    Ok(plan)
}

// ----------------------------------------------------------------------------
// Ordering
// ----------------------------------------------------------------------------

/// Join-column attributes of `write` pointing at other members of `writes`.
fn references_within(
    model: &Metamodel,
    write: &EntityWrite,
    index: &HashMap<(String, Value), usize>,
) -> Result<Vec<(String, usize)>> {
    let entity_type = model.require_entity(&write.entity)?;
    let mut refs = Vec::new();
    for attribute in &entity_type.attributes {
        let (Some(rel), Some(_)) = (attribute.relationship(), attribute.join_column()) else {
            continue;
        };
        let Some(key) = write.state.reference(&attribute.name) else {
            continue;
        };
        let root = model.require_entity(&rel.target)?.root.clone();
        if let Some(target) = index.get(&(root, key.clone())) {
            refs.push((attribute.name.clone(), *target));
        }
    }
    Ok(refs)
}

fn write_index(model: &Metamodel, writes: &[EntityWrite]) -> Result<HashMap<(String, Value), usize>> {
    let mut index = HashMap::new();
    for (i, write) in writes.iter().enumerate() {
        let root = model.require_entity(&write.entity)?.root.clone();
        index.insert((root, write.key.clone()), i);
    }
    Ok(index)
}

type InsertOrder = (Vec<(usize, Vec<String>)>, Vec<(usize, Vec<String>)>);

/// Insert order plus, for each insert, the join columns written as NULL;
/// the second list holds the attributes to set once everything exists.
fn insert_order(model: &Metamodel, inserts: &[EntityWrite]) -> Result<InsertOrder> {
    let index = write_index(model, inserts)?;
    let refs = inserts
        .iter()
        .map(|w| references_within(model, w, &index))
        .collect::<Result<Vec<_>>>()?;

    let mut done = vec![false; inserts.len()];
    let mut order = Vec::with_capacity(inserts.len());
    let mut fixups = Vec::new();

    while order.len() < inserts.len() {
        let ready = (0..inserts.len()).find(|&i| {
            !done[i] && refs[i].iter().all(|(_, target)| *target == i || done[*target])
        });
        let i = match ready {
            Some(i) => {
                order.push((i, Vec::new()));
                i
            }
            None => {
                let Some(i) = (0..inserts.len()).find(|&i| !done[i]) else {
                    break;
                };
                let entity_type = model.require_entity(&inserts[i].entity)?;
                let pending: Vec<String> = refs[i]
                    .iter()
                    .filter(|(_, target)| *target != i && !done[*target])
                    .map(|(attribute, _)| attribute.clone())
                    .collect();
                let columns = pending
                    .iter()
                    .filter_map(|a| entity_type.attribute(a).and_then(|a| a.join_column()).map(str::to_string))
                    .collect();
                order.push((i, columns));
                fixups.push((i, pending));
                i
            }
        };
        done[i] = true;
    }

    Ok((order, fixups))
}

fn delete_in_order(model: &Metamodel, deletes: &[EntityWrite], plan: &mut WritePlan) -> Result<()> {
    let index = write_index(model, deletes)?;
    let refs = deletes
        .iter()
        .map(|w| references_within(model, w, &index))
        .collect::<Result<Vec<_>>>()?;

    let mut done = vec![false; deletes.len()];
    let mut remaining = deletes.len();
    while remaining > 0 {
        // A row can go once nothing still present refers to it.
        let referenced = |i: usize, done: &[bool]| {
            (0..deletes.len()).any(|k| !done[k] && k != i && refs[k].iter().any(|(_, t)| *t == i))
        };
        let next = (0..deletes.len()).find(|&i| !done[i] && !referenced(i, &done));
        let i = match next {
            Some(i) => i,
            None => {
                let Some(i) = (0..deletes.len()).find(|&i| !done[i]) else {
                    break;
                };
                for k in (0..deletes.len()).filter(|&k| !done[k] && k != i) {
                    let attributes: Vec<String> = refs[k]
                        .iter()
                        .filter(|(_, t)| *t == i)
                        .map(|(a, _)| a.clone())
                        .collect();
                    if attributes.is_empty() {
                        continue;
                    }
                    let entity_type = model.require_entity(&deletes[k].entity)?;
                    let sets = attributes
                        .iter()
                        .filter_map(|a| entity_type.attribute(a).and_then(|a| a.join_column()))
                        .map(|column| (column.to_string(), Value::Null))
                        .collect();
                    plan.push(WriteKind::Update, update_by_key(entity_type, &deletes[k].key, sets)?);
                }
                i
            }
        };

        let entity_type = model.require_entity(&deletes[i].entity)?;
        let mut bound = Bound::default();
        let selection = bound.condition(&entity_type.id.column, &deletes[i].key);
        plan.push(
            WriteKind::Delete,
            (
                Statement::Delete(DeleteStmt {
                    table: TableRef::new(entity_type.table_name()?),
                    selection: Some(selection),
                }),
                bound.into_params(),
            ),
        );
        done[i] = true;
        remaining -= 1;
    }
    Ok(())
}

// ----------------------------------------------------------------------------
// Row values
// ----------------------------------------------------------------------------

/// Column values of `write`. With `only`, just the columns of those
/// attributes; otherwise the whole row including key and discriminator.
fn row_values(
    entity_type: &EntityType,
    write: &EntityWrite,
    only: Option<&[String]>,
) -> Result<Vec<(String, Value)>> {
    let mut values = Vec::new();
    if only.is_none() {
        values.push((entity_type.id.column.clone(), write.key.clone()));
        if let (Some(column), Some(value)) = (entity_type.discriminator_column(), &entity_type.discriminator) {
            values.push((column.to_string(), Value::Text(value.clone())));
        }
    }

    for attribute in &entity_type.attributes {
        if let Some(only) = only
            && !only.contains(&attribute.name)
        {
            continue;
        }
        match &attribute.kind {
            AttributeKind::Basic(basic) => {
                values.push((basic.column.clone(), write.state.basic(&attribute.name).clone()));
            }
            AttributeKind::Embedded(embedded) => {
                let current = write.state.embedded(&attribute.name);
                for field in &embedded.fields {
                    let value = current.map(|v| v.get(&field.field).clone()).unwrap_or(Value::Null);
                    values.push((field.column.clone(), value));
                }
            }
            AttributeKind::Relationship(_) => {
                if let Some(column) = attribute.join_column() {
                    let key = write.state.reference(&attribute.name).cloned().unwrap_or(Value::Null);
                    values.push((column.to_string(), key));
                }
            }
            AttributeKind::Elements(_) => {}
        }
    }

    Ok(values)
}

// ----------------------------------------------------------------------------
// Collections
// ----------------------------------------------------------------------------

fn element_mapping<'a>(owner: &'a EntityType, attribute: &str) -> Result<&'a ElementMapping> {
    match owner.attribute(attribute).map(|a| &a.kind) {
        Some(AttributeKind::Elements(mapping)) => Ok(mapping),
        _ => Err(DbError::Mapping(format!(
            "'{}.{}' is not an element collection",
            owner.name, attribute
        ))),
    }
}

fn element_columns(mapping: &ElementMapping, element: &Element) -> Result<Vec<(String, Value)>> {
    match (&mapping.shape, element) {
        (ElementShape::Basic { column, .. }, Element::Value(value)) => Ok(vec![(column.clone(), value.clone())]),
        (ElementShape::Embeddable { fields, .. }, Element::Embedded(embedded)) => Ok(fields
            .iter()
            .map(|f| (f.column.clone(), embedded.get(&f.field).clone()))
            .collect()),
        (ElementShape::Basic { .. }, Element::Embedded(_)) => Err(DbError::TypeMismatch(format!(
            "Element collection '{}' holds basic values, got an embedded value",
            mapping.table
        ))),
        (ElementShape::Embeddable { embeddable, .. }, Element::Value(_)) => Err(DbError::TypeMismatch(format!(
            "Element collection '{}' holds {} values",
            mapping.table, embeddable
        ))),
    }
}

fn element_additions(owner: &EntityType, key: &Value, change: &ElementChange, plan: &mut WritePlan) -> Result<()> {
    let mapping = element_mapping(owner, &change.attribute)?;

    if change.rewrite {
        let mut bound = Bound::default();
        let selection = bound.condition(&mapping.join_column, key);
        plan.push(
            WriteKind::Collection,
            (
                Statement::Delete(DeleteStmt {
                    table: TableRef::new(&mapping.table),
                    selection: Some(selection),
                }),
                bound.into_params(),
            ),
        );
    }

    for (position, element) in change.added.iter().enumerate() {
        let mut values = vec![(mapping.join_column.clone(), key.clone())];
        if let Some(column) = mapping.position_column() {
            values.push((column.to_string(), Value::Integer(position as i64)));
        }
        values.extend(element_columns(mapping, element)?);
        plan.push(WriteKind::Collection, insert(&mapping.table, values));
    }
    Ok(())
}

fn element_removals(owner: &EntityType, key: &Value, change: &ElementChange, plan: &mut WritePlan) -> Result<()> {
    let mapping = element_mapping(owner, &change.attribute)?;
    for element in &change.removed {
        let mut bound = Bound::default();
        let mut selection = bound.condition(&mapping.join_column, key);
        for (column, value) in element_columns(mapping, element)? {
            selection = Expr::and(selection, bound.condition(&column, &value));
        }
        plan.push(
            WriteKind::Collection,
            (
                Statement::Delete(DeleteStmt {
                    table: TableRef::new(&mapping.table),
                    selection: Some(selection),
                }),
                bound.into_params(),
            ),
        );
    }
    Ok(())
}

fn collection_additions(
    model: &Metamodel,
    owner: &EntityType,
    key: &Value,
    change: &CollectionChange,
    plan: &mut WritePlan,
) -> Result<()> {
    let Some(rel) = owner.attribute(&change.attribute).and_then(|a| a.relationship()) else {
        return Ok(());
    };
    match &rel.mapping {
        RelationshipMapping::JoinTable {
            table,
            join_column,
            inverse_column,
        } => {
            for target in &change.added {
                plan.push(
                    WriteKind::Collection,
                    insert(
                        table,
                        vec![
                            (join_column.clone(), key.clone()),
                            (inverse_column.clone(), target.key.clone()),
                        ],
                    ),
                );
            }
        }
        RelationshipMapping::TargetJoinColumn { column } => {
            for target in &change.added {
                let target_type = model.require_entity(&target.entity)?;
                plan.push(
                    WriteKind::Collection,
                    update_by_key(target_type, &target.key, vec![(column.clone(), key.clone())])?,
                );
            }
        }
        RelationshipMapping::JoinColumn { .. } | RelationshipMapping::MappedBy { .. } => {}
    }
    Ok(())
}

fn collection_removals(
    model: &Metamodel,
    owner: &EntityType,
    key: &Value,
    change: &CollectionChange,
    plan: &mut WritePlan,
) -> Result<()> {
    let Some(rel) = owner.attribute(&change.attribute).and_then(|a| a.relationship()) else {
        return Ok(());
    };
    match &rel.mapping {
        RelationshipMapping::JoinTable {
            table,
            join_column,
            inverse_column,
        } => {
            for target in &change.removed {
                let mut bound = Bound::default();
                let selection = Expr::and(
                    bound.condition(join_column, key),
                    bound.condition(inverse_column, &target.key),
                );
                plan.push(
                    WriteKind::Collection,
                    (
                        Statement::Delete(DeleteStmt {
                            table: TableRef::new(table),
                            selection: Some(selection),
                        }),
                        bound.into_params(),
                    ),
                );
            }
        }
        RelationshipMapping::TargetJoinColumn { column } => {
            for target in &change.removed {
                let target_type = model.require_entity(&target.entity)?;
                let mut bound = Bound::default();
                let value = bound.push(Value::Null);
                let selection = Expr::and(
                    bound.condition(&target_type.id.column, &target.key),
                    bound.condition(column, key),
                );
                plan.push(
                    WriteKind::Collection,
                    (
                        Statement::Update(UpdateStmt {
                            table: TableRef::new(target_type.table_name()?),
                            assignments: vec![Assignment {
                                column: column.clone(),
                                value,
                            }],
                            selection: Some(selection),
                        }),
                        bound.into_params(),
                    ),
                );
            }
        }
        RelationshipMapping::JoinColumn { .. } | RelationshipMapping::MappedBy { .. } => {}
    }
    Ok(())
}

/// Element rows, owning link rows and target foreign keys of a removed owner.
fn owned_rows(model: &Metamodel, owner: &EntityType, key: &Value, plan: &mut WritePlan) -> Result<()> {
    for attribute in &owner.attributes {
        match &attribute.kind {
            AttributeKind::Elements(mapping) => {
                plan.push(WriteKind::Collection, delete_where(&mapping.table, &mapping.join_column, key));
            }
            AttributeKind::Relationship(rel) => match &rel.mapping {
                RelationshipMapping::JoinTable { table, join_column, .. } => {
                    plan.push(WriteKind::Collection, delete_where(table, join_column, key));
                }
                RelationshipMapping::TargetJoinColumn { column } => {
                    let mut seen = HashSet::new();
                    for target in model.concrete_types(&rel.target) {
                        let table = target.table_name()?;
                        if !seen.insert(table.to_ascii_lowercase()) {
                            continue;
                        }
                        let mut bound = Bound::default();
                        let value = bound.push(Value::Null);
                        let selection = bound.condition(column, key);
                        plan.push(
                            WriteKind::Collection,
                            (
                                Statement::Update(UpdateStmt {
                                    table: TableRef::new(table),
                                    assignments: vec![Assignment {
                                        column: column.clone(),
                                        value,
                                    }],
                                    selection: Some(selection),
                                }),
                                bound.into_params(),
                            ),
                        );
                    }
                }
                _ => {}
            },
            _ => {}
        }
    }
    Ok(())
}

// ----------------------------------------------------------------------------
// Statement construction
// ----------------------------------------------------------------------------

/// Collects positional parameters while a statement is built.
#[derive(Default)]
struct Bound {
    values: Vec<Value>,
}

impl Bound {
    fn push(&mut self, value: Value) -> Expr {
        self.values.push(value);
        Expr::Parameter(ParamRef::Positional(self.values.len()))
    }

    /// `column = $n`, or `column IS NULL` for a NULL value.
    fn condition(&mut self, column: &str, value: &Value) -> Expr {
        if value.is_null() {
            Expr::is_null(Expr::unqualified(column))
        } else {
            let param = self.push(value.clone());
            Expr::eq(Expr::unqualified(column), param)
        }
    }

    fn into_params(self) -> Params {
        Params::positional(self.values)
    }
}

fn insert(table: &str, values: Vec<(String, Value)>) -> (Statement, Params) {
    let mut bound = Bound::default();
    let mut columns = Vec::with_capacity(values.len());
    let mut exprs = Vec::with_capacity(values.len());
    for (column, value) in values {
        columns.push(column);
        exprs.push(bound.push(value));
    }
    (
        Statement::Insert(InsertStmt {
            table: table.to_string(),
            columns,
            values: exprs,
        }),
        bound.into_params(),
    )
}

fn update_by_key(entity_type: &EntityType, key: &Value, sets: Vec<(String, Value)>) -> Result<(Statement, Params)> {
    let mut bound = Bound::default();
    let assignments = sets
        .into_iter()
        .map(|(column, value)| Assignment {
            column,
            value: bound.push(value),
        })
        .collect();
    let selection = bound.condition(&entity_type.id.column, key);
    Ok((
        Statement::Update(UpdateStmt {
            table: TableRef::new(entity_type.table_name()?),
            assignments,
            selection: Some(selection),
        }),
        bound.into_params(),
    ))
}

fn delete_where(table: &str, column: &str, value: &Value) -> (Statement, Params) {
    let mut bound = Bound::default();
    let selection = bound.condition(column, value);
    (
        Statement::Delete(DeleteStmt {
            table: TableRef::new(table),
            selection: Some(selection),
        }),
        bound.into_params(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DataType;
    use crate::entity::Arena;
    use crate::metadata::{EntityDescriptor, KeyStrategy, RelationshipDescriptor};
    use crate::tracker::SnapshotValue;

    fn model() -> Metamodel {
        Metamodel::builder()
            .entity(
                EntityDescriptor::new("Team")
                    .id("id", DataType::Integer, KeyStrategy::Assigned)
                    .basic("name", DataType::Text),
            )
            .entity(
                EntityDescriptor::new("Member")
                    .id("id", DataType::Integer, KeyStrategy::Assigned)
                    .basic("username", DataType::Text)
                    .relationship(RelationshipDescriptor::many_to_one("team", "Team")),
            )
            .build()
            .unwrap()
    }

    fn write(arena: &mut Arena, model: &Metamodel, entity: &str, key: i64, values: &[(&str, SnapshotValue)]) -> EntityWrite {
        let handle = arena.alloc(
            crate::entity::EntityData::new(model.entity(entity).unwrap()),
            crate::entity::LifecycleState::Managed,
        );
        let mut state = EntitySnapshot::default();
        state.record("id", SnapshotValue::Basic(Value::Integer(key)));
        for (name, value) in values {
            state.record(name, value.clone());
        }
        EntityWrite {
            handle,
            entity: entity.to_string(),
            key: Value::Integer(key),
            state,
            changes: EntityChanges::default(),
        }
    }

    fn kinds_and_tables(plan: &WritePlan) -> Vec<(WriteKind, String)> {
        plan.writes
            .iter()
            .map(|w| (w.kind, w.statement.table_name().unwrap_or_default().to_string()))
            .collect()
    }

    #[test]
    fn test_referenced_rows_are_inserted_first() {
        let model = model();
        let mut arena = Arena::new(1);
        let member = write(
            &mut arena,
            &model,
            "Member",
            10,
            &[
                ("username", SnapshotValue::Basic(Value::from("member1"))),
                ("team", SnapshotValue::Reference(Some(Value::Integer(1)))),
            ],
        );
        let team = write(&mut arena, &model, "Team", 1, &[("name", SnapshotValue::Basic(Value::from("team1")))]);

        let changes = ChangeSet {
            inserts: vec![member, team],
            ..ChangeSet::default()
        };
        let plan = plan(&model, &changes).unwrap();
        assert_eq!(
            kinds_and_tables(&plan),
            vec![(WriteKind::Insert, "Team".to_string()), (WriteKind::Insert, "Member".to_string())]
        );

        let Statement::Insert(insert) = &plan.writes[1].statement else {
            panic!("expected an insert");
        };
        assert_eq!(insert.columns, vec!["id", "username", "team_id"]);
        assert_eq!(
            plan.writes[1].params,
            Params::positional(vec![Value::Integer(10), Value::from("member1"), Value::Integer(1)])
        );
    }

    #[test]
    fn test_referencing_rows_are_deleted_first() {
        let model = model();
        let mut arena = Arena::new(1);
        let team = write(&mut arena, &model, "Team", 1, &[]);
        let member = write(
            &mut arena,
            &model,
            "Member",
            10,
            &[("team", SnapshotValue::Reference(Some(Value::Integer(1))))],
        );

        let changes = ChangeSet {
            deletes: vec![team, member],
            ..ChangeSet::default()
        };
        let plan = plan(&model, &changes).unwrap();
        assert_eq!(
            kinds_and_tables(&plan),
            vec![(WriteKind::Delete, "Member".to_string()), (WriteKind::Delete, "Team".to_string())]
        );
    }

    #[test]
    fn test_updates_only_touch_changed_columns() {
        let model = model();
        let mut arena = Arena::new(1);
        let mut member = write(
            &mut arena,
            &model,
            "Member",
            10,
            &[
                ("username", SnapshotValue::Basic(Value::from("renamed"))),
                ("team", SnapshotValue::Reference(None)),
            ],
        );
        member.changes.attributes = vec!["username".to_string()];

        let changes = ChangeSet {
            updates: vec![member],
            ..ChangeSet::default()
        };
        let plan = plan(&model, &changes).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(
            plan.writes[0].statement.to_string(),
            "UPDATE Member SET username = $1 WHERE (id = $2)"
        );
    }

    #[test]
    fn test_insert_cycle_is_broken_with_a_fixup() {
        let model = Metamodel::builder()
            .entity(
                EntityDescriptor::new("Person")
                    .id("id", DataType::Integer, KeyStrategy::Assigned)
                    .relationship(RelationshipDescriptor::one_to_one("partner", "Person")),
            )
            .build()
            .unwrap();
        let mut arena = Arena::new(1);
        let a = write(&mut arena, &model, "Person", 1, &[("partner", SnapshotValue::Reference(Some(Value::Integer(2))))]);
        let b = write(&mut arena, &model, "Person", 2, &[("partner", SnapshotValue::Reference(Some(Value::Integer(1))))]);

        let changes = ChangeSet {
            inserts: vec![a, b],
            ..ChangeSet::default()
        };
        let plan = plan(&model, &changes).unwrap();
        let kinds: Vec<WriteKind> = plan.writes.iter().map(|w| w.kind).collect();
        assert_eq!(kinds, vec![WriteKind::Insert, WriteKind::Insert, WriteKind::Update]);
        assert_eq!(
            plan.writes[0].params,
            Params::positional(vec![Value::Integer(1), Value::Null])
        );
    }
}

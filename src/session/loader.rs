//! Turning result rows into tracked instances, and loading deferred
//! associations on first access.

use super::unit_of_work::{UnitOfWork, no_attribute};
use crate::core::{DbError, Result, Value};
use crate::entity::{
    AttributeValue, DeferredLoad, DeferredSource, Element, ElementList, ElementValues, EmbeddedValue,
    EntityCollection, EntityData, EntityHandle, LifecycleState, Reference,
};
use crate::metadata::{
    Attribute, AttributeKind, ElementMapping, ElementShape, EntityType, FetchType, RelationshipDescriptor,
    RelationshipMapping,
};
use crate::query::{EntityShape, FetchShape, FetchTarget, QueryValue, ResultShape, SelectPlan, Translator, TypeTag};
use crate::sql::{Expr, OrderByItem, ParamRef, Params, SelectCore, SelectItem, SelectStmt, Statement, TableRef};
use crate::tracker::{EntityKey, EntitySnapshot, SnapshotValue};
use async_recursion::async_recursion;

impl UnitOfWork {
    /// Run a translated select and materialize every row.
    pub(super) async fn run_select(&mut self, plan: &SelectPlan, params: &Params) -> Result<Vec<QueryValue>> {
        let statement = Statement::Select(plan.statement.clone());
        let result = self.round_trip(&statement, params).await?;

        let mut loaded = Vec::new();
        let mut values = Vec::with_capacity(result.rows.len());
        for row in &result.rows {
            let mut items = plan
                .shapes
                .iter()
                .map(|shape| self.shape_value(shape, row, &mut loaded))
                .collect::<Result<Vec<_>>>()?;
            let value = if items.len() == 1 {
                items.remove(0)
            } else {
                QueryValue::Tuple(items)
            };
            values.push(value);
        }
        for fetch in &plan.fetches {
            self.apply_fetch(fetch, &result.rows, &mut loaded)?;
        }

        // Fetch joins repeat the owner once per joined row.
        if plan.statement.branches.iter().any(|core| core.distinct) || !plan.fetches.is_empty() {
            let mut unique: Vec<QueryValue> = Vec::with_capacity(values.len());
            for value in values {
                if !unique.contains(&value) {
                    unique.push(value);
                }
            }
            values = unique;
        }

        self.load_eager(loaded).await?;
        Ok(values)
    }

    /// Run a parsed native select. With `entity`, each row becomes an instance
    /// of that type, matched to columns by name.
    pub(super) async fn run_native(
        &mut self,
        select: SelectStmt,
        entity: Option<&str>,
        params: &Params,
    ) -> Result<Vec<QueryValue>> {
        let result = self.round_trip(&Statement::Select(select), params).await?;
        let Some(entity) = entity else {
            return Ok(result
                .rows
                .into_iter()
                .map(|row| {
                    if row.len() == 1 {
                        QueryValue::Scalar(row.into_iter().next().unwrap_or(Value::Null))
                    } else {
                        QueryValue::Tuple(row.into_iter().map(QueryValue::Scalar).collect())
                    }
                })
                .collect());
        };

        let model = self.model.clone();
        let entity_type = model.require_entity(entity)?;
        if result.column_index(&entity_type.id.column).is_none() {
            return Err(DbError::Mapping(format!(
                "Native result for '{}' lacks key column '{}'",
                entity, entity_type.id.column
            )));
        }
        let tag = match entity_type.discriminator_column() {
            Some(column) if result.column_index(column).is_some() => TypeTag::Discriminator(column.to_string()),
            _ => TypeTag::Fixed(entity_type.name.clone()),
        };
        let shape = EntityShape {
            entity: entity_type.name.clone(),
            start: 0,
            columns: result.columns.clone(),
            tag,
        };

        let mut loaded = Vec::new();
        let mut values = Vec::new();
        for row in &result.rows {
            if let Some(handle) = self.materialize(&shape, row, &mut loaded)? {
                values.push(QueryValue::Entity(handle));
            }
        }
        self.load_eager(loaded).await?;
        Ok(values)
    }

    fn shape_value(&mut self, shape: &ResultShape, row: &[Value], loaded: &mut Vec<EntityHandle>) -> Result<QueryValue> {
        Ok(match shape {
            ResultShape::Entity(entity) => match self.materialize(entity, row, loaded)? {
                Some(handle) => QueryValue::Entity(handle),
                None => QueryValue::Scalar(Value::Null),
            },
            ResultShape::Scalar(index) => QueryValue::Scalar(cell(row, *index)?),
            ResultShape::Embedded { fields, .. } => {
                let mut value = EmbeddedValue::new();
                for (field, index) in fields {
                    value.set(field, cell(row, *index)?);
                }
                QueryValue::Embedded((!value.is_all_null()).then_some(value))
            }
            ResultShape::Constructor { class, args } => QueryValue::Object {
                class: class.clone(),
                args: args
                    .iter()
                    .map(|arg| self.shape_value(arg, row, loaded))
                    .collect::<Result<_>>()?,
            },
        })
    }

    /// Tracked instance for the entity columns of `row`; `None` when the key
    /// is NULL (the unmatched side of an outer join). Rows of instances the
    /// identity map already holds are ignored in favour of tracked state.
    fn materialize(
        &mut self,
        shape: &EntityShape,
        row: &[Value],
        loaded: &mut Vec<EntityHandle>,
    ) -> Result<Option<EntityHandle>> {
        let model = self.model.clone();
        let declared = model.require_entity(&shape.entity)?;
        let column_value = |column: &str| shape_column(shape, row, column);

        let key = column_value(&declared.id.column);
        if key.is_null() {
            return Ok(None);
        }

        let concrete = match &shape.tag {
            TypeTag::Fixed(name) => model.require_entity(name)?,
            TypeTag::Branch(index) => {
                let tag = cell(row, *index)?;
                let name = tag
                    .as_str()
                    .ok_or_else(|| DbError::ExecutionError(format!("Type tag of '{}' row is not text", declared.name)))?;
                model.require_entity(name)?
            }
            TypeTag::Discriminator(column) => {
                let tag = column_value(column);
                let value = tag.as_str().ok_or_else(|| {
                    DbError::Mapping(format!("Row of '{}' with key {} has no discriminator", declared.name, key))
                })?;
                model.type_for_discriminator(&declared.root, value).ok_or_else(|| {
                    DbError::Mapping(format!("Unknown discriminator '{}' for '{}'", value, declared.root))
                })?
            }
        };

        let identity = (concrete.root.clone(), key.clone());
        if let Some(&handle) = self.identity.get(&identity) {
            return Ok(Some(handle));
        }

        let data = entity_data(concrete, &key, column_value);
        let snapshot = EntitySnapshot::capture(&model, concrete, &data, &self.arena)?;
        let handle = self.arena.alloc(data, LifecycleState::Managed);
        let slot = self.arena.get_mut(handle)?;
        slot.key = Some(key);
        slot.snapshot = Some(snapshot);
        self.identity.insert(identity, handle);
        loaded.push(handle);
        Ok(Some(handle))
    }

    /// Populate a fetched association from the rows of its owner's query.
    /// Associations the caller already loaded are left alone.
    fn apply_fetch(&mut self, fetch: &FetchShape, rows: &[Vec<Value>], loaded: &mut Vec<EntityHandle>) -> Result<()> {
        let mut gathered: Vec<(EntityHandle, Vec<EntityHandle>, Vec<(i64, Vec<Value>)>)> = Vec::new();
        for row in rows {
            let Some(owner) = self.materialize(&fetch.owner, row, loaded)? else {
                continue;
            };
            let entry = match gathered.iter().position(|(handle, ..)| *handle == owner) {
                Some(index) => index,
                None => {
                    gathered.push((owner, Vec::new(), Vec::new()));
                    gathered.len() - 1
                }
            };
            match &fetch.target {
                FetchTarget::Entity(shape) => {
                    if let Some(target) = self.materialize(shape, row, loaded)?
                        && !gathered[entry].1.contains(&target)
                    {
                        gathered[entry].1.push(target);
                    }
                }
                FetchTarget::Elements { columns, position } => {
                    let values = columns.iter().map(|c| cell(row, *c)).collect::<Result<Vec<_>>>()?;
                    if values.iter().all(Value::is_null) {
                        continue;
                    }
                    let position = match position {
                        Some(index) => cell(row, *index)?.as_i64().unwrap_or_default(),
                        None => 0,
                    };
                    gathered[entry].2.push((position, values));
                }
            }
        }

        let model = self.model.clone();
        for (owner, targets, mut elements) in gathered {
            let slot = self.arena.get(owner)?;
            if !slot.data.get(&fetch.attribute).is_some_and(AttributeValue::is_deferred) {
                continue;
            }
            let entity_type = model.require_entity(slot.data.entity())?;
            let attribute = entity_type
                .attribute(&fetch.attribute)
                .ok_or_else(|| no_attribute(&entity_type.name, &fetch.attribute))?;
            match &attribute.kind {
                AttributeKind::Relationship(rel) if rel.cardinality.is_collection() => {
                    self.set_loaded_collection(owner, &fetch.attribute, targets)?
                }
                AttributeKind::Relationship(_) => {
                    self.set_loaded_reference(owner, &fetch.attribute, targets.first().copied())?
                }
                AttributeKind::Elements(mapping) => {
                    elements.sort_by_key(|(position, _)| *position);
                    let list = element_list(mapping, elements.into_iter().map(|(_, values)| values));
                    self.set_loaded_elements(owner, &fetch.attribute, list)?
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Resolve the eager associations of freshly loaded instances.
    #[async_recursion]
    pub(super) async fn load_eager(&mut self, handles: Vec<EntityHandle>) -> Result<()> {
        let model = self.model.clone();
        for handle in handles {
            let entity_type = model.require_entity(self.arena.get(handle)?.data.entity())?;
            for attribute in &entity_type.attributes {
                let eager = match &attribute.kind {
                    AttributeKind::Relationship(rel) => rel.fetch_type() == FetchType::Eager,
                    AttributeKind::Elements(mapping) => mapping.fetch == FetchType::Eager,
                    _ => false,
                };
                if eager {
                    self.resolve_attribute(handle, &attribute.name).await?;
                }
            }
        }
        Ok(())
    }

    /// Load a deferred attribute. Loaded attributes are left as they are.
    #[async_recursion]
    pub(super) async fn resolve_attribute(&mut self, handle: EntityHandle, attribute: &str) -> Result<()> {
        let model = self.model.clone();
        let slot = self.arena.get(handle)?;
        let entity_type = model.require_entity(slot.data.entity())?;
        let mapped = entity_type
            .attribute(attribute)
            .ok_or_else(|| no_attribute(&entity_type.name, attribute))?;
        let deferred = match slot.data.get(attribute) {
            Some(AttributeValue::Reference(Reference::Deferred(deferred)))
            | Some(AttributeValue::Collection(EntityCollection::Deferred(deferred)))
            | Some(AttributeValue::Elements(ElementValues::Deferred(deferred))) => deferred.clone(),
            _ => return Ok(()),
        };
        if !matches!(slot.state, LifecycleState::Managed | LifecycleState::Removed) {
            return Err(DbError::IllegalState(format!(
                "Cannot load '{}.{}' of {} instance {}",
                entity_type.name, attribute, slot.state, handle
            )));
        }

        match (&mapped.kind, &deferred.source) {
            (AttributeKind::Relationship(rel), DeferredSource::Key(key)) => {
                // A tracked target is used whatever its state, so reading the
                // reference never changes what the owner's row holds.
                let root = model.require_entity(&rel.target)?.root.clone();
                let target = match self.identity.get(&(root, key.clone())) {
                    Some(&tracked) => Some(tracked),
                    None => self.find(&rel.target, key.clone()).await?,
                };
                self.set_loaded_reference(handle, attribute, target)
            }
            (AttributeKind::Relationship(rel), DeferredSource::Owner { key }) => {
                let targets = self.load_related(rel, key).await?;
                if rel.cardinality.is_collection() {
                    self.set_loaded_collection(handle, attribute, targets)
                } else {
                    self.set_loaded_reference(handle, attribute, targets.first().copied())
                }
            }
            (AttributeKind::Elements(mapping), DeferredSource::Owner { key }) => {
                let list = self.load_elements(mapping, key).await?;
                self.set_loaded_elements(handle, attribute, list)
            }
            _ => Err(DbError::Mapping(format!(
                "'{}.{}' cannot be loaded from {:?}",
                entity_type.name, attribute, deferred
            ))),
        }
    }

    /// Instances on the far side of a relationship not stored in the owner's row.
    async fn load_related(&mut self, rel: &RelationshipDescriptor, owner_key: &Value) -> Result<Vec<EntityHandle>> {
        match &rel.mapping {
            RelationshipMapping::TargetJoinColumn { column } => self.load_where(&rel.target, column, owner_key).await,
            RelationshipMapping::JoinTable {
                table,
                join_column,
                inverse_column,
            } => self.load_linked(&rel.target, table, join_column, inverse_column, owner_key).await,
            RelationshipMapping::MappedBy { attribute } => {
                let model = self.model.clone();
                let target = model.require_entity(&rel.target)?;
                let owning = target
                    .attribute(attribute)
                    .and_then(Attribute::relationship)
                    .ok_or_else(|| no_attribute(&target.name, attribute))?;
                match &owning.mapping {
                    RelationshipMapping::JoinColumn { column: Some(column) } => {
                        self.load_where(&rel.target, column, owner_key).await
                    }
                    RelationshipMapping::JoinTable {
                        table,
                        join_column,
                        inverse_column,
                    } => self.load_linked(&rel.target, table, inverse_column, join_column, owner_key).await,
                    other => Err(DbError::Mapping(format!(
                        "'{}.{}' cannot be the owning side: {:?}",
                        target.name, attribute, other
                    ))),
                }
            }
            RelationshipMapping::JoinColumn { .. } => Err(DbError::Mapping(format!(
                "Association to '{}' is stored in the owner's row",
                rel.target
            ))),
        }
    }

    async fn load_where(&mut self, entity: &str, column: &str, key: &Value) -> Result<Vec<EntityHandle>> {
        let model = self.model.clone();
        let plan = Translator::new(&model).rows_where(entity, column, ParamRef::Positional(1))?;
        let values = self.run_select(&plan, &Params::positional(vec![key.clone()])).await?;
        Ok(values.iter().filter_map(QueryValue::as_entity).collect())
    }

    /// Load one instance by key, bypassing the identity map lookup.
    pub(super) async fn load_by_key(&mut self, entity_type: &EntityType, key: Value) -> Result<Option<EntityHandle>> {
        let model = self.model.clone();
        let plan = Translator::new(&model).rows_where(&entity_type.name, &entity_type.id.column, ParamRef::Positional(1))?;
        let values = self.run_select(&plan, &Params::positional(vec![key])).await?;
        for handle in values.iter().filter_map(QueryValue::as_entity) {
            let slot = self.arena.get(handle)?;
            if slot.state == LifecycleState::Managed && model.is_assignable(slot.data.entity(), &entity_type.name) {
                return Ok(Some(handle));
            }
        }
        Ok(None)
    }

    /// Targets listed in a join table: rows with `where_column = key`, target
    /// keys read from `select_column`.
    async fn load_linked(
        &mut self,
        target: &str,
        table: &str,
        where_column: &str,
        select_column: &str,
        key: &Value,
    ) -> Result<Vec<EntityHandle>> {
        let mut core = SelectCore::new(TableRef::new(table));
        core.projection.push(SelectItem::Expr {
            expr: Expr::unqualified(select_column),
            alias: None,
        });
        core.and_where(Expr::eq(
            Expr::unqualified(where_column),
            Expr::Parameter(ParamRef::Positional(1)),
        ));
        let statement = Statement::Select(SelectStmt::single(core));
        let result = self.round_trip(&statement, &Params::positional(vec![key.clone()])).await?;

        let mut handles = Vec::new();
        for row in result.rows {
            let Some(target_key) = row.into_iter().next() else {
                continue;
            };
            if let Some(handle) = self.find(target, target_key).await?
                && !handles.contains(&handle)
            {
                handles.push(handle);
            }
        }
        Ok(handles)
    }

    async fn load_elements(&mut self, mapping: &ElementMapping, owner_key: &Value) -> Result<ElementList> {
        let columns = mapping.shape.columns();
        let mut core = SelectCore::new(TableRef::new(mapping.table.as_str()));
        for column in &columns {
            core.projection.push(SelectItem::Expr {
                expr: Expr::unqualified(column.as_str()),
                alias: None,
            });
        }
        core.and_where(Expr::eq(
            Expr::unqualified(mapping.join_column.as_str()),
            Expr::Parameter(ParamRef::Positional(1)),
        ));
        let mut select = SelectStmt::single(core);
        if let Some(position) = mapping.position_column() {
            select.order_by.push(OrderByItem {
                expr: Expr::unqualified(position),
                descending: false,
            });
        }

        let result = self
            .round_trip(&Statement::Select(select), &Params::positional(vec![owner_key.clone()]))
            .await?;
        Ok(element_list(mapping, result.rows.into_iter()))
    }

    /// Reload a managed instance's persistent state, discarding unflushed
    /// changes to it.
    pub async fn refresh(&mut self, handle: EntityHandle) -> Result<()> {
        self.ensure_active()?;
        let model = self.model.clone();
        let slot = self.arena.get(handle)?;
        if slot.state != LifecycleState::Managed || slot.snapshot.is_none() {
            return Err(DbError::IllegalState(format!(
                "Only flushed managed instances can be refreshed, {} is {}",
                handle, slot.state
            )));
        }
        let entity_type = model.require_entity(slot.data.entity())?;
        let key = self.key_of(handle)?;

        let plan = Translator::new(&model).rows_where(&entity_type.name, &entity_type.id.column, ParamRef::Positional(1))?;
        let Some(ResultShape::Entity(shape)) = plan.shapes.first() else {
            return Err(DbError::ExecutionError(format!(
                "Key lookup of '{}' does not project an entity",
                entity_type.name
            )));
        };
        let statement = Statement::Select(plan.statement.clone());
        let result = self.round_trip(&statement, &Params::positional(vec![key.clone()])).await?;
        let row = result.rows.first().ok_or_else(|| {
            DbError::IllegalState(format!("{} {} no longer exists", entity_type.name, key))
        })?;

        let data = entity_data(entity_type, &key, |column: &str| shape_column(shape, row, column));
        let snapshot = EntitySnapshot::capture(&model, entity_type, &data, &self.arena)?;
        let slot = self.arena.get_mut(handle)?;
        slot.data = data;
        slot.snapshot = Some(snapshot);
        self.load_eager(vec![handle]).await
    }

    fn set_loaded_collection(&mut self, owner: EntityHandle, attribute: &str, targets: Vec<EntityHandle>) -> Result<()> {
        let keys = self.entity_keys(&targets)?;
        let slot = self.arena.get_mut(owner)?;
        slot.data
            .set(attribute, AttributeValue::Collection(EntityCollection::Loaded(targets)));
        if let Some(snapshot) = slot.snapshot.as_mut() {
            snapshot.record(attribute, SnapshotValue::Collection(keys));
        }
        Ok(())
    }

    fn set_loaded_reference(&mut self, owner: EntityHandle, attribute: &str, target: Option<EntityHandle>) -> Result<()> {
        let reference = target.map_or(Reference::Null, Reference::Instance);
        self.arena
            .get_mut(owner)?
            .data
            .set(attribute, AttributeValue::Reference(reference));
        Ok(())
    }

    fn set_loaded_elements(&mut self, owner: EntityHandle, attribute: &str, list: ElementList) -> Result<()> {
        let slot = self.arena.get_mut(owner)?;
        if let Some(snapshot) = slot.snapshot.as_mut() {
            snapshot.record(attribute, SnapshotValue::Elements(list.as_slice().to_vec()));
        }
        slot.data.set(attribute, AttributeValue::Elements(ElementValues::Loaded(list)));
        Ok(())
    }

    pub(super) fn entity_keys(&self, handles: &[EntityHandle]) -> Result<Vec<EntityKey>> {
        handles
            .iter()
            .map(|&handle| {
                Ok(EntityKey {
                    entity: self.entity_of(handle)?.to_string(),
                    key: self.key_of(handle)?,
                })
            })
            .collect()
    }
}

/// Persistent state of one row. Associations stay deferred.
fn entity_data(entity_type: &EntityType, key: &Value, column_value: impl Fn(&str) -> Value) -> EntityData {
    let mut data = EntityData::new(entity_type);
    data.set(&entity_type.id.name, AttributeValue::Basic(key.clone()));
    for attribute in &entity_type.attributes {
        let value = match &attribute.kind {
            AttributeKind::Basic(basic) => AttributeValue::Basic(column_value(&basic.column)),
            AttributeKind::Embedded(embedded) => {
                let mut value = EmbeddedValue::new();
                for field in &embedded.fields {
                    value.set(&field.field, column_value(&field.column));
                }
                AttributeValue::Embedded((!value.is_all_null()).then_some(value))
            }
            AttributeKind::Relationship(rel) => match attribute.join_column() {
                Some(column) => {
                    let target_key = column_value(column);
                    if target_key.is_null() {
                        AttributeValue::Reference(Reference::Null)
                    } else {
                        AttributeValue::Reference(Reference::Deferred(DeferredLoad::by_key(&rel.target, target_key)))
                    }
                }
                None => {
                    let deferred = DeferredLoad::by_owner(&rel.target, key.clone());
                    if rel.cardinality.is_collection() {
                        AttributeValue::Collection(EntityCollection::Deferred(deferred))
                    } else {
                        AttributeValue::Reference(Reference::Deferred(deferred))
                    }
                }
            },
            AttributeKind::Elements(elements) => {
                AttributeValue::Elements(ElementValues::Deferred(DeferredLoad::by_owner(&elements.table, key.clone())))
            }
        };
        data.set(&attribute.name, value);
    }
    data
}

/// Elements from rows holding the element shape's columns in order.
fn element_list(mapping: &ElementMapping, rows: impl Iterator<Item = Vec<Value>>) -> ElementList {
    let mut list = ElementList::new(mapping.kind);
    for values in rows {
        let element = match &mapping.shape {
            ElementShape::Basic { .. } => Element::Value(values.into_iter().next().unwrap_or(Value::Null)),
            ElementShape::Embeddable { fields, .. } => {
                let mut value = EmbeddedValue::new();
                for (field, value_of_field) in fields.iter().zip(values) {
                    value.set(&field.field, value_of_field);
                }
                Element::Embedded(value)
            }
        };
        list.insert(element);
    }
    list
}

fn shape_column(shape: &EntityShape, row: &[Value], column: &str) -> Value {
    shape
        .columns
        .iter()
        .position(|c| c.eq_ignore_ascii_case(column))
        .and_then(|index| row.get(shape.start + index))
        .cloned()
        .unwrap_or(Value::Null)
}

fn cell(row: &[Value], index: usize) -> Result<Value> {
    row.get(index)
        .cloned()
        .ok_or_else(|| DbError::ExecutionError(format!("Result row has no column {}", index)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DataType;
    use crate::metadata::{CollectionKind, FieldColumn};

    fn shape() -> EntityShape {
        EntityShape {
            entity: "Member".into(),
            start: 1,
            columns: vec!["ID".into(), "USERNAME".into()],
            tag: TypeTag::Fixed("Member".into()),
        }
    }

    #[test]
    fn test_shape_column_is_offset_and_case_insensitive() {
        let row = vec![Value::Integer(99), Value::Integer(1), Value::Text("kim".into())];
        assert_eq!(shape_column(&shape(), &row, "username"), Value::Text("kim".into()));
        assert_eq!(shape_column(&shape(), &row, "ID"), Value::Integer(1));
        assert_eq!(shape_column(&shape(), &row, "AGE"), Value::Null);
    }

    #[test]
    fn test_element_list_builds_embeddables_and_dedups_sets() {
        let mapping = ElementMapping {
            table: "ADDRESS".into(),
            join_column: "MEMBER_ID".into(),
            kind: CollectionKind::Set,
            fetch: FetchType::Lazy,
            shape: ElementShape::Embeddable {
                embeddable: "Address".into(),
                fields: vec![
                    FieldColumn {
                        field: "city".into(),
                        column: "CITY".into(),
                        data_type: DataType::Text,
                    },
                    FieldColumn {
                        field: "street".into(),
                        column: "STREET".into(),
                        data_type: DataType::Text,
                    },
                ],
            },
        };
        let rows = vec![
            vec![Value::Text("Seoul".into()), Value::Text("Main".into())],
            vec![Value::Text("Seoul".into()), Value::Text("Main".into())],
            vec![Value::Text("Busan".into()), Value::Null],
        ];
        let list = element_list(&mapping, rows.into_iter());
        assert_eq!(list.len(), 2);
        assert!(list.contains(&Element::Embedded(
            EmbeddedValue::new().with("city", "Seoul").with("street", "Main")
        )));
    }

    #[test]
    fn test_cell_out_of_range() {
        assert!(matches!(cell(&[Value::Null], 3), Err(DbError::ExecutionError(_))));
    }
}

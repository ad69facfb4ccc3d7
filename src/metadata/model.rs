use super::descriptor::*;
use crate::core::{Column, DataType, DbError, Result};
use crate::storage::TableSchema;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Column name of the position kept for list element collections.
pub const LIST_POSITION_COLUMN: &str = "idx";

#[derive(Debug, Clone, PartialEq)]
pub struct IdMapping {
    pub name: String,
    pub column: String,
    pub data_type: DataType,
    pub strategy: KeyStrategy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BasicMapping {
    pub column: String,
    pub data_type: DataType,
    pub nullable: bool,
    pub unique: bool,
    pub enumeration: Option<String>,
}

/// One embeddable field and the column it is stored in.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldColumn {
    pub field: String,
    pub column: String,
    pub data_type: DataType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedMapping {
    pub embeddable: String,
    pub fields: Vec<FieldColumn>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ElementShape {
    Basic { column: String, data_type: DataType },
    Embeddable { embeddable: String, fields: Vec<FieldColumn> },
}

impl ElementShape {
    pub fn columns(&self) -> Vec<String> {
        match self {
            ElementShape::Basic { column, .. } => vec![column.clone()],
            ElementShape::Embeddable { fields, .. } => fields.iter().map(|f| f.column.clone()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElementMapping {
    pub table: String,
    pub join_column: String,
    pub kind: CollectionKind,
    pub fetch: FetchType,
    pub shape: ElementShape,
}

impl ElementMapping {
    pub fn position_column(&self) -> Option<&'static str> {
        match self.kind {
            CollectionKind::List => Some(LIST_POSITION_COLUMN),
            CollectionKind::Set => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttributeKind {
    Basic(BasicMapping),
    Embedded(EmbeddedMapping),
    /// `JoinColumn` mappings always carry a resolved column name.
    Relationship(RelationshipDescriptor),
    Elements(ElementMapping),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub kind: AttributeKind,
}

impl Attribute {
    pub fn relationship(&self) -> Option<&RelationshipDescriptor> {
        match &self.kind {
            AttributeKind::Relationship(rel) => Some(rel),
            _ => None,
        }
    }

    /// Foreign key column held in the owner's own table, if any.
    pub fn join_column(&self) -> Option<&str> {
        match &self.kind {
            AttributeKind::Relationship(RelationshipDescriptor {
                mapping: RelationshipMapping::JoinColumn { column: Some(column) },
                ..
            }) => Some(column),
            _ => None,
        }
    }
}

/// A validated entity type with everything it inherits.
#[derive(Debug, Clone)]
pub struct EntityType {
    pub name: String,
    pub root: String,
    pub parent: Option<String>,
    pub is_abstract: bool,
    /// Table holding rows of this type; `None` for abstract table-per-class types.
    pub table: Option<String>,
    pub id: IdMapping,
    /// Root attributes first, then each subtype's own, in declaration order.
    pub attributes: Vec<Attribute>,
    pub strategy: Option<InheritanceStrategy>,
    pub discriminator: Option<String>,
    pub children: Vec<String>,
}

impl EntityType {
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn is_id(&self, name: &str) -> bool {
        self.id.name == name
    }

    pub fn table_name(&self) -> Result<&str> {
        self.table
            .as_deref()
            .ok_or_else(|| DbError::Mapping(format!("Entity '{}' has no table of its own", self.name)))
    }

    pub fn discriminator_column(&self) -> Option<&str> {
        match &self.strategy {
            Some(InheritanceStrategy::SingleTable { discriminator_column }) => Some(discriminator_column),
            _ => None,
        }
    }

    pub fn is_table_per_class(&self) -> bool {
        matches!(self.strategy, Some(InheritanceStrategy::TablePerClass))
    }

    /// Columns a row of this type is read from and written to, key first.
    pub fn columns(&self) -> Vec<String> {
        let mut columns = vec![self.id.column.clone()];
        if let Some(discriminator) = self.discriminator_column() {
            columns.push(discriminator.to_string());
        }
        for attribute in &self.attributes {
            match &attribute.kind {
                AttributeKind::Basic(basic) => columns.push(basic.column.clone()),
                AttributeKind::Embedded(embedded) => {
                    columns.extend(embedded.fields.iter().map(|f| f.column.clone()))
                }
                AttributeKind::Relationship(_) => {
                    if let Some(column) = attribute.join_column() {
                        columns.push(column.to_string());
                    }
                }
                AttributeKind::Elements(_) => {}
            }
        }
        columns
    }
}

/// Validated mapping metadata, shared by every unit of work of a
/// persistence unit.
#[derive(Debug, Clone)]
pub struct Metamodel {
    entities: BTreeMap<String, EntityType>,
    order: Vec<String>,
    embeddables: BTreeMap<String, EmbeddableDescriptor>,
    enumerations: BTreeMap<String, EnumDescriptor>,
    named_queries: BTreeMap<String, String>,
}

impl Metamodel {
    pub fn builder() -> super::MetamodelBuilder {
        super::MetamodelBuilder::new()
    }

    pub fn entity(&self, name: &str) -> Option<&EntityType> {
        self.entities.get(name)
    }

    pub fn require_entity(&self, name: &str) -> Result<&EntityType> {
        self.entity(name)
            .ok_or_else(|| DbError::Mapping(format!("Unknown entity type '{}'", name)))
    }

    /// Entity types in declaration order.
    pub fn entities(&self) -> impl Iterator<Item = &EntityType> {
        self.order.iter().filter_map(|name| self.entities.get(name))
    }

    pub fn embeddable(&self, name: &str) -> Option<&EmbeddableDescriptor> {
        self.embeddables.get(name)
    }

    /// Enumeration by qualified or simple name.
    pub fn enumeration(&self, name: &str) -> Option<&EnumDescriptor> {
        self.enumerations
            .get(name)
            .or_else(|| self.enumerations.values().find(|e| e.simple_name() == name))
    }

    /// Value of an enum literal path such as `jpql.MemberType.ADMIN`; `None`
    /// when the path does not name a declared enumeration.
    pub fn enum_constant(&self, segments: &[String]) -> Option<Result<String>> {
        let (constant, enum_path) = segments.split_last()?;
        if enum_path.is_empty() {
            return None;
        }
        let enumeration = self.enumeration(&enum_path.join("."))?;
        Some(if enumeration.contains(constant) {
            Ok(constant.clone())
        } else {
            Err(DbError::Translation(format!(
                "'{}' is not a constant of {}",
                constant, enumeration.name
            )))
        })
    }

    pub fn named_query(&self, name: &str) -> Option<&str> {
        self.named_queries.get(name).map(String::as_str)
    }

    pub fn named_queries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.named_queries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Whether `sub` is `sup` or one of its descendants.
    pub fn is_assignable(&self, sub: &str, sup: &str) -> bool {
        let mut current = Some(sub);
        while let Some(name) = current {
            if name == sup {
                return true;
            }
            current = self.entities.get(name).and_then(|e| e.parent.as_deref());
        }
        false
    }

    /// `name` and its descendants that can have rows, in declaration order.
    pub fn concrete_types(&self, name: &str) -> Vec<&EntityType> {
        self.entities()
            .filter(|e| !e.is_abstract && self.is_assignable(&e.name, name))
            .collect()
    }

    /// Entity type stored under `discriminator` in the hierarchy of `root`.
    pub fn type_for_discriminator(&self, root: &str, discriminator: &str) -> Option<&EntityType> {
        self.entities()
            .find(|e| e.root == root && e.discriminator.as_deref() == Some(discriminator))
    }

    /// Union of the columns of every concrete type under `name`, in first-seen order.
    pub fn polymorphic_columns(&self, name: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut columns = Vec::new();
        for entity in self.concrete_types(name) {
            for column in entity.columns() {
                if seen.insert(column.to_ascii_lowercase()) {
                    columns.push(column);
                }
            }
        }
        columns
    }

    /// Table definitions for every entity, link and element-collection
    /// table, ordered so that foreign-key targets come first.
    pub fn table_schemas(&self) -> Result<Vec<TableSchema>> {
        let mut tables: Vec<(String, Vec<Column>)> = Vec::new();

        fn table_mut<'a>(tables: &'a mut Vec<(String, Vec<Column>)>, name: &str) -> &'a mut Vec<Column> {
            let idx = match tables.iter().position(|(t, _)| t.eq_ignore_ascii_case(name)) {
                Some(idx) => idx,
                None => {
                    tables.push((name.to_string(), Vec::new()));
                    tables.len() - 1
                }
            };
            &mut tables[idx].1
        }

        fn add_column(columns: &mut Vec<Column>, column: Column) {
            if !columns.iter().any(|c| c.name.eq_ignore_ascii_case(&column.name)) {
                columns.push(column);
            }
        }

        for entity in self.entities() {
            let Some(table) = entity.table.clone() else {
                continue;
            };
            let shared = entity.discriminator_column().is_some();
            let root = self.require_entity(&entity.root)?;
            let columns = table_mut(&mut tables, &table);

            add_column(columns, Column::new(&entity.id.column, entity.id.data_type).primary_key());
            if let Some(discriminator) = entity.discriminator_column() {
                add_column(columns, Column::new(discriminator, DataType::Text).not_null());
            }
            for attribute in &entity.attributes {
                // Columns of single-table subtypes are NULL in sibling rows.
                let subtype_only = shared && root.attribute(&attribute.name).is_none();
                match &attribute.kind {
                    AttributeKind::Basic(basic) => {
                        let mut column = Column::new(&basic.column, basic.data_type);
                        if !basic.nullable && !subtype_only {
                            column = column.not_null();
                        }
                        if basic.unique {
                            column = column.unique();
                        }
                        add_column(columns, column);
                    }
                    AttributeKind::Embedded(embedded) => {
                        for field in &embedded.fields {
                            add_column(columns, Column::new(&field.column, field.data_type));
                        }
                    }
                    AttributeKind::Relationship(rel) => {
                        if let Some(join_column) = attribute.join_column() {
                            let target = self.require_entity(&rel.target)?;
                            let mut column = Column::new(join_column, target.id.data_type);
                            if let Some(target_table) = &target.table
                                && !target.is_table_per_class()
                            {
                                column = column.references(target_table, &target.id.column);
                            }
                            if !rel.optional && !subtype_only {
                                column = column.not_null();
                            }
                            add_column(columns, column);
                        }
                    }
                    AttributeKind::Elements(_) => {}
                }
            }
        }

        // Second pass: tables owned by relationships and element collections.
        for entity in self.entities() {
            for attribute in &entity.attributes {
                match &attribute.kind {
                    AttributeKind::Relationship(rel) => match &rel.mapping {
                        RelationshipMapping::TargetJoinColumn { column } => {
                            for target in self.concrete_types(&rel.target) {
                                let Some(target_table) = target.table.clone() else {
                                    continue;
                                };
                                let mut fk = Column::new(column, entity.id.data_type);
                                if let Some(owner_table) = self.owner_table(entity) {
                                    fk = fk.references(owner_table, &entity.id.column);
                                }
                                add_column(table_mut(&mut tables, &target_table), fk);
                            }
                        }
                        RelationshipMapping::JoinTable {
                            table,
                            join_column,
                            inverse_column,
                        } => {
                            let target = self.require_entity(&rel.target)?;
                            let mut owner_fk = Column::new(join_column, entity.id.data_type).not_null();
                            if let Some(owner_table) = self.owner_table(entity) {
                                owner_fk = owner_fk.references(owner_table, &entity.id.column);
                            }
                            let mut target_fk = Column::new(inverse_column, target.id.data_type).not_null();
                            if let Some(target_table) = self.owner_table(target) {
                                target_fk = target_fk.references(target_table, &target.id.column);
                            }
                            let columns = table_mut(&mut tables, table);
                            add_column(columns, owner_fk);
                            add_column(columns, target_fk);
                        }
                        _ => {}
                    },
                    AttributeKind::Elements(elements) => {
                        let mut owner_fk = Column::new(&elements.join_column, entity.id.data_type).not_null();
                        if let Some(owner_table) = self.owner_table(entity) {
                            owner_fk = owner_fk.references(owner_table, &entity.id.column);
                        }
                        let columns = table_mut(&mut tables, &elements.table);
                        add_column(columns, owner_fk);
                        if let Some(position) = elements.position_column() {
                            add_column(columns, Column::new(position, DataType::Integer).not_null());
                        }
                        match &elements.shape {
                            ElementShape::Basic { column, data_type } => {
                                add_column(columns, Column::new(column, *data_type))
                            }
                            ElementShape::Embeddable { fields, .. } => {
                                for field in fields {
                                    add_column(columns, Column::new(&field.column, field.data_type));
                                }
                            }
                        }
                    }
                    _ => {}
                }
            }
        }

        order_by_dependencies(tables)
    }

    /// Table a foreign key to `entity` can reference; table-per-class
    /// hierarchies spread rows over several tables and get none.
    fn owner_table<'a>(&self, entity: &'a EntityType) -> Option<&'a str> {
        if entity.is_table_per_class() {
            None
        } else {
            entity.table.as_deref()
        }
    }
}

fn order_by_dependencies(tables: Vec<(String, Vec<Column>)>) -> Result<Vec<TableSchema>> {
    let mut remaining = tables;
    let mut created: HashSet<String> = HashSet::new();
    let mut ordered = Vec::new();

    while !remaining.is_empty() {
        let ready = remaining.iter().position(|(name, columns)| {
            columns.iter().all(|c| match &c.references {
                Some(fk) => fk.table.eq_ignore_ascii_case(name) || created.contains(&fk.table.to_ascii_lowercase()),
                None => true,
            })
        });
        let Some(idx) = ready else {
            let names: Vec<&str> = remaining.iter().map(|(n, _)| n.as_str()).collect();
            return Err(DbError::Mapping(format!(
                "Foreign keys between tables {} form a cycle",
                names.join(", ")
            )));
        };
        let (name, columns) = remaining.remove(idx);
        created.insert(name.to_ascii_lowercase());
        ordered.push(TableSchema::new(name, columns));
    }

    Ok(ordered)
}

// ============================================================================
// Resolution
// ============================================================================

pub(super) fn resolve(
    descriptors: Vec<EntityDescriptor>,
    embeddables: Vec<EmbeddableDescriptor>,
    enumerations: Vec<EnumDescriptor>,
    named_queries: Vec<NamedQueryDescriptor>,
) -> Result<Metamodel> {
    let mut enum_map = BTreeMap::new();
    for enumeration in enumerations {
        if enumeration.constants.is_empty() {
            return Err(DbError::Mapping(format!("Enumeration '{}' has no constants", enumeration.name)));
        }
        if enum_map.contains_key(&enumeration.name) {
            return Err(DbError::Mapping(format!("Enumeration '{}' is declared twice", enumeration.name)));
        }
        enum_map.insert(enumeration.name.clone(), enumeration);
    }

    let mut embeddable_map = BTreeMap::new();
    for embeddable in embeddables {
        if embeddable_map.contains_key(&embeddable.name) {
            return Err(DbError::Mapping(format!("Embeddable '{}' is declared twice", embeddable.name)));
        }
        embeddable_map.insert(embeddable.name.clone(), embeddable);
    }

    let mut by_name: HashMap<String, EntityDescriptor> = HashMap::new();
    let mut order = Vec::new();
    for descriptor in descriptors {
        if by_name.contains_key(&descriptor.name) {
            return Err(DbError::Mapping(format!("Entity '{}' is declared twice", descriptor.name)));
        }
        order.push(descriptor.name.clone());
        by_name.insert(descriptor.name.clone(), descriptor);
    }

    let mut resolver = Resolver {
        descriptors: &by_name,
        embeddables: &embeddable_map,
        resolved: BTreeMap::new(),
        in_progress: HashSet::new(),
    };
    for name in &order {
        resolver.resolve(name)?;
    }
    let mut entities = resolver.resolved;

    for name in &order {
        if let Some(parent) = entities.get(name).and_then(|e| e.parent.clone())
            && let Some(parent) = entities.get_mut(&parent)
        {
            parent.children.push(name.clone());
        }
    }

    let mut named = BTreeMap::new();
    for query in named_queries {
        if named.insert(query.name.clone(), query.query).is_some() {
            return Err(DbError::Mapping(format!("Named query '{}' is declared twice", query.name)));
        }
    }

    let model = Metamodel {
        entities,
        order,
        embeddables: embeddable_map,
        enumerations: enum_map,
        named_queries: named,
    };
    validate_enumerations(&model)?;
    validate_relationships(&model)?;
    validate_discriminators(&model)?;
    Ok(model)
}

struct Resolver<'a> {
    descriptors: &'a HashMap<String, EntityDescriptor>,
    embeddables: &'a BTreeMap<String, EmbeddableDescriptor>,
    resolved: BTreeMap<String, EntityType>,
    in_progress: HashSet<String>,
}

impl Resolver<'_> {
    fn resolve(&mut self, name: &str) -> Result<()> {
        if self.resolved.contains_key(name) {
            return Ok(());
        }
        if !self.in_progress.insert(name.to_string()) {
            return Err(DbError::Mapping(format!("Inheritance cycle through '{}'", name)));
        }
        let descriptors = self.descriptors;
        let descriptor = descriptors
            .get(name)
            .ok_or_else(|| DbError::Mapping(format!("Unknown entity type '{}'", name)))?;

        let entity = match &descriptor.inheritance {
            Inheritance::None => {
                if descriptor.is_abstract {
                    return Err(DbError::Mapping(format!(
                        "Entity '{}' is abstract but not part of a hierarchy",
                        name
                    )));
                }
                let id = self.resolve_id(descriptor)?;
                EntityType {
                    name: name.to_string(),
                    root: name.to_string(),
                    parent: None,
                    is_abstract: false,
                    table: Some(table_name(descriptor)),
                    id,
                    attributes: self.own_attributes(descriptor, &[])?,
                    strategy: None,
                    discriminator: None,
                    children: Vec::new(),
                }
            }
            Inheritance::Root { strategy } => {
                let id = self.resolve_id(descriptor)?;
                let table = match strategy {
                    InheritanceStrategy::TablePerClass if descriptor.is_abstract => None,
                    _ => Some(table_name(descriptor)),
                };
                EntityType {
                    name: name.to_string(),
                    root: name.to_string(),
                    parent: None,
                    is_abstract: descriptor.is_abstract,
                    table,
                    id,
                    attributes: self.own_attributes(descriptor, &[])?,
                    strategy: Some(strategy.clone()),
                    discriminator: match strategy {
                        InheritanceStrategy::SingleTable { .. } => Some(name.to_string()),
                        InheritanceStrategy::TablePerClass => None,
                    },
                    children: Vec::new(),
                }
            }
            Inheritance::Subtype {
                parent,
                discriminator_value,
            } => {
                if descriptor.id.is_some() {
                    return Err(DbError::Mapping(format!(
                        "Subtype '{}' must not declare a key; it inherits the key of '{}'",
                        name, parent
                    )));
                }
                if !self.descriptors.contains_key(parent) {
                    return Err(DbError::Mapping(format!(
                        "Parent '{}' of entity '{}' does not exist",
                        parent, name
                    )));
                }
                self.resolve(parent)?;
                let parent_type = self.resolved[parent.as_str()].clone();
                let Some(strategy) = parent_type.strategy.clone() else {
                    return Err(DbError::Mapping(format!(
                        "Parent '{}' of entity '{}' is not an inheritance root",
                        parent, name
                    )));
                };
                let (table, discriminator) = match &strategy {
                    InheritanceStrategy::SingleTable { .. } => (
                        parent_type.table.clone(),
                        Some(discriminator_value.clone().unwrap_or_else(|| name.to_string())),
                    ),
                    InheritanceStrategy::TablePerClass => (
                        if descriptor.is_abstract {
                            None
                        } else {
                            Some(table_name(descriptor))
                        },
                        None,
                    ),
                };
                let mut attributes = parent_type.attributes.clone();
                attributes.extend(self.own_attributes(descriptor, &parent_type.attributes)?);
                EntityType {
                    name: name.to_string(),
                    root: parent_type.root.clone(),
                    parent: Some(parent.clone()),
                    is_abstract: descriptor.is_abstract,
                    table,
                    id: parent_type.id.clone(),
                    attributes,
                    strategy: Some(strategy),
                    discriminator,
                    children: Vec::new(),
                }
            }
        };

        if entity.attributes.iter().any(|a| entity.is_id(&a.name)) {
            return Err(DbError::Mapping(format!(
                "Attribute '{}' of '{}' clashes with the key attribute",
                entity.id.name, name
            )));
        }

        self.in_progress.remove(name);
        self.resolved.insert(name.to_string(), entity);
        Ok(())
    }

    fn resolve_id(&self, descriptor: &EntityDescriptor) -> Result<IdMapping> {
        let id = descriptor
            .id
            .as_ref()
            .ok_or_else(|| DbError::Mapping(format!("Entity '{}' declares no key attribute", descriptor.name)))?;
        match (id.strategy, id.data_type) {
            (KeyStrategy::Sequence, DataType::Integer) | (KeyStrategy::Uuid, DataType::Text) => {}
            (KeyStrategy::Assigned, _) => {}
            (strategy, data_type) => {
                return Err(DbError::Mapping(format!(
                    "Key strategy {:?} cannot produce {} keys for '{}'",
                    strategy, data_type, descriptor.name
                )));
            }
        }
        Ok(IdMapping {
            name: id.name.clone(),
            column: id.column.clone().unwrap_or_else(|| id.name.clone()),
            data_type: id.data_type,
            strategy: id.strategy,
        })
    }

    fn own_attributes(&self, descriptor: &EntityDescriptor, inherited: &[Attribute]) -> Result<Vec<Attribute>> {
        let mut attributes: Vec<Attribute> = Vec::new();
        let mut push = |attribute: Attribute| -> Result<()> {
            if inherited.iter().chain(attributes.iter()).any(|a| a.name == attribute.name) {
                return Err(DbError::Mapping(format!(
                    "Attribute '{}' is declared twice in the hierarchy of '{}'",
                    attribute.name, descriptor.name
                )));
            }
            attributes.push(attribute);
            Ok(())
        };

        for basic in &descriptor.attributes {
            push(Attribute {
                name: basic.name.clone(),
                kind: AttributeKind::Basic(BasicMapping {
                    column: basic.column.clone().unwrap_or_else(|| basic.name.clone()),
                    data_type: basic.data_type,
                    nullable: basic.nullable,
                    unique: basic.unique,
                    enumeration: basic.enumeration.clone(),
                }),
            })?;
        }

        for embedded in &descriptor.embedded {
            let fields = self.embedded_fields(&descriptor.name, &embedded.embeddable, &embedded.overrides)?;
            push(Attribute {
                name: embedded.name.clone(),
                kind: AttributeKind::Embedded(EmbeddedMapping {
                    embeddable: embedded.embeddable.clone(),
                    fields,
                }),
            })?;
        }

        for rel in &descriptor.relationships {
            let target = self.descriptors.get(&rel.target).ok_or_else(|| {
                DbError::Mapping(format!(
                    "Relationship '{}.{}' targets unknown entity '{}'",
                    descriptor.name, rel.name, rel.target
                ))
            })?;
            let mut rel = rel.clone();
            match (&rel.mapping, rel.cardinality) {
                (RelationshipMapping::JoinColumn { column }, Cardinality::ManyToOne | Cardinality::OneToOne) => {
                    let column = match column {
                        Some(column) => column.clone(),
                        None => format!("{}_{}", rel.name, self.root_id_column(target)?),
                    };
                    rel.mapping = RelationshipMapping::JoinColumn { column: Some(column) };
                }
                (RelationshipMapping::TargetJoinColumn { .. }, Cardinality::OneToMany)
                | (RelationshipMapping::JoinTable { .. }, Cardinality::ManyToMany | Cardinality::OneToMany)
                | (RelationshipMapping::MappedBy { .. }, _) => {}
                (mapping, cardinality) => {
                    return Err(DbError::Mapping(format!(
                        "Relationship '{}.{}': {:?} cannot be mapped with {:?}",
                        descriptor.name, rel.name, cardinality, mapping
                    )));
                }
            }
            push(Attribute {
                name: rel.name.clone(),
                kind: AttributeKind::Relationship(rel),
            })?;
        }

        for collection in &descriptor.element_collections {
            let shape = match &collection.element {
                ElementKind::Basic { column, data_type } => ElementShape::Basic {
                    column: column.clone(),
                    data_type: *data_type,
                },
                ElementKind::Embeddable { embeddable, overrides } => ElementShape::Embeddable {
                    embeddable: embeddable.clone(),
                    fields: self.embedded_fields(&descriptor.name, embeddable, overrides)?,
                },
            };
            push(Attribute {
                name: collection.name.clone(),
                kind: AttributeKind::Elements(ElementMapping {
                    table: collection.table.clone(),
                    join_column: collection.join_column.clone(),
                    kind: collection.kind,
                    fetch: collection.fetch,
                    shape,
                }),
            })?;
        }

        Ok(attributes)
    }

    fn embedded_fields(
        &self,
        entity: &str,
        embeddable: &str,
        overrides: &BTreeMap<String, String>,
    ) -> Result<Vec<FieldColumn>> {
        let descriptor = self.embeddables.get(embeddable).ok_or_else(|| {
            DbError::Mapping(format!("Entity '{}' embeds unknown type '{}'", entity, embeddable))
        })?;
        if let Some(unknown) = overrides.keys().find(|k| !descriptor.fields.iter().any(|f| &f.name == *k)) {
            return Err(DbError::Mapping(format!(
                "Column override for unknown field '{}.{}'",
                embeddable, unknown
            )));
        }
        Ok(descriptor
            .fields
            .iter()
            .map(|field| FieldColumn {
                field: field.name.clone(),
                column: overrides.get(&field.name).cloned().unwrap_or_else(|| field.name.clone()),
                data_type: field.data_type,
            })
            .collect())
    }

    fn root_id_column(&self, descriptor: &EntityDescriptor) -> Result<String> {
        let mut current = descriptor;
        let mut hops = 0;
        loop {
            if let Some(id) = &current.id {
                return Ok(id.column.clone().unwrap_or_else(|| id.name.clone()));
            }
            let Inheritance::Subtype { parent, .. } = &current.inheritance else {
                return Err(DbError::Mapping(format!("Entity '{}' declares no key attribute", current.name)));
            };
            current = self
                .descriptors
                .get(parent)
                .ok_or_else(|| DbError::Mapping(format!("Unknown entity type '{}'", parent)))?;
            hops += 1;
            if hops > self.descriptors.len() {
                return Err(DbError::Mapping(format!("Inheritance cycle through '{}'", descriptor.name)));
            }
        }
    }
}

fn table_name(descriptor: &EntityDescriptor) -> String {
    descriptor.table.clone().unwrap_or_else(|| descriptor.name.clone())
}

fn validate_relationships(model: &Metamodel) -> Result<()> {
    for entity in model.entities() {
        for attribute in &entity.attributes {
            let Some(rel) = attribute.relationship() else {
                continue;
            };
            let RelationshipMapping::MappedBy { attribute: owner_attr } = &rel.mapping else {
                continue;
            };
            let target = model.require_entity(&rel.target)?;
            let owner = target.attribute(owner_attr).and_then(Attribute::relationship).ok_or_else(|| {
                DbError::Mapping(format!(
                    "'{}.{}' is mapped by '{}.{}', which is not a relationship",
                    entity.name, attribute.name, target.name, owner_attr
                ))
            })?;
            if !owner.is_owning() {
                return Err(DbError::Mapping(format!(
                    "'{}.{}' is mapped by '{}.{}', which is itself an inverse side",
                    entity.name, attribute.name, target.name, owner_attr
                )));
            }
            if !model.is_assignable(&entity.name, &owner.target) {
                return Err(DbError::Mapping(format!(
                    "'{}.{}' targets '{}', not '{}'",
                    target.name, owner_attr, owner.target, entity.name
                )));
            }
            let compatible = match rel.cardinality {
                Cardinality::OneToMany => owner.cardinality == Cardinality::ManyToOne,
                Cardinality::OneToOne => owner.cardinality == Cardinality::OneToOne,
                Cardinality::ManyToMany => owner.cardinality == Cardinality::ManyToMany,
                Cardinality::ManyToOne => false,
            };
            if !compatible {
                return Err(DbError::Mapping(format!(
                    "{:?} '{}.{}' cannot be mapped by {:?} '{}.{}'",
                    rel.cardinality, entity.name, attribute.name, owner.cardinality, target.name, owner_attr
                )));
            }
        }
    }
    Ok(())
}

fn validate_enumerations(model: &Metamodel) -> Result<()> {
    for entity in model.entities() {
        for attribute in &entity.attributes {
            let AttributeKind::Basic(BasicMapping {
                enumeration: Some(enumeration),
                data_type,
                ..
            }) = &attribute.kind
            else {
                continue;
            };
            if model.enumeration(enumeration).is_none() {
                return Err(DbError::Mapping(format!(
                    "'{}.{}' uses unknown enumeration '{}'",
                    entity.name, attribute.name, enumeration
                )));
            }
            if *data_type != DataType::Text {
                return Err(DbError::Mapping(format!(
                    "Enumerated attribute '{}.{}' must be stored as text",
                    entity.name, attribute.name
                )));
            }
        }
    }
    Ok(())
}

fn validate_discriminators(model: &Metamodel) -> Result<()> {
    let mut seen: HashMap<(&str, &str), &str> = HashMap::new();
    for entity in model.entities() {
        if let Some(value) = &entity.discriminator
            && let Some(other) = seen.insert((entity.root.as_str(), value.as_str()), entity.name.as_str())
        {
            return Err(DbError::Mapping(format!(
                "Entities '{}' and '{}' share discriminator value '{}'",
                other, entity.name, value
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::MetamodelBuilder;

    fn team_and_member() -> MetamodelBuilder {
        Metamodel::builder()
            .embeddable(
                EmbeddableDescriptor::new("Address")
                    .field("city", DataType::Text)
                    .field("street", DataType::Text),
            )
            .entity(
                EntityDescriptor::new("Team")
                    .id("id", DataType::Integer, KeyStrategy::Sequence)
                    .basic("name", DataType::Text)
                    .relationship(RelationshipDescriptor::one_to_many("members", "Member", "team")),
            )
            .entity(
                EntityDescriptor::new("Member")
                    .id("id", DataType::Integer, KeyStrategy::Sequence)
                    .basic("username", DataType::Text)
                    .embedded("address", "Address")
                    .relationship(RelationshipDescriptor::many_to_one("team", "Team").fetch(FetchType::Lazy)),
            )
    }

    #[test]
    fn test_resolved_columns() {
        let model = team_and_member().build().unwrap();
        let member = model.entity("Member").unwrap();
        assert_eq!(member.columns(), vec!["id", "username", "city", "street", "team_id"]);
        assert_eq!(member.attribute("team").unwrap().join_column(), Some("team_id"));
    }

    #[test]
    fn test_table_schemas_put_targets_first() {
        let model = Metamodel::builder()
            .entity(
                EntityDescriptor::new("Member")
                    .id("id", DataType::Integer, KeyStrategy::Assigned)
                    .relationship(RelationshipDescriptor::many_to_one("team", "Team")),
            )
            .entity(EntityDescriptor::new("Team").id("id", DataType::Integer, KeyStrategy::Assigned))
            .build()
            .unwrap();

        let tables = model.table_schemas().unwrap();
        let names: Vec<&str> = tables.iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["Team", "Member"]);
        let fk = tables[1].schema().get_column("team_id").unwrap();
        assert_eq!(fk.references.as_ref().unwrap().table, "Team");
    }

    #[test]
    fn test_single_table_hierarchy() {
        let model = Metamodel::builder()
            .entity(
                EntityDescriptor::new("Item")
                    .abstract_type()
                    .id("id", DataType::Integer, KeyStrategy::Assigned)
                    .attribute(BasicAttribute::new("name", DataType::Text).not_null())
                    .root(InheritanceStrategy::SingleTable {
                        discriminator_column: "DTYPE".into(),
                    }),
            )
            .entity(
                EntityDescriptor::new("Album")
                    .subtype_of("Item")
                    .discriminator("A")
                    .attribute(BasicAttribute::new("artist", DataType::Text).not_null()),
            )
            .build()
            .unwrap();

        let album = model.entity("Album").unwrap();
        assert_eq!(album.table.as_deref(), Some("Item"));
        assert_eq!(album.discriminator.as_deref(), Some("A"));
        assert_eq!(model.type_for_discriminator("Item", "A").unwrap().name, "Album");

        let tables = model.table_schemas().unwrap();
        assert_eq!(tables.len(), 1);
        let schema = tables[0].schema();
        assert!(!schema.get_column("name").unwrap().nullable);
        assert!(schema.get_column("artist").unwrap().nullable);
        assert!(!schema.get_column("DTYPE").unwrap().nullable);
    }

    #[test]
    fn test_table_per_class_hierarchy() {
        let model = Metamodel::builder()
            .entity(
                EntityDescriptor::new("Item")
                    .abstract_type()
                    .id("id", DataType::Integer, KeyStrategy::Assigned)
                    .basic("price", DataType::Integer)
                    .root(InheritanceStrategy::TablePerClass),
            )
            .entity(EntityDescriptor::new("Book").subtype_of("Item").basic("author", DataType::Text))
            .entity(EntityDescriptor::new("Movie").subtype_of("Item").basic("director", DataType::Text))
            .build()
            .unwrap();

        assert!(model.entity("Item").unwrap().table.is_none());
        let concrete: Vec<&str> = model.concrete_types("Item").iter().map(|e| e.name.as_str()).collect();
        assert_eq!(concrete, vec!["Book", "Movie"]);
        assert_eq!(
            model.polymorphic_columns("Item"),
            vec!["id", "price", "author", "director"]
        );
        assert!(model.is_assignable("Book", "Item"));
        assert!(!model.is_assignable("Item", "Book"));
    }

    #[test]
    fn test_validation_errors() {
        let missing_key = Metamodel::builder()
            .entity(EntityDescriptor::new("Team").basic("name", DataType::Text))
            .build();
        assert!(matches!(missing_key, Err(DbError::Mapping(_))));

        let bad_target = Metamodel::builder()
            .entity(
                EntityDescriptor::new("Member")
                    .id("id", DataType::Integer, KeyStrategy::Assigned)
                    .relationship(RelationshipDescriptor::many_to_one("team", "Nope")),
            )
            .build();
        assert!(matches!(bad_target, Err(DbError::Mapping(_))));

        let bad_mapped_by = Metamodel::builder()
            .entity(
                EntityDescriptor::new("Team")
                    .id("id", DataType::Integer, KeyStrategy::Assigned)
                    .relationship(RelationshipDescriptor::one_to_many("members", "Member", "club")),
            )
            .entity(EntityDescriptor::new("Member").id("id", DataType::Integer, KeyStrategy::Assigned))
            .build();
        assert!(matches!(bad_mapped_by, Err(DbError::Mapping(_))));

        let bad_strategy = Metamodel::builder()
            .entity(EntityDescriptor::new("Tag").id("id", DataType::Text, KeyStrategy::Sequence))
            .build();
        assert!(matches!(bad_strategy, Err(DbError::Mapping(_))));

        let subtype_key = Metamodel::builder()
            .entity(
                EntityDescriptor::new("Item")
                    .id("id", DataType::Integer, KeyStrategy::Assigned)
                    .root(InheritanceStrategy::TablePerClass),
            )
            .entity(
                EntityDescriptor::new("Book")
                    .subtype_of("Item")
                    .id("id", DataType::Integer, KeyStrategy::Assigned),
            )
            .build();
        assert!(matches!(subtype_key, Err(DbError::Mapping(_))));

        let unknown_enum = Metamodel::builder()
            .entity(
                EntityDescriptor::new("Member")
                    .id("id", DataType::Integer, KeyStrategy::Assigned)
                    .enumerated("type", "MemberType"),
            )
            .build();
        assert!(matches!(unknown_enum, Err(DbError::Mapping(_))));

        let empty_enum = Metamodel::builder()
            .enumeration(EnumDescriptor::new("MemberType", &[]))
            .build();
        assert!(matches!(empty_enum, Err(DbError::Mapping(_))));
    }

    #[test]
    fn test_json_document() {
        let json = r#"{
            "entities": [
                {
                    "name": "Team",
                    "id": { "name": "id", "data_type": "Integer", "strategy": "sequence" },
                    "attributes": [ { "name": "name", "data_type": "Text", "nullable": false } ]
                },
                {
                    "name": "Member",
                    "table": "MEMBER",
                    "id": { "name": "id", "data_type": "Integer" },
                    "relationships": [
                        {
                            "name": "team",
                            "target": "Team",
                            "cardinality": "many_to_one",
                            "mapping": { "join_column": { "column": "TEAM_ID" } },
                            "fetch": "lazy"
                        }
                    ]
                }
            ],
            "enumerations": [
                { "name": "jpql.MemberType", "constants": ["ADMIN", "USER"] }
            ],
            "named_queries": [
                { "name": "Member.byTeam", "query": "SELECT m FROM Member m WHERE m.team = :team" }
            ]
        }"#;

        let model = MetamodelBuilder::new().json(json).unwrap().build().unwrap();
        let member = model.entity("Member").unwrap();
        assert_eq!(member.table.as_deref(), Some("MEMBER"));
        assert_eq!(member.attribute("team").unwrap().join_column(), Some("TEAM_ID"));
        assert_eq!(model.entity("Team").unwrap().id.strategy, KeyStrategy::Sequence);
        assert!(model.named_query("Member.byTeam").is_some());
        assert_eq!(model.enumeration("MemberType").map(|e| e.name.as_str()), Some("jpql.MemberType"));
        assert_eq!(
            model.enum_constant(&["jpql".into(), "MemberType".into(), "USER".into()]).unwrap().unwrap(),
            "USER"
        );
    }

    #[test]
    fn test_invalid_named_query_fails_build() {
        let result = team_and_member()
            .named_query("Member.broken", "SELECT m FROM Member m WHERE m.nickname = :n")
            .build();
        assert!(matches!(result, Err(DbError::Mapping(_))));
    }
}

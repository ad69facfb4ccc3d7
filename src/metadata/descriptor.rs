//! Declarative mapping descriptors.
//!
//! Descriptors are plain data: they can be built in code with the chained
//! helpers below or deserialized from JSON, and are only checked when a
//! [`Metamodel`](super::Metamodel) is built from them.

use crate::core::DataType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStrategy {
    /// The caller sets the key before `persist`.
    #[default]
    Assigned,
    /// Integer key drawn from a data-source sequence at `persist`.
    Sequence,
    /// Random v4 UUID rendered as text.
    Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdDescriptor {
    pub name: String,
    #[serde(default)]
    pub column: Option<String>,
    pub data_type: DataType,
    #[serde(default)]
    pub strategy: KeyStrategy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicAttribute {
    pub name: String,
    #[serde(default)]
    pub column: Option<String>,
    pub data_type: DataType,
    #[serde(default = "default_true")]
    pub nullable: bool,
    #[serde(default)]
    pub unique: bool,
    /// Enumeration whose constant names the column stores.
    #[serde(default)]
    pub enumeration: Option<String>,
}

/// A named set of constants, stored by name in TEXT columns and written as
/// `Enum.CONSTANT` (optionally package qualified) in queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumDescriptor {
    pub name: String,
    pub constants: Vec<String>,
}

impl EnumDescriptor {
    pub fn new(name: &str, constants: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            constants: constants.iter().map(|c| c.to_string()).collect(),
        }
    }

    /// Name without its package, `MemberType` for `jpql.MemberType`.
    pub fn simple_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }

    pub fn contains(&self, constant: &str) -> bool {
        self.constants.iter().any(|c| c == constant)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedAttribute {
    pub name: String,
    pub embeddable: String,
    /// Field name to column name.
    #[serde(default)]
    pub overrides: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    OneToOne,
    OneToMany,
    ManyToOne,
    ManyToMany,
}

impl Cardinality {
    pub fn is_collection(&self) -> bool {
        matches!(self, Cardinality::OneToMany | Cardinality::ManyToMany)
    }
}

/// Where the foreign key of a relationship lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipMapping {
    /// Owning side with the foreign key in this entity's table.
    /// Defaults to `<attribute>_<target id column>`.
    JoinColumn { column: Option<String> },
    /// Inverse side; the named attribute of the target owns the relationship.
    MappedBy { attribute: String },
    /// Owning one-to-many with the foreign key stored on the target table.
    TargetJoinColumn { column: String },
    /// Owning side of a link table.
    JoinTable {
        table: String,
        join_column: String,
        inverse_column: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CascadeType {
    Persist,
    Remove,
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchType {
    Eager,
    Lazy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipDescriptor {
    pub name: String,
    pub target: String,
    pub cardinality: Cardinality,
    pub mapping: RelationshipMapping,
    #[serde(default)]
    pub cascade: Vec<CascadeType>,
    #[serde(default)]
    pub orphan_removal: bool,
    /// Defaults to eager for to-one and lazy for collections.
    #[serde(default)]
    pub fetch: Option<FetchType>,
    #[serde(default = "default_true")]
    pub optional: bool,
}

impl RelationshipDescriptor {
    pub fn new(name: &str, target: &str, cardinality: Cardinality, mapping: RelationshipMapping) -> Self {
        Self {
            name: name.to_string(),
            target: target.to_string(),
            cardinality,
            mapping,
            cascade: Vec::new(),
            orphan_removal: false,
            fetch: None,
            optional: true,
        }
    }

    pub fn many_to_one(name: &str, target: &str) -> Self {
        Self::new(name, target, Cardinality::ManyToOne, RelationshipMapping::JoinColumn { column: None })
    }

    pub fn one_to_one(name: &str, target: &str) -> Self {
        Self::new(name, target, Cardinality::OneToOne, RelationshipMapping::JoinColumn { column: None })
    }

    pub fn one_to_many(name: &str, target: &str, mapped_by: &str) -> Self {
        Self::new(
            name,
            target,
            Cardinality::OneToMany,
            RelationshipMapping::MappedBy {
                attribute: mapped_by.to_string(),
            },
        )
    }

    pub fn many_to_many(name: &str, target: &str, table: &str, join_column: &str, inverse_column: &str) -> Self {
        Self::new(
            name,
            target,
            Cardinality::ManyToMany,
            RelationshipMapping::JoinTable {
                table: table.to_string(),
                join_column: join_column.to_string(),
                inverse_column: inverse_column.to_string(),
            },
        )
    }

    pub fn join_column(mut self, column: &str) -> Self {
        self.mapping = RelationshipMapping::JoinColumn {
            column: Some(column.to_string()),
        };
        self
    }

    pub fn mapped_by(mut self, attribute: &str) -> Self {
        self.mapping = RelationshipMapping::MappedBy {
            attribute: attribute.to_string(),
        };
        self
    }

    pub fn target_join_column(mut self, column: &str) -> Self {
        self.mapping = RelationshipMapping::TargetJoinColumn {
            column: column.to_string(),
        };
        self
    }

    pub fn cascade(mut self, cascade: CascadeType) -> Self {
        if !self.cascade.contains(&cascade) {
            self.cascade.push(cascade);
        }
        self
    }

    pub fn orphan_removal(mut self) -> Self {
        self.orphan_removal = true;
        self
    }

    pub fn fetch(mut self, fetch: FetchType) -> Self {
        self.fetch = Some(fetch);
        self
    }

    pub fn required(mut self) -> Self {
        self.optional = false;
        self
    }

    pub fn fetch_type(&self) -> FetchType {
        self.fetch.unwrap_or(if self.cardinality.is_collection() {
            FetchType::Lazy
        } else {
            FetchType::Eager
        })
    }

    pub fn cascades(&self, wanted: CascadeType) -> bool {
        self.cascade.iter().any(|c| *c == wanted || *c == CascadeType::All)
    }

    /// Whether this side writes the relationship.
    pub fn is_owning(&self) -> bool {
        !matches!(self.mapping, RelationshipMapping::MappedBy { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionKind {
    #[default]
    Set,
    /// Ordered; stored with a position column.
    List,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Basic { column: String, data_type: DataType },
    Embeddable {
        embeddable: String,
        #[serde(default)]
        overrides: BTreeMap<String, String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementCollectionDescriptor {
    pub name: String,
    pub table: String,
    pub join_column: String,
    pub element: ElementKind,
    #[serde(default)]
    pub kind: CollectionKind,
    #[serde(default = "default_lazy")]
    pub fetch: FetchType,
}

impl ElementCollectionDescriptor {
    pub fn basic(name: &str, table: &str, join_column: &str, column: &str, data_type: DataType) -> Self {
        Self {
            name: name.to_string(),
            table: table.to_string(),
            join_column: join_column.to_string(),
            element: ElementKind::Basic {
                column: column.to_string(),
                data_type,
            },
            kind: CollectionKind::Set,
            fetch: FetchType::Lazy,
        }
    }

    pub fn embeddable(name: &str, table: &str, join_column: &str, embeddable: &str) -> Self {
        Self {
            name: name.to_string(),
            table: table.to_string(),
            join_column: join_column.to_string(),
            element: ElementKind::Embeddable {
                embeddable: embeddable.to_string(),
                overrides: BTreeMap::new(),
            },
            kind: CollectionKind::Set,
            fetch: FetchType::Lazy,
        }
    }

    pub fn list(mut self) -> Self {
        self.kind = CollectionKind::List;
        self
    }

    pub fn fetch(mut self, fetch: FetchType) -> Self {
        self.fetch = fetch;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InheritanceStrategy {
    /// Every type of the hierarchy shares the root table.
    SingleTable { discriminator_column: String },
    /// Every concrete type has a table holding all of its attributes.
    TablePerClass,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Inheritance {
    #[default]
    None,
    Root { strategy: InheritanceStrategy },
    /// `discriminator_value` defaults to the entity name.
    Subtype {
        parent: String,
        #[serde(default)]
        discriminator_value: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    pub name: String,
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default, rename = "abstract")]
    pub is_abstract: bool,
    #[serde(default)]
    pub id: Option<IdDescriptor>,
    #[serde(default)]
    pub attributes: Vec<BasicAttribute>,
    #[serde(default)]
    pub embedded: Vec<EmbeddedAttribute>,
    #[serde(default)]
    pub relationships: Vec<RelationshipDescriptor>,
    #[serde(default)]
    pub element_collections: Vec<ElementCollectionDescriptor>,
    #[serde(default)]
    pub inheritance: Inheritance,
}

impl EntityDescriptor {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            table: None,
            is_abstract: false,
            id: None,
            attributes: Vec::new(),
            embedded: Vec::new(),
            relationships: Vec::new(),
            element_collections: Vec::new(),
            inheritance: Inheritance::None,
        }
    }

    pub fn table(mut self, table: &str) -> Self {
        self.table = Some(table.to_string());
        self
    }

    pub fn abstract_type(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    pub fn id(mut self, name: &str, data_type: DataType, strategy: KeyStrategy) -> Self {
        self.id = Some(IdDescriptor {
            name: name.to_string(),
            column: None,
            data_type,
            strategy,
        });
        self
    }

    pub fn id_column(mut self, column: &str) -> Self {
        if let Some(id) = self.id.as_mut() {
            id.column = Some(column.to_string());
        }
        self
    }

    pub fn basic(self, name: &str, data_type: DataType) -> Self {
        self.attribute(BasicAttribute::new(name, data_type))
    }

    /// Attribute holding one constant of `enumeration`, stored by name.
    pub fn enumerated(self, name: &str, enumeration: &str) -> Self {
        self.attribute(BasicAttribute::new(name, DataType::Text).enumerated(enumeration))
    }

    pub fn attribute(mut self, attribute: BasicAttribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn embedded(mut self, name: &str, embeddable: &str) -> Self {
        self.embedded.push(EmbeddedAttribute {
            name: name.to_string(),
            embeddable: embeddable.to_string(),
            overrides: BTreeMap::new(),
        });
        self
    }

    /// Embedded attribute with `(field, column)` overrides.
    pub fn embedded_with(mut self, name: &str, embeddable: &str, overrides: &[(&str, &str)]) -> Self {
        self.embedded.push(EmbeddedAttribute {
            name: name.to_string(),
            embeddable: embeddable.to_string(),
            overrides: overrides
                .iter()
                .map(|(field, column)| (field.to_string(), column.to_string()))
                .collect(),
        });
        self
    }

    pub fn relationship(mut self, relationship: RelationshipDescriptor) -> Self {
        self.relationships.push(relationship);
        self
    }

    pub fn element_collection(mut self, collection: ElementCollectionDescriptor) -> Self {
        self.element_collections.push(collection);
        self
    }

    pub fn root(mut self, strategy: InheritanceStrategy) -> Self {
        self.inheritance = Inheritance::Root { strategy };
        self
    }

    pub fn subtype_of(mut self, parent: &str) -> Self {
        self.inheritance = Inheritance::Subtype {
            parent: parent.to_string(),
            discriminator_value: None,
        };
        self
    }

    pub fn discriminator(mut self, value: &str) -> Self {
        if let Inheritance::Subtype {
            discriminator_value, ..
        } = &mut self.inheritance
        {
            *discriminator_value = Some(value.to_string());
        }
        self
    }
}

impl BasicAttribute {
    pub fn new(name: &str, data_type: DataType) -> Self {
        Self {
            name: name.to_string(),
            column: None,
            data_type,
            nullable: true,
            unique: false,
            enumeration: None,
        }
    }

    pub fn enumerated(mut self, enumeration: &str) -> Self {
        self.enumeration = Some(enumeration.to_string());
        self
    }

    pub fn column(mut self, column: &str) -> Self {
        self.column = Some(column.to_string());
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddableField {
    pub name: String,
    pub data_type: DataType,
    #[serde(default = "default_true")]
    pub nullable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddableDescriptor {
    pub name: String,
    pub fields: Vec<EmbeddableField>,
}

impl EmbeddableDescriptor {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, name: &str, data_type: DataType) -> Self {
        self.fields.push(EmbeddableField {
            name: name.to_string(),
            data_type,
            nullable: true,
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedQueryDescriptor {
    pub name: String,
    pub query: String,
}

fn default_true() -> bool {
    true
}

fn default_lazy() -> FetchType {
    FetchType::Lazy
}

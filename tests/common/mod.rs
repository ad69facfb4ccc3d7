#![allow(dead_code)]

use memorm::{
    BasicAttribute, Cardinality, CascadeType, DataSource, DataType, ElementCollectionDescriptor, EmbeddableDescriptor,
    EmbeddedValue, EntityDescriptor, EntityHandle, EnumDescriptor, FetchType, InMemoryDB, InheritanceStrategy, KeyStrategy,
    Metamodel, PersistenceConfig, PersistenceUnit, RelationshipDescriptor, RelationshipMapping, Result, UnitOfWork, Value,
};
use std::sync::Arc;

pub fn model() -> Result<Metamodel> {
    Metamodel::builder()
        .enumeration(EnumDescriptor::new("jpql.MemberType", &["ADMIN", "USER"]))
        .embeddable(
            EmbeddableDescriptor::new("Address")
                .field("city", DataType::Text)
                .field("street", DataType::Text)
                .field("zipcode", DataType::Text),
        )
        .entity(
            EntityDescriptor::new("Team")
                .id("id", DataType::Integer, KeyStrategy::Sequence)
                .id_column("TEAM_ID")
                .basic("name", DataType::Text)
                .relationship(RelationshipDescriptor::one_to_many("members", "Member", "team")),
        )
        .entity(
            EntityDescriptor::new("Member")
                .id("id", DataType::Integer, KeyStrategy::Sequence)
                .id_column("MEMBER_ID")
                .attribute(BasicAttribute::new("username", DataType::Text).not_null())
                .basic("age", DataType::Integer)
                .enumerated("type", "jpql.MemberType")
                .embedded("homeAddress", "Address")
                .relationship(
                    RelationshipDescriptor::many_to_one("team", "Team")
                        .join_column("TEAM_ID")
                        .fetch(FetchType::Lazy),
                )
                .element_collection(ElementCollectionDescriptor::basic(
                    "favoriteFoods",
                    "FAVORITE_FOOD",
                    "MEMBER_ID",
                    "FOOD_NAME",
                    DataType::Text,
                ))
                .element_collection(
                    ElementCollectionDescriptor::embeddable("addressHistory", "ADDRESS_HISTORY", "MEMBER_ID", "Address")
                        .list(),
                ),
        )
        .entity(
            EntityDescriptor::new("Parent")
                .id("id", DataType::Integer, KeyStrategy::Sequence)
                .basic("name", DataType::Text)
                .relationship(
                    RelationshipDescriptor::one_to_many("children", "Child", "parent")
                        .cascade(CascadeType::All)
                        .orphan_removal(),
                ),
        )
        .entity(
            EntityDescriptor::new("Child")
                .id("id", DataType::Integer, KeyStrategy::Sequence)
                .basic("name", DataType::Text)
                .relationship(RelationshipDescriptor::many_to_one("parent", "Parent").join_column("PARENT_ID")),
        )
        .entity(
            EntityDescriptor::new("Item")
                .abstract_type()
                .id("id", DataType::Integer, KeyStrategy::Sequence)
                .basic("name", DataType::Text)
                .basic("price", DataType::Integer)
                .root(InheritanceStrategy::TablePerClass),
        )
        .entity(EntityDescriptor::new("Book").subtype_of("Item").basic("author", DataType::Text))
        .entity(EntityDescriptor::new("Movie").subtype_of("Item").basic("director", DataType::Text))
        .entity(
            EntityDescriptor::new("Product")
                .abstract_type()
                .id("id", DataType::Integer, KeyStrategy::Sequence)
                .basic("name", DataType::Text)
                .root(InheritanceStrategy::SingleTable {
                    discriminator_column: "DTYPE".into(),
                }),
        )
        .entity(
            EntityDescriptor::new("Album")
                .subtype_of("Product")
                .discriminator("A")
                .basic("artist", DataType::Text),
        )
        .entity(
            EntityDescriptor::new("Shirt")
                .subtype_of("Product")
                .discriminator("S")
                .basic("size", DataType::Text),
        )
        .entity(
            EntityDescriptor::new("Ticket")
                .id("id", DataType::Text, KeyStrategy::Uuid)
                .basic("title", DataType::Text),
        )
        .entity(
            EntityDescriptor::new("Category")
                .id("id", DataType::Integer, KeyStrategy::Sequence)
                .basic("name", DataType::Text)
                .relationship(RelationshipDescriptor::many_to_many(
                    "members",
                    "Member",
                    "CATEGORY_MEMBER",
                    "CATEGORY_ID",
                    "MEMBER_ID",
                )),
        )
        .entity(
            EntityDescriptor::new("Board")
                .id("id", DataType::Integer, KeyStrategy::Sequence)
                .basic("title", DataType::Text)
                .relationship(RelationshipDescriptor::new(
                    "posts",
                    "Post",
                    Cardinality::OneToMany,
                    RelationshipMapping::TargetJoinColumn {
                        column: "BOARD_ID".into(),
                    },
                )),
        )
        .entity(
            EntityDescriptor::new("Post")
                .id("id", DataType::Integer, KeyStrategy::Sequence)
                .basic("title", DataType::Text),
        )
        .entity(
            EntityDescriptor::new("Locker")
                .id("number", DataType::Integer, KeyStrategy::Assigned)
                .basic("owner", DataType::Text),
        )
        .named_query("Member.findByUsername", "SELECT m FROM Member m WHERE m.username = :username")
        .build()
}

pub async fn unit() -> Result<PersistenceUnit> {
    unit_with(PersistenceConfig::new("test")).await
}

pub async fn unit_with(config: PersistenceConfig) -> Result<PersistenceUnit> {
    let source: Arc<dyn DataSource> = Arc::new(InMemoryDB::new());
    let unit = PersistenceUnit::new(model()?, source, config);
    unit.create_schema().await?;
    Ok(unit)
}

pub fn address(city: &str, street: &str, zipcode: &str) -> EmbeddedValue {
    EmbeddedValue::new()
        .with("city", city)
        .with("street", street)
        .with("zipcode", zipcode)
}

pub async fn new_team(uow: &mut UnitOfWork, name: &str) -> Result<EntityHandle> {
    let team = uow.instantiate("Team")?;
    uow.set(team, "name", name)?;
    uow.persist(team).await?;
    Ok(team)
}

pub async fn new_member(
    uow: &mut UnitOfWork,
    username: &str,
    age: i64,
    team: Option<EntityHandle>,
) -> Result<EntityHandle> {
    let member = uow.instantiate("Member")?;
    uow.set(member, "username", username)?;
    uow.set(member, "age", age)?;
    uow.set_reference(member, "team", team)?;
    uow.persist(member).await?;
    Ok(member)
}

pub async fn count(uow: &mut UnitOfWork, query: &str) -> Result<i64> {
    let value = uow.create_query(query).single_result().await?;
    match value.as_ref().and_then(|v| v.as_scalar()) {
        Some(Value::Integer(n)) => Ok(*n),
        other => panic!("Expected an integer count, got {:?}", other),
    }
}

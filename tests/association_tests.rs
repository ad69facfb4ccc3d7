mod common;

use memorm::{DbError, Element, EmbeddedValue, LifecycleState, QueryValue, Result, UnitStatus, Value};

#[tokio::test]
async fn test_query_by_associated_instance() -> Result<()> {
    let unit = common::unit().await?;
    let mut uow = unit.open().await?;
    let team_a = common::new_team(&mut uow, "teamA").await?;
    let team_b = common::new_team(&mut uow, "teamB").await?;
    let member1 = common::new_member(&mut uow, "member1", 10, Some(team_a)).await?;
    common::new_member(&mut uow, "member2", 20, Some(team_b)).await?;
    common::new_member(&mut uow, "member3", 30, None).await?;

    let members = uow
        .create_query("SELECT m FROM Member m WHERE m.team = :team")
        .bind_entity("team", team_a)?
        .result_list()
        .await?;
    assert_eq!(members, vec![QueryValue::Entity(member1)]);

    let names = uow
        .create_query("SELECT m.username FROM Member m JOIN m.team t WHERE t.name = :name")
        .bind("name", "teamB")
        .result_list()
        .await?;
    assert_eq!(names, vec![QueryValue::Scalar(Value::Text("member2".into()))]);

    Ok(())
}

#[tokio::test]
async fn test_lazy_associations_load_on_access() -> Result<()> {
    let unit = common::unit().await?;
    let mut uow = unit.open().await?;
    let team = common::new_team(&mut uow, "teamA").await?;
    let member1 = common::new_member(&mut uow, "member1", 10, Some(team)).await?;
    common::new_member(&mut uow, "member2", 20, Some(team)).await?;
    let member_key = uow.key_of(member1)?;
    let team_key = uow.key_of(team)?;
    uow.commit().await?;

    let mut uow = unit.open().await?;
    let member = uow.find("Member", member_key).await?.expect("member was committed");
    let team = uow.reference(member, "team").await?.expect("team was committed");
    assert_eq!(uow.key_of(team)?, team_key);
    assert_eq!(uow.get(team, "name")?, Value::Text("teamA".into()));

    let members = uow.collection(team, "members").await?;
    assert_eq!(members.len(), 2);
    // The member loaded first is reused, not loaded twice
    assert!(members.contains(&member));

    Ok(())
}

#[tokio::test]
async fn test_changing_a_reference_updates_the_foreign_key() -> Result<()> {
    let unit = common::unit().await?;
    let mut uow = unit.open().await?;
    let team_a = common::new_team(&mut uow, "teamA").await?;
    let team_b = common::new_team(&mut uow, "teamB").await?;
    let member = common::new_member(&mut uow, "member1", 10, Some(team_a)).await?;
    let key = uow.key_of(member)?;
    let team_b_key = uow.key_of(team_b)?;
    uow.commit().await?;

    let mut uow = unit.open().await?;
    let member = uow.find("Member", key.clone()).await?.expect("member was committed");
    let team_b = uow.find("Team", team_b_key).await?.expect("team was committed");
    uow.set_reference(member, "team", Some(team_b))?;
    let report = uow.commit().await?;
    assert_eq!(report.updates, 1);

    let mut uow = unit.open().await?;
    let member = uow.find("Member", key).await?.expect("member was committed");
    let team = uow.reference(member, "team").await?.expect("team was committed");
    assert_eq!(uow.get(team, "name")?, Value::Text("teamB".into()));

    Ok(())
}

#[tokio::test]
async fn test_reading_a_reference_to_a_removed_instance_writes_nothing() -> Result<()> {
    let unit = common::unit().await?;
    let mut uow = unit.open().await?;
    let team = common::new_team(&mut uow, "teamA").await?;
    let member = common::new_member(&mut uow, "member1", 10, Some(team)).await?;
    let member_key = uow.key_of(member)?;
    let team_key = uow.key_of(team)?;
    uow.commit().await?;

    // The member still refers to the removed team, so the delete is rejected
    let mut uow = unit.open().await?;
    let member = uow.find("Member", member_key.clone()).await?.expect("member was committed");
    let team = uow.find("Team", team_key.clone()).await?.expect("team was committed");
    uow.remove(team).await?;
    assert_eq!(uow.reference(member, "team").await?, Some(team));
    assert_eq!(uow.state(team)?, LifecycleState::Removed);
    match uow.flush().await {
        Err(DbError::ConstraintViolation(_)) => {}
        other => panic!("Expected ConstraintViolation, got {:?}", other),
    }
    uow.rollback().await?;

    let mut uow = unit.open().await?;
    let member = uow.find("Member", member_key).await?.expect("member was committed");
    let team = uow.find("Team", team_key).await?.expect("team was committed");
    uow.remove(team).await?;
    assert_eq!(uow.reference(member, "team").await?, Some(team));
    uow.remove(member).await?;
    let report = uow.commit().await?;
    assert_eq!(report.updates, 0);
    assert_eq!(report.deletes, 2);

    Ok(())
}

#[tokio::test]
async fn test_embedded_value_change_is_written() -> Result<()> {
    let unit = common::unit().await?;
    let mut uow = unit.open().await?;
    let member = common::new_member(&mut uow, "member1", 10, None).await?;
    uow.set_embedded(member, "homeAddress", Some(common::address("homeCity", "street", "10000")))?;
    let key = uow.key_of(member)?;
    uow.commit().await?;

    let mut uow = unit.open().await?;
    let member = uow.find("Member", key.clone()).await?.expect("member was committed");
    let mut address = uow.embedded(member, "homeAddress")?.expect("address was written");
    address.set("city", "newCity");
    uow.set_embedded(member, "homeAddress", Some(address))?;
    let report = uow.flush().await?;
    assert_eq!(report.updates, 1);

    let cities = uow
        .create_query("SELECT m.homeAddress.city FROM Member m")
        .result_list()
        .await?;
    assert_eq!(cities, vec![QueryValue::Scalar(Value::Text("newCity".into()))]);

    // A value with every field NULL reads back as no value
    let cleared = EmbeddedValue::new().with("city", Value::Null).with("zipcode", Value::Null);
    uow.set_embedded(member, "homeAddress", Some(cleared))?;
    assert_eq!(uow.embedded(member, "homeAddress")?, None);

    Ok(())
}

#[tokio::test]
async fn test_element_set_changes() -> Result<()> {
    let unit = common::unit().await?;
    let mut uow = unit.open().await?;
    let member = common::new_member(&mut uow, "member1", 10, None).await?;
    {
        let foods = uow.elements_mut(member, "favoriteFoods").await?;
        assert!(foods.insert("chicken"));
        assert!(foods.insert("jokbal"));
        assert!(!foods.insert("jokbal"));
    }
    let key = uow.key_of(member)?;
    uow.commit().await?;

    let mut uow = unit.open().await?;
    let member = uow.find("Member", key.clone()).await?.expect("member was committed");
    {
        let foods = uow.elements_mut(member, "favoriteFoods").await?;
        assert_eq!(foods.len(), 2);
        assert!(foods.remove(&Element::from("chicken")));
        foods.insert("pizza");
    }
    let report = uow.commit().await?;
    assert!(report.collection_writes > 0);
    assert_eq!(report.updates, 0);

    let mut uow = unit.open().await?;
    let member = uow.find("Member", key).await?.expect("member was committed");
    let foods = uow.elements(member, "favoriteFoods").await?;
    assert_eq!(foods.len(), 2);
    assert!(foods.contains(&Element::from("pizza")));
    assert!(foods.contains(&Element::from("jokbal")));
    assert!(!foods.contains(&Element::from("chicken")));

    Ok(())
}

#[tokio::test]
async fn test_element_list_keeps_order() -> Result<()> {
    let unit = common::unit().await?;
    let mut uow = unit.open().await?;
    let member = common::new_member(&mut uow, "member1", 10, None).await?;
    {
        let history = uow.elements_mut(member, "addressHistory").await?;
        history.insert(common::address("old1", "street", "10000"));
        history.insert(common::address("old2", "street", "20000"));
        history.insert(common::address("old1", "street", "10000"));
    }
    let key = uow.key_of(member)?;
    uow.commit().await?;

    let mut uow = unit.open().await?;
    let member = uow.find("Member", key.clone()).await?.expect("member was committed");
    let history = uow.elements(member, "addressHistory").await?;
    let cities: Vec<Value> = history
        .iter()
        .map(|element| match element {
            Element::Embedded(address) => address.get("city").clone(),
            Element::Value(value) => panic!("Expected an address, got {:?}", value),
        })
        .collect();
    assert_eq!(
        cities,
        vec![
            Value::Text("old1".into()),
            Value::Text("old2".into()),
            Value::Text("old1".into())
        ]
    );

    {
        let history = uow.elements_mut(member, "addressHistory").await?;
        assert!(history.remove(&Element::from(common::address("old1", "street", "10000"))));
        history.insert(common::address("newCity1", "street", "30000"));
    }
    uow.commit().await?;

    let mut uow = unit.open().await?;
    let member = uow.find("Member", key).await?.expect("member was committed");
    let history = uow.elements(member, "addressHistory").await?;
    assert_eq!(
        history.as_slice(),
        &[
            Element::from(common::address("old2", "street", "20000")),
            Element::from(common::address("old1", "street", "10000")),
            Element::from(common::address("newCity1", "street", "30000")),
        ]
    );

    Ok(())
}

#[tokio::test]
async fn test_cascade_persist_and_remove() -> Result<()> {
    let unit = common::unit().await?;
    let mut uow = unit.open().await?;
    let parent = uow.instantiate("Parent")?;
    uow.set(parent, "name", "parent")?;
    let mut children = Vec::new();
    for name in ["child1", "child2"] {
        let child = uow.instantiate("Child")?;
        uow.set(child, "name", name)?;
        uow.set_reference(child, "parent", Some(parent))?;
        uow.collection_mut(parent, "children").await?.push(child);
        children.push(child);
    }

    // Only the parent is persisted explicitly
    uow.persist(parent).await?;
    for &child in &children {
        assert_eq!(uow.state(child)?, LifecycleState::Managed);
    }
    let report = uow.flush().await?;
    assert_eq!(report.inserts, 3);
    assert_eq!(common::count(&mut uow, "SELECT COUNT(c) FROM Child c").await?, 2);

    uow.remove(parent).await?;
    for &child in &children {
        assert_eq!(uow.state(child)?, LifecycleState::Removed);
    }
    let report = uow.commit().await?;
    assert_eq!(report.deletes, 3);

    let mut uow = unit.open().await?;
    assert_eq!(common::count(&mut uow, "SELECT COUNT(c) FROM Child c").await?, 0);
    assert_eq!(common::count(&mut uow, "SELECT COUNT(p) FROM Parent p").await?, 0);

    Ok(())
}

#[tokio::test]
async fn test_cascade_remove_loads_deferred_children() -> Result<()> {
    let unit = common::unit().await?;
    let mut uow = unit.open().await?;
    let parent = uow.instantiate("Parent")?;
    uow.set(parent, "name", "parent")?;
    let child = uow.instantiate("Child")?;
    uow.set(child, "name", "child")?;
    uow.set_reference(child, "parent", Some(parent))?;
    uow.collection_mut(parent, "children").await?.push(child);
    uow.persist(parent).await?;
    let key = uow.key_of(parent)?;
    uow.commit().await?;

    let mut uow = unit.open().await?;
    let parent = uow.find("Parent", key).await?.expect("parent was committed");
    uow.remove(parent).await?;
    uow.commit().await?;

    let mut uow = unit.open().await?;
    assert_eq!(common::count(&mut uow, "SELECT COUNT(c) FROM Child c").await?, 0);

    Ok(())
}

#[tokio::test]
async fn test_orphan_removal() -> Result<()> {
    let unit = common::unit().await?;
    let mut uow = unit.open().await?;
    let parent = uow.instantiate("Parent")?;
    uow.set(parent, "name", "parent")?;
    for name in ["child1", "child2"] {
        let child = uow.instantiate("Child")?;
        uow.set(child, "name", name)?;
        uow.set_reference(child, "parent", Some(parent))?;
        uow.collection_mut(parent, "children").await?.push(child);
    }
    uow.persist(parent).await?;
    let key = uow.key_of(parent)?;
    uow.commit().await?;

    let mut uow = unit.open().await?;
    let parent = uow.find("Parent", key).await?.expect("parent was committed");
    let orphan = uow.collection_mut(parent, "children").await?.remove(0);
    let report = uow.flush().await?;
    assert_eq!(report.deletes, 1);
    assert_eq!(uow.state(orphan)?, LifecycleState::Removed);
    uow.commit().await?;

    let mut uow = unit.open().await?;
    assert_eq!(common::count(&mut uow, "SELECT COUNT(c) FROM Child c").await?, 1);

    Ok(())
}

#[tokio::test]
async fn test_reference_to_transient_instance_fails_flush() -> Result<()> {
    let unit = common::unit().await?;
    let mut uow = unit.open().await?;
    let team = uow.instantiate("Team")?;
    uow.set(team, "name", "unsaved")?;
    common::new_member(&mut uow, "member1", 10, Some(team)).await?;

    match uow.flush().await {
        Err(DbError::IllegalState(msg)) => assert!(msg.contains("transient"), "{}", msg),
        other => panic!("Expected IllegalState, got {:?}", other),
    }
    assert_eq!(uow.status(), UnitStatus::Failed);
    match uow.commit().await {
        Err(DbError::IllegalState(_)) => {}
        other => panic!("Expected IllegalState, got {:?}", other),
    }
    uow.rollback().await?;
    assert_eq!(uow.status(), UnitStatus::RolledBack);

    let mut uow = unit.open().await?;
    assert_eq!(common::count(&mut uow, "SELECT COUNT(m) FROM Member m").await?, 0);

    Ok(())
}

#[tokio::test]
async fn test_fetch_join_loads_before_detach() -> Result<()> {
    let unit = common::unit().await?;
    let mut uow = unit.open().await?;
    let team_a = common::new_team(&mut uow, "teamA").await?;
    let team_b = common::new_team(&mut uow, "teamB").await?;
    common::new_member(&mut uow, "member1", 10, Some(team_a)).await?;
    common::new_member(&mut uow, "member2", 20, Some(team_a)).await?;
    common::new_member(&mut uow, "member3", 30, Some(team_b)).await?;
    uow.commit().await?;

    let mut uow = unit.open().await?;
    let members = uow
        .create_query("SELECT m FROM Member m JOIN FETCH m.team ORDER BY m.username")
        .result_list()
        .await?;
    let members: Vec<_> = members.iter().filter_map(QueryValue::as_entity).collect();
    assert_eq!(members.len(), 3);
    uow.clear()?;

    let mut names = Vec::new();
    for member in members {
        let team = uow.reference(member, "team").await?.expect("team was fetched");
        names.push(uow.get(team, "name")?);
    }
    assert_eq!(
        names,
        vec![
            Value::Text("teamA".into()),
            Value::Text("teamA".into()),
            Value::Text("teamB".into())
        ]
    );

    Ok(())
}

#[tokio::test]
async fn test_collection_fetch_join_is_distinct() -> Result<()> {
    let unit = common::unit().await?;
    let mut uow = unit.open().await?;
    let team_a = common::new_team(&mut uow, "teamA").await?;
    common::new_team(&mut uow, "teamB").await?;
    common::new_member(&mut uow, "member1", 10, Some(team_a)).await?;
    common::new_member(&mut uow, "member2", 20, Some(team_a)).await?;
    uow.commit().await?;

    let mut uow = unit.open().await?;
    let teams = uow
        .create_query("SELECT DISTINCT t FROM Team t LEFT JOIN FETCH t.members ORDER BY t.name")
        .result_list()
        .await?;
    let teams: Vec<_> = teams.iter().filter_map(QueryValue::as_entity).collect();
    assert_eq!(teams.len(), 2);
    uow.clear()?;

    assert_eq!(uow.collection(teams[0], "members").await?.len(), 2);
    assert!(uow.collection(teams[1], "members").await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_lazy_reference_after_detach_fails() -> Result<()> {
    let unit = common::unit().await?;
    let mut uow = unit.open().await?;
    let team = common::new_team(&mut uow, "teamA").await?;
    let member = common::new_member(&mut uow, "member1", 10, Some(team)).await?;
    let key = uow.key_of(member)?;
    uow.commit().await?;

    let mut uow = unit.open().await?;
    let member = uow.find("Member", key).await?.expect("member was committed");
    uow.clear()?;
    match uow.reference(member, "team").await {
        Err(DbError::IllegalState(_)) => {}
        other => panic!("Expected IllegalState, got {:?}", other),
    }

    Ok(())
}

#[tokio::test]
async fn test_eager_reference_survives_detach() -> Result<()> {
    let unit = common::unit().await?;
    let mut uow = unit.open().await?;
    let parent = uow.instantiate("Parent")?;
    uow.set(parent, "name", "parent")?;
    let child = uow.instantiate("Child")?;
    uow.set(child, "name", "child")?;
    uow.set_reference(child, "parent", Some(parent))?;
    uow.persist(parent).await?;
    uow.persist(child).await?;
    uow.commit().await?;

    let mut uow = unit.open().await?;
    let children = uow.create_query("SELECT c FROM Child c").result_list().await?;
    let [QueryValue::Entity(child)] = children.as_slice() else {
        panic!("Expected one child, got {:?}", children);
    };
    let child = *child;
    uow.clear()?;

    let parent = uow.reference(child, "parent").await?.expect("parent was loaded eagerly");
    assert_eq!(uow.get(parent, "name")?, Value::Text("parent".into()));

    Ok(())
}

#[tokio::test]
async fn test_join_table_links() -> Result<()> {
    let unit = common::unit().await?;
    let mut uow = unit.open().await?;
    let member1 = common::new_member(&mut uow, "member1", 10, None).await?;
    let member2 = common::new_member(&mut uow, "member2", 20, None).await?;
    let category = uow.instantiate("Category")?;
    uow.set(category, "name", "vip")?;
    uow.collection_mut(category, "members").await?.extend([member1, member2]);
    uow.persist(category).await?;
    let report = uow.commit().await?;
    assert_eq!(report.inserts, 3);
    assert_eq!(report.collection_writes, 2);
    let key = uow.key_of(category)?;

    let mut uow = unit.open().await?;
    let category = uow.find("Category", key.clone()).await?.expect("category was committed");
    let members = uow.collection(category, "members").await?;
    assert_eq!(members.len(), 2);
    let first = members[0];
    uow.collection_mut(category, "members").await?.retain(|m| *m != first);
    let report = uow.commit().await?;
    assert_eq!(report.collection_writes, 1);
    assert_eq!(report.deletes, 0);

    let mut uow = unit.open().await?;
    let category = uow.find("Category", key).await?.expect("category was committed");
    assert_eq!(uow.collection(category, "members").await?.len(), 1);
    assert_eq!(common::count(&mut uow, "SELECT COUNT(m) FROM Member m").await?, 2);

    Ok(())
}

#[tokio::test]
async fn test_foreign_key_on_target_table() -> Result<()> {
    let unit = common::unit().await?;
    let mut uow = unit.open().await?;
    let board = uow.instantiate("Board")?;
    uow.set(board, "title", "notice")?;
    uow.persist(board).await?;
    for title in ["hello", "world"] {
        let post = uow.instantiate("Post")?;
        uow.set(post, "title", title)?;
        uow.persist(post).await?;
        uow.collection_mut(board, "posts").await?.push(post);
    }
    let report = uow.commit().await?;
    assert_eq!(report.inserts, 3);
    assert_eq!(report.collection_writes, 2);
    assert!(
        report.statements.iter().any(|sql| sql.starts_with("UPDATE Post")),
        "{:?}",
        report.statements
    );
    let key = uow.key_of(board)?;

    let mut uow = unit.open().await?;
    let board = uow.find("Board", key.clone()).await?.expect("board was committed");
    let posts = uow.collection(board, "posts").await?;
    assert_eq!(posts.len(), 2);
    uow.collection_mut(board, "posts").await?.truncate(1);
    uow.commit().await?;

    let mut uow = unit.open().await?;
    let board = uow.find("Board", key).await?.expect("board was committed");
    assert_eq!(uow.collection(board, "posts").await?.len(), 1);
    // The dropped post only loses its foreign key
    assert_eq!(common::count(&mut uow, "SELECT COUNT(p) FROM Post p").await?, 2);

    Ok(())
}

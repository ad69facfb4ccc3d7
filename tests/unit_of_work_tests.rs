mod common;

use memorm::{DbError, LifecycleState, QueryValue, Result, UnitStatus, Value};

#[tokio::test]
async fn test_find_twice_returns_same_instance() -> Result<()> {
    let unit = common::unit().await?;
    let mut uow = unit.open().await?;
    let member = common::new_member(&mut uow, "member1", 20, None).await?;
    let key = uow.key_of(member)?;
    uow.commit().await?;

    let mut uow = unit.open().await?;
    let first = uow.find("Member", key.clone()).await?.expect("member was committed");
    let second = uow.find("Member", key.clone()).await?.expect("member was committed");
    assert_eq!(first, second);

    // Query results resolve to the tracked instance as well
    let queried = uow
        .create_query("SELECT m FROM Member m WHERE m.id = :id")
        .bind("id", key)
        .single_result()
        .await?;
    assert_eq!(queried.and_then(|v| v.as_entity()), Some(first));

    Ok(())
}

#[tokio::test]
async fn test_mutations_before_flush_become_one_insert() -> Result<()> {
    let unit = common::unit().await?;
    let mut uow = unit.open().await?;

    let member = uow.instantiate("Member")?;
    assert_eq!(uow.state(member)?, LifecycleState::Transient);
    uow.set(member, "username", "draft")?;
    uow.persist(member).await?;
    assert_eq!(uow.state(member)?, LifecycleState::Managed);
    uow.set(member, "username", "final")?;
    uow.set(member, "age", 31)?;

    let report = uow.flush().await?;
    assert_eq!(report.inserts, 1);
    assert_eq!(report.updates, 0);
    assert_eq!(report.statement_count(), 1);
    assert!(report.statements[0].starts_with("INSERT INTO Member"));

    // Nothing left to write
    let report = uow.flush().await?;
    assert!(report.is_empty());
    let key = uow.key_of(member)?;
    uow.commit().await?;

    let mut uow = unit.open().await?;
    let member = uow.find("Member", key).await?.expect("member was committed");
    assert_eq!(uow.get(member, "username")?, Value::Text("final".into()));
    assert_eq!(uow.get(member, "age")?, Value::Integer(31));

    Ok(())
}

#[tokio::test]
async fn test_unchanged_instance_writes_nothing() -> Result<()> {
    let unit = common::unit().await?;
    let mut uow = unit.open().await?;
    let member = common::new_member(&mut uow, "member1", 20, None).await?;
    let key = uow.key_of(member)?;
    uow.commit().await?;

    let mut uow = unit.open().await?;
    let member = uow.find("Member", key).await?.expect("member was committed");
    let username = uow.get(member, "username")?;
    uow.set(member, "username", username)?;
    uow.set(member, "age", 20)?;
    // Loading a lazy collection is not a change either
    assert!(uow.elements(member, "favoriteFoods").await?.is_empty());

    let report = uow.flush().await?;
    assert!(report.is_empty(), "unexpected writes: {:?}", report.statements);

    Ok(())
}

#[tokio::test]
async fn test_commit_and_find_in_new_unit() -> Result<()> {
    let unit = common::unit().await?;
    let mut uow = unit.open().await?;
    let team = common::new_team(&mut uow, "teamA").await?;
    let member = common::new_member(&mut uow, "kim", 27, Some(team)).await?;
    uow.set_embedded(member, "homeAddress", Some(common::address("Seoul", "Gangnam-daero", "06000")))?;
    let key = uow.key_of(member)?;
    uow.commit().await?;
    assert_eq!(uow.status(), UnitStatus::Committed);
    assert_eq!(uow.state(member)?, LifecycleState::Detached);

    let mut uow = unit.open().await?;
    let member = uow.find("Member", key).await?.expect("member was committed");
    assert_eq!(uow.get(member, "username")?, Value::Text("kim".into()));
    assert_eq!(uow.get(member, "age")?, Value::Integer(27));
    assert_eq!(
        uow.embedded(member, "homeAddress")?,
        Some(common::address("Seoul", "Gangnam-daero", "06000"))
    );
    let team = uow.reference(member, "team").await?.expect("team was committed");
    assert_eq!(uow.get(team, "name")?, Value::Text("teamA".into()));

    Ok(())
}

#[tokio::test]
async fn test_removed_instance_rejects_changes() -> Result<()> {
    let unit = common::unit().await?;
    let mut uow = unit.open().await?;
    let member = common::new_member(&mut uow, "member1", 20, None).await?;
    let key = uow.key_of(member)?;
    uow.commit().await?;

    let mut uow = unit.open().await?;
    let member = uow.find("Member", key.clone()).await?.expect("member was committed");
    uow.remove(member).await?;
    assert_eq!(uow.state(member)?, LifecycleState::Removed);

    match uow.set(member, "age", 40) {
        Err(DbError::IllegalState(_)) => {}
        other => panic!("Expected IllegalState, got {:?}", other),
    }
    match uow.remove(member).await {
        Err(DbError::IllegalState(_)) => {}
        other => panic!("Expected IllegalState, got {:?}", other),
    }
    assert_eq!(uow.find("Member", key.clone()).await?, None);

    let report = uow.commit().await?;
    assert_eq!(report.deletes, 1);

    let mut uow = unit.open().await?;
    assert_eq!(uow.find("Member", key).await?, None);

    Ok(())
}

#[tokio::test]
async fn test_removing_unflushed_instance_writes_nothing() -> Result<()> {
    let unit = common::unit().await?;
    let mut uow = unit.open().await?;
    let member = common::new_member(&mut uow, "ghost", 1, None).await?;
    uow.remove(member).await?;

    let report = uow.flush().await?;
    assert!(report.is_empty());
    assert_eq!(common::count(&mut uow, "SELECT COUNT(m) FROM Member m").await?, 0);

    Ok(())
}

#[tokio::test]
async fn test_duplicate_key_is_rejected() -> Result<()> {
    let unit = common::unit().await?;
    let mut uow = unit.open().await?;
    let first = common::new_member(&mut uow, "first", 20, None).await?;
    let key = uow.key_of(first)?;

    let second = uow.instantiate("Member")?;
    uow.set(second, "username", "second")?;
    uow.set(second, "id", key)?;
    match uow.persist(second).await {
        Err(DbError::DuplicateKey { entity, .. }) => assert_eq!(entity, "Member"),
        other => panic!("Expected DuplicateKey, got {:?}", other),
    }
    assert_eq!(uow.state(second)?, LifecycleState::Transient);

    Ok(())
}

#[tokio::test]
async fn test_key_strategies() -> Result<()> {
    let unit = common::unit().await?;
    let mut uow = unit.open().await?;

    let ticket = uow.instantiate("Ticket")?;
    uow.set(ticket, "title", "concert")?;
    uow.persist(ticket).await?;
    match uow.key_of(ticket)? {
        Value::Text(key) => assert_eq!(key.len(), 36),
        other => panic!("Expected a UUID key, got {:?}", other),
    }

    let locker = uow.instantiate("Locker")?;
    match uow.persist(locker).await {
        Err(DbError::IllegalState(msg)) => assert!(msg.contains("number")),
        other => panic!("Expected IllegalState, got {:?}", other),
    }
    uow.set(locker, "number", 7)?;
    uow.persist(locker).await?;
    assert_eq!(uow.key_of(locker)?, Value::Integer(7));

    match uow.set(locker, "owner", 5) {
        Err(DbError::TypeMismatch(_)) => {}
        other => panic!("Expected TypeMismatch, got {:?}", other),
    }

    uow.commit().await?;
    Ok(())
}

#[tokio::test]
async fn test_find_with_unrelated_type_returns_none() -> Result<()> {
    let unit = common::unit().await?;
    let mut uow = unit.open().await?;
    let movie = uow.instantiate("Movie")?;
    uow.set(movie, "name", "Heat")?;
    uow.persist(movie).await?;
    let key = uow.key_of(movie)?;

    assert_eq!(uow.find("Book", key.clone()).await?, None);
    assert_eq!(uow.find("Item", key.clone()).await?, Some(movie));
    assert_eq!(uow.find("Movie", key).await?, Some(movie));

    match uow.instantiate("Item") {
        Err(DbError::IllegalState(_)) => {}
        other => panic!("Expected IllegalState, got {:?}", other),
    }

    Ok(())
}

#[tokio::test]
async fn test_detach_and_clear() -> Result<()> {
    let unit = common::unit().await?;
    let mut uow = unit.open().await?;
    let member = common::new_member(&mut uow, "member1", 20, None).await?;
    let key = uow.key_of(member)?;
    uow.commit().await?;

    let mut uow = unit.open().await?;
    let member = uow.find("Member", key.clone()).await?.expect("member was committed");
    assert!(uow.contains(member));
    uow.set(member, "age", 99)?;
    uow.detach(member)?;
    assert!(!uow.contains(member));

    // Changes to detached instances are not written
    assert!(uow.flush().await?.is_empty());
    match uow.set(member, "age", 1) {
        Err(DbError::IllegalState(_)) => {}
        other => panic!("Expected IllegalState, got {:?}", other),
    }

    // A fresh lookup loads a new instance
    let reloaded = uow.find("Member", key).await?.expect("member was committed");
    assert_ne!(reloaded, member);
    assert_eq!(uow.get(reloaded, "age")?, Value::Integer(20));

    uow.clear()?;
    assert_eq!(uow.state(reloaded)?, LifecycleState::Detached);

    Ok(())
}

#[tokio::test]
async fn test_refresh_discards_pending_changes() -> Result<()> {
    let unit = common::unit().await?;
    let mut uow = unit.open().await?;
    let member = common::new_member(&mut uow, "member1", 20, None).await?;
    uow.flush().await?;

    uow.set(member, "age", 99)?;
    uow.refresh(member).await?;
    assert_eq!(uow.get(member, "age")?, Value::Integer(20));
    assert!(uow.flush().await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_handles_are_bound_to_their_unit() -> Result<()> {
    let unit = common::unit().await?;
    let mut first = unit.open().await?;
    let mut second = unit.open().await?;
    let member = common::new_member(&mut first, "member1", 20, None).await?;

    match second.get(member, "username") {
        Err(DbError::IllegalState(_)) => {}
        other => panic!("Expected IllegalState, got {:?}", other),
    }
    let team = common::new_team(&mut first, "teamA").await?;
    let other = second.instantiate("Member")?;
    match second.set_reference(other, "team", Some(team)) {
        Err(DbError::IllegalState(_)) => {}
        other => panic!("Expected IllegalState, got {:?}", other),
    }
    match second.set_reference(other, "favoriteFoods", None) {
        Err(DbError::Mapping(_)) => {}
        other => panic!("Expected Mapping error, got {:?}", other),
    }

    Ok(())
}

#[tokio::test]
async fn test_finished_unit_rejects_work() -> Result<()> {
    let unit = common::unit().await?;
    let mut uow = unit.open().await?;
    common::new_member(&mut uow, "member1", 20, None).await?;
    uow.commit().await?;

    match uow.find("Member", 1).await {
        Err(DbError::IllegalState(_)) => {}
        other => panic!("Expected IllegalState, got {:?}", other),
    }
    match uow.create_query("SELECT m FROM Member m").result_list().await {
        Err(DbError::IllegalState(_)) => {}
        other => panic!("Expected IllegalState, got {:?}", other),
    }
    // Rolling back a committed unit of work does nothing
    uow.rollback().await?;
    assert_eq!(uow.status(), UnitStatus::Committed);

    let mut uow = unit.open().await?;
    let members = uow.create_query("SELECT m FROM Member m").result_list().await?;
    assert!(matches!(members.as_slice(), [QueryValue::Entity(_)]));

    Ok(())
}

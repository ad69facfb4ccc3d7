//! MVCC data source tests
//!
//! Snapshot isolation, rollback and write conflicts of the in-memory store,
//! driven through its SQL surface.

use memorm::core::{Column, DataType, DbError, Value};
use memorm::sql::Params;
use memorm::storage::TableSchema;
use memorm::transaction::TransactionState;
use memorm::{DataSource, InMemoryDB};

async fn database() -> InMemoryDB {
    let db = InMemoryDB::new();
    db.create_table(TableSchema::new(
        "ACCOUNT",
        vec![
            Column::new("ID", DataType::Integer).primary_key(),
            Column::new("OWNER", DataType::Text).unique(),
            Column::new("BALANCE", DataType::Integer),
        ],
    ))
    .await
    .unwrap();
    for (id, owner, balance) in [(1, "kim", 100), (2, "lee", 200)] {
        db.execute_autocommit(
            "INSERT INTO ACCOUNT (ID, OWNER, BALANCE) VALUES ($1, $2, $3)",
            &Params::positional(vec![Value::Integer(id), Value::from(owner), Value::Integer(balance)]),
        )
        .await
        .unwrap();
    }
    db
}

async fn balance(db: &InMemoryDB, id: i64) -> Value {
    let result = db
        .execute_autocommit(
            "SELECT BALANCE FROM ACCOUNT WHERE ID = $1",
            &Params::positional(vec![Value::Integer(id)]),
        )
        .await
        .unwrap();
    result.scalar().unwrap().clone()
}

#[tokio::test]
async fn test_update_commit() {
    let db = database().await;
    let txn = db.begin().await.unwrap();
    let result = db
        .execute_sql(txn, "UPDATE ACCOUNT SET BALANCE = 150 WHERE ID = 1", &Params::new())
        .await
        .unwrap();
    assert_eq!(result.affected_rows, 1);
    db.commit(txn).await.unwrap();

    assert_eq!(balance(&db, 1).await, Value::Integer(150));
}

#[tokio::test]
async fn test_update_and_delete_rollback() {
    let db = database().await;
    let txn = db.begin().await.unwrap();
    db.execute_sql(txn, "UPDATE ACCOUNT SET BALANCE = 999 WHERE ID = 1", &Params::new())
        .await
        .unwrap();
    db.execute_sql(txn, "DELETE FROM ACCOUNT WHERE ID = 2", &Params::new())
        .await
        .unwrap();

    // The transaction sees its own writes
    let own = db
        .execute_sql(txn, "SELECT COUNT(*) FROM ACCOUNT", &Params::new())
        .await
        .unwrap();
    assert_eq!(own.scalar().unwrap(), &Value::Integer(1));

    db.rollback(txn).await.unwrap();
    assert_eq!(balance(&db, 1).await, Value::Integer(100));
    assert_eq!(balance(&db, 2).await, Value::Integer(200));
}

#[tokio::test]
async fn test_snapshot_is_fixed_at_begin() {
    let db = database().await;
    let reader = db.begin().await.unwrap();

    db.execute_autocommit("UPDATE ACCOUNT SET BALANCE = 0 WHERE ID = 1", &Params::new())
        .await
        .unwrap();

    let seen = db
        .execute_sql(reader, "SELECT BALANCE FROM ACCOUNT WHERE ID = 1", &Params::new())
        .await
        .unwrap();
    assert_eq!(seen.scalar().unwrap(), &Value::Integer(100));
    db.commit(reader).await.unwrap();

    assert_eq!(balance(&db, 1).await, Value::Integer(0));
}

#[tokio::test]
async fn test_first_updater_wins() {
    let db = database().await;
    let first = db.begin().await.unwrap();
    let second = db.begin().await.unwrap();

    db.execute_sql(first, "UPDATE ACCOUNT SET BALANCE = 1 WHERE ID = 1", &Params::new())
        .await
        .unwrap();
    let err = db
        .execute_sql(second, "UPDATE ACCOUNT SET BALANCE = 2 WHERE ID = 1", &Params::new())
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::ExecutionError(ref msg) if msg.contains("conflict")), "{}", err);

    let manager = db.transaction_manager();
    assert_eq!(manager.state(second).await, Some(TransactionState::Active));
    db.rollback(second).await.unwrap();
    assert_eq!(manager.state(second).await, None);
    db.commit(first).await.unwrap();
    assert_eq!(balance(&db, 1).await, Value::Integer(1));
}

#[tokio::test]
async fn test_unique_and_not_null_columns() {
    let db = database().await;
    let err = db
        .execute_autocommit(
            "INSERT INTO ACCOUNT (ID, OWNER, BALANCE) VALUES (3, 'kim', 0)",
            &Params::new(),
        )
        .await
        .unwrap_err();
    assert!(err.is_constraint_violation(), "{}", err);

    let err = db
        .execute_autocommit("INSERT INTO ACCOUNT (OWNER, BALANCE) VALUES ('park', 0)", &Params::new())
        .await
        .unwrap_err();
    assert!(err.is_constraint_violation(), "{}", err);

    assert_eq!(db.row_count("ACCOUNT").await.unwrap(), 2);
    assert_eq!(db.table_names().await, vec!["ACCOUNT".to_string()]);
}

#[tokio::test]
async fn test_concurrent_readers() {
    let db = std::sync::Arc::new(database().await);
    let mut tasks = Vec::new();
    for _ in 0..8 {
        let db = db.clone();
        tasks.push(tokio::spawn(async move {
            db.execute_autocommit("SELECT SUM(BALANCE) FROM ACCOUNT", &Params::new())
                .await
                .unwrap()
                .scalar()
                .unwrap()
                .clone()
        }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap(), Value::Integer(300));
    }
}

async fn teams_and_members() -> InMemoryDB {
    let db = InMemoryDB::new();
    db.create_table(TableSchema::new(
        "TEAM",
        vec![
            Column::new("ID", DataType::Integer).primary_key(),
            Column::new("NAME", DataType::Text),
        ],
    ))
    .await
    .unwrap();
    db.create_table(TableSchema::new(
        "MEMBER",
        vec![
            Column::new("ID", DataType::Integer).primary_key(),
            Column::new("TEAM_ID", DataType::Integer).references("TEAM", "ID"),
        ],
    ))
    .await
    .unwrap();
    db.execute_autocommit("INSERT INTO TEAM (ID, NAME) VALUES (1, 'teamA')", &Params::new())
        .await
        .unwrap();
    db
}

#[tokio::test]
async fn test_foreign_keys_see_concurrent_writers() {
    // Deleting the parent first blocks the child insert
    let db = teams_and_members().await;
    let deleter = db.begin().await.unwrap();
    let inserter = db.begin().await.unwrap();
    db.execute_sql(deleter, "DELETE FROM TEAM WHERE ID = 1", &Params::new())
        .await
        .unwrap();
    let err = db
        .execute_sql(inserter, "INSERT INTO MEMBER (ID, TEAM_ID) VALUES (1, 1)", &Params::new())
        .await
        .unwrap_err();
    assert!(err.is_constraint_violation(), "{}", err);
    db.rollback(inserter).await.unwrap();
    db.commit(deleter).await.unwrap();
    assert_eq!(
        db.execute_autocommit("SELECT COUNT(*) FROM MEMBER", &Params::new())
            .await
            .unwrap()
            .scalar()
            .unwrap(),
        &Value::Integer(0)
    );

    // Inserting the child first blocks the parent delete
    let db = teams_and_members().await;
    let deleter = db.begin().await.unwrap();
    let inserter = db.begin().await.unwrap();
    db.execute_sql(inserter, "INSERT INTO MEMBER (ID, TEAM_ID) VALUES (1, 1)", &Params::new())
        .await
        .unwrap();
    let err = db
        .execute_sql(deleter, "DELETE FROM TEAM WHERE ID = 1", &Params::new())
        .await
        .unwrap_err();
    assert!(err.is_constraint_violation(), "{}", err);
    db.rollback(deleter).await.unwrap();
    db.commit(inserter).await.unwrap();

    // Renaming the parent does not block new children
    let renamer = db.begin().await.unwrap();
    let inserter = db.begin().await.unwrap();
    db.execute_sql(renamer, "UPDATE TEAM SET NAME = 'teamB' WHERE ID = 1", &Params::new())
        .await
        .unwrap();
    db.execute_sql(inserter, "INSERT INTO MEMBER (ID, TEAM_ID) VALUES (2, 1)", &Params::new())
        .await
        .unwrap();
    db.commit(renamer).await.unwrap();
    db.commit(inserter).await.unwrap();
    assert_eq!(db.row_count("MEMBER").await.unwrap(), 2);
}

//! Unit-of-work lifecycle and connection failures.

use std::time::Duration;

use diesel::prelude::*;
use diesel::sql_types::BigInt;
use quay::store::{ConnectionOptions, ConnectionProvider, StoreError, TableName, UnitOfWork};
use rstest::rstest;

use super::helpers::{TestDatabase, database, unique_table};

#[derive(QueryableByName)]
struct CountRow {
    #[diesel(sql_type = BigInt)]
    count: i64,
}

fn create_scratch(provider: &ConnectionProvider, table: &TableName) {
    let mut unit = provider.begin().expect("begin");
    unit.with_connection(|conn| {
        diesel::sql_query(format!("CREATE TABLE {} (value BIGINT NOT NULL)", table.qualified()))
            .execute(conn)
    })
    .expect("create scratch table");
    unit.complete().expect("commit");
}

fn insert_value(unit: &mut UnitOfWork, table: &TableName, value: i64) {
    let statement = format!("INSERT INTO {} (value) VALUES ($1)", table.qualified());
    unit.with_connection(|conn| {
        diesel::sql_query(statement)
            .bind::<BigInt, _>(value)
            .execute(conn)
    })
    .expect("insert");
}

fn count_rows(provider: &ConnectionProvider, table: &TableName) -> i64 {
    let statement = format!("SELECT COUNT(*) AS count FROM {}", table.qualified());
    let mut unit = provider.begin().expect("begin");
    let row: CountRow = unit
        .with_connection(|conn| diesel::sql_query(statement).get_result(conn))
        .expect("count");
    unit.complete().expect("commit");
    row.count
}

#[rstest]
fn completed_unit_commits(#[from(database)] db: TestDatabase) {
    let provider = db.provider();
    let table = unique_table("scratch");
    create_scratch(&provider, &table);

    let mut unit = provider.begin().expect("begin");
    insert_value(&mut unit, &table, 1);
    insert_value(&mut unit, &table, 2);
    unit.complete().expect("commit");

    assert_eq!(count_rows(&provider, &table), 2);
}

#[rstest]
fn dropped_unit_rolls_back(#[from(database)] db: TestDatabase) {
    let provider = db.provider();
    let table = unique_table("scratch");
    create_scratch(&provider, &table);

    {
        let mut unit = provider.begin().expect("begin");
        insert_value(&mut unit, &table, 1);
    }

    assert_eq!(count_rows(&provider, &table), 0);
}

#[rstest]
fn failed_statement_does_not_leak_into_next_unit(#[from(database)] db: TestDatabase) {
    let provider = db.provider_with(ConnectionOptions {
        pool_size: 1,
        ..ConnectionOptions::default()
    });
    let table = unique_table("scratch");
    create_scratch(&provider, &table);

    {
        let mut unit = provider.begin().expect("begin");
        let failed = unit.with_connection(|conn| {
            diesel::sql_query("SELECT * FROM quay_table_that_does_not_exist").execute(conn)
        });
        assert!(matches!(failed, Err(StoreError::Storage(_))));
    }

    let mut unit = provider.begin().expect("pooled connection is reusable");
    insert_value(&mut unit, &table, 5);
    unit.complete().expect("commit");
    assert_eq!(count_rows(&provider, &table), 1);
}

#[rstest]
fn exhausted_pool_is_a_connection_error(#[from(database)] db: TestDatabase) {
    let provider = db.provider_with(ConnectionOptions {
        pool_size: 1,
        connection_timeout: Duration::from_millis(250),
        lock_timeout: None,
    });

    let held = provider.begin().expect("first unit");
    let result = provider.begin();

    assert!(matches!(result, Err(StoreError::Connection(_))));
    drop(held);
    assert!(provider.begin().is_ok());
}

#[rstest]
fn unreachable_server_is_a_connection_error() {
    let options = ConnectionOptions {
        pool_size: 1,
        connection_timeout: Duration::from_millis(500),
        lock_timeout: None,
    };

    let result = ConnectionProvider::connect("postgres://quay@127.0.0.1:1/quay", options);

    assert!(matches!(result, Err(StoreError::Connection(_))));
}

#[rstest]
fn list_tables_sees_committed_tables_only(#[from(database)] db: TestDatabase) {
    let provider = db.provider();
    let committed = unique_table("listed");
    let abandoned = unique_table("abandoned");
    create_scratch(&provider, &committed);
    {
        let mut unit = provider.begin().expect("begin");
        let statement = format!("CREATE TABLE {} (value BIGINT)", abandoned.qualified());
        unit.with_connection(|conn| diesel::sql_query(statement).execute(conn))
            .expect("create");
    }

    let mut unit = provider.begin().expect("begin");
    let tables = unit.list_tables().expect("list tables");

    assert!(tables.contains(&committed));
    assert!(!tables.contains(&abandoned));
}

#[rstest]
fn list_columns_of_missing_table_is_empty(#[from(database)] db: TestDatabase) {
    let mut unit = db.provider().begin().expect("begin");

    let columns = unit
        .list_columns(&unique_table("missing"))
        .expect("list columns");

    assert!(columns.is_empty());
}

#[rstest]
fn raw_connection_sees_committed_work(#[from(database)] db: TestDatabase) {
    let provider = db.provider();
    let table = unique_table("scratch");
    create_scratch(&provider, &table);
    let mut unit = provider.begin().expect("begin");
    insert_value(&mut unit, &table, 9);
    unit.complete().expect("commit");

    let mut conn = PgConnection::establish(db.url()).expect("direct connection");
    let row: CountRow = diesel::sql_query(format!(
        "SELECT COUNT(*) AS count FROM {}",
        table.qualified()
    ))
    .get_result(&mut conn)
    .expect("count");

    assert_eq!(row.count, 1);
}

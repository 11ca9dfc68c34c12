//! Idempotent, race-tolerant schema creation.

use std::sync::Arc;
use std::thread;

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Text};
use mockable::DefaultClock;
use quay::deferred::DeferredStore;
use quay::snapshot::PostgresSagaSnapshotStorage;
use quay::store::{ColumnInfo, ConnectionProvider, SchemaOutcome, TableName};
use quay::transport::PostgresTransport;
use rstest::rstest;
use uuid::Uuid;

use super::helpers::{TestDatabase, database, unique_table};

fn column(name: &str, data_type: &str) -> ColumnInfo {
    ColumnInfo {
        name: name.to_owned(),
        data_type: data_type.to_owned(),
    }
}

#[rstest]
fn repeated_ensure_schema_creates_once(#[from(database)] db: TestDatabase) {
    let provider = db.provider();
    let table = unique_table("deferred");
    let store = DeferredStore::new(provider.clone(), table.clone(), Arc::new(DefaultClock));

    assert_eq!(store.ensure_schema().expect("first"), SchemaOutcome::Created);
    assert_eq!(store.ensure_schema().expect("second"), SchemaOutcome::AlreadyPresent);
    assert_eq!(store.ensure_schema().expect("third"), SchemaOutcome::AlreadyPresent);

    let mut unit = provider.begin().expect("begin");
    assert!(unit.list_tables().expect("list").contains(&table));
}

#[rstest]
fn concurrent_ensure_schema_creates_exactly_once(#[from(database)] db: TestDatabase) {
    let provider = db.provider_with(quay::store::ConnectionOptions {
        pool_size: 8,
        ..quay::store::ConnectionOptions::default()
    });
    let store = DeferredStore::new(provider, unique_table("deferred"), Arc::new(DefaultClock));

    let outcomes: Vec<SchemaOutcome> = thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| store.ensure_schema()))
            .collect();
        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .expect("thread should not panic")
                    .expect("every caller should succeed")
            })
            .collect()
    });

    let created = outcomes
        .iter()
        .filter(|outcome| **outcome == SchemaOutcome::Created)
        .count();
    assert_eq!(created, 1);
}

#[rstest]
fn deferred_table_has_expected_columns(#[from(database)] db: TestDatabase) {
    let provider = db.provider();
    let table = unique_table("deferred");
    DeferredStore::new(provider.clone(), table.clone(), Arc::new(DefaultClock))
        .ensure_schema()
        .expect("ensure schema");

    let mut unit = provider.begin().expect("begin");
    let columns = unit.list_columns(&table).expect("list columns");

    assert_eq!(
        columns,
        vec![
            column("id", "bigint"),
            column("due_time", "timestamp with time zone"),
            column("headers", "text"),
            column("body", "bytea"),
        ]
    );
}

#[rstest]
fn snapshot_table_has_expected_columns(#[from(database)] db: TestDatabase) {
    let provider = db.provider();
    let table = unique_table("snapshots");
    PostgresSagaSnapshotStorage::new(provider.clone(), table.clone())
        .ensure_schema()
        .expect("ensure schema");

    let mut unit = provider.begin().expect("begin");
    let columns = unit.list_columns(&table).expect("list columns");

    assert_eq!(
        columns,
        vec![
            column("id", "uuid"),
            column("revision", "integer"),
            column("metadata", "jsonb"),
            column("data", "bytea"),
        ]
    );
}

#[rstest]
fn transport_table_has_expected_columns(#[from(database)] db: TestDatabase) {
    let provider = db.provider();
    let table = unique_table("queue");
    let transport = PostgresTransport::new(
        provider.clone(),
        table.clone(),
        "orders",
        Arc::new(DefaultClock),
    )
    .expect("valid queue");
    transport.ensure_schema().expect("ensure schema");

    let mut unit = provider.begin().expect("begin");
    let names: Vec<String> = unit
        .list_columns(&table)
        .expect("list columns")
        .into_iter()
        .map(|info| info.name)
        .collect();

    assert_eq!(
        names,
        ["id", "recipient", "headers", "body", "visible", "expiration"]
    );
}

#[rstest]
fn tables_can_live_in_a_custom_schema(#[from(database)] db: TestDatabase) {
    let provider = db.provider();
    let schema = format!("Quay Schema {}", Uuid::new_v4().simple());
    let table = TableName::new(schema.clone(), "deferred").expect("valid table");
    let mut unit = provider.begin().expect("begin");
    unit.connection()
        .expect("connection")
        .batch_execute(&format!(
            "CREATE SCHEMA \"{}\"",
            schema.replace('"', "\"\"")
        ))
        .expect("create schema");
    unit.complete().expect("commit");

    let store = DeferredStore::new(provider.clone(), table.clone(), Arc::new(DefaultClock));

    assert_eq!(store.ensure_schema().expect("ensure"), SchemaOutcome::Created);
    let mut check = provider.begin().expect("begin");
    assert!(check.list_tables().expect("list").contains(&table));
}

#[rstest]
#[case::composite_type("CREATE TYPE {table} AS (a integer)")]
#[case::view("CREATE VIEW {table} AS SELECT 1 AS a")]
fn name_held_by_another_object_is_an_error(
    #[from(database)] db: TestDatabase,
    #[case] clash: &str,
) {
    let provider = db.provider();
    let table = unique_table("deferred");
    let mut unit = provider.begin().expect("begin");
    unit.connection()
        .expect("connection")
        .batch_execute(&clash.replace("{table}", &table.qualified()))
        .expect("create clashing object");
    unit.complete().expect("commit");

    let store = DeferredStore::new(provider.clone(), table.clone(), Arc::new(DefaultClock));
    let result = store.ensure_schema();

    assert!(result.is_err(), "ensure_schema should fail: {result:?}");
    let mut check = provider.begin().expect("begin");
    assert!(!check.list_tables().expect("list").contains(&table));
}

#[rstest]
fn existing_table_gains_missing_index(#[from(database)] db: TestDatabase) {
    let provider = db.provider();
    let table = unique_table("deferred");
    let mut unit = provider.begin().expect("begin");
    unit.connection()
        .expect("connection")
        .batch_execute(&format!(
            "CREATE TABLE {} (id BIGSERIAL PRIMARY KEY, due_time TIMESTAMPTZ NOT NULL, \
             headers TEXT NOT NULL, body BYTEA NULL)",
            table.qualified()
        ))
        .expect("create table without index");
    unit.complete().expect("commit");
    let index = table.derived("due_time_idx").expect("index name");
    assert_eq!(index_count(&provider, &index), 0);

    let store = DeferredStore::new(provider.clone(), table, Arc::new(DefaultClock));

    assert_eq!(store.ensure_schema().expect("ensure"), SchemaOutcome::AlreadyPresent);
    assert_eq!(index_count(&provider, &index), 1);
}

#[derive(QueryableByName)]
struct CountRow {
    #[diesel(sql_type = BigInt)]
    count: i64,
}

fn index_count(provider: &ConnectionProvider, index: &TableName) -> i64 {
    let schema = index.schema().to_owned();
    let name = index.name().to_owned();
    let mut unit = provider.begin().expect("begin");
    let row: CountRow = unit
        .with_connection(|conn| {
            diesel::sql_query(
                "SELECT COUNT(*) AS count FROM pg_indexes WHERE schemaname = $1 AND indexname = $2",
            )
            .bind::<Text, _>(schema)
            .bind::<Text, _>(name)
            .get_result(conn)
        })
        .expect("count indexes");
    row.count
}

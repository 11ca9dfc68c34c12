//! Statement text for the deferred-delivery table.
//!
//! Only identifiers are interpolated, always through [`TableName`] quoting;
//! values are bound as parameters.

use crate::store::{ClaimLocking, TableName};

/// Suffix of the index supporting the ordered due-time scan.
pub(crate) const DUE_TIME_INDEX_SUFFIX: &str = "due_time_idx";

pub(crate) fn create_table(table: &TableName) -> String {
    format!(
        concat!(
            "CREATE TABLE {} (",
            "id BIGSERIAL PRIMARY KEY, ",
            "due_time TIMESTAMPTZ NOT NULL, ",
            "headers TEXT NOT NULL, ",
            "body BYTEA NULL",
            ")",
        ),
        table.qualified(),
    )
}

pub(crate) fn create_index(table: &TableName, index: &TableName) -> String {
    format!(
        "CREATE INDEX IF NOT EXISTS {} ON {} (due_time)",
        index.quoted_name(),
        table.qualified(),
    )
}

pub(crate) fn insert(table: &TableName) -> String {
    format!(
        "INSERT INTO {} (due_time, headers, body) VALUES ($1, $2, $3) RETURNING id",
        table.qualified()
    )
}

pub(crate) fn select_due(table: &TableName, locking: ClaimLocking) -> String {
    format!(
        concat!(
            "SELECT id, due_time, headers, body FROM {table} ",
            "WHERE due_time <= $1 ",
            "ORDER BY due_time ASC, id ASC ",
            "{lock}",
        ),
        table = table.qualified(),
        lock = locking.clause(),
    )
}

pub(crate) fn delete(table: &TableName) -> String {
    format!("DELETE FROM {} WHERE id = $1", table.qualified())
}

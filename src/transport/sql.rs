//! Statement text for the transport queue table.

use crate::store::{ClaimLocking, TableName};

/// Suffix of the index supporting per-recipient scans in insertion order.
pub(crate) const RECIPIENT_INDEX_SUFFIX: &str = "recipient_id_idx";

pub(crate) fn create_table(table: &TableName) -> String {
    format!(
        concat!(
            "CREATE TABLE {} (",
            "id BIGSERIAL PRIMARY KEY, ",
            "recipient TEXT NOT NULL, ",
            "headers TEXT NOT NULL, ",
            "body BYTEA NOT NULL, ",
            "visible TIMESTAMPTZ NOT NULL, ",
            "expiration TIMESTAMPTZ NOT NULL",
            ")",
        ),
        table.qualified(),
    )
}

pub(crate) fn create_index(table: &TableName, index: &TableName) -> String {
    format!(
        "CREATE INDEX IF NOT EXISTS {} ON {} (recipient, id)",
        index.quoted_name(),
        table.qualified(),
    )
}

/// `$5` is a nullable expiration; `NULL` means the message never expires.
pub(crate) fn insert(table: &TableName) -> String {
    format!(
        concat!(
            "INSERT INTO {} (recipient, headers, body, visible, expiration) ",
            "VALUES ($1, $2, $3, $4, COALESCE($5, 'infinity'::timestamptz)) ",
            "RETURNING id",
        ),
        table.qualified()
    )
}

/// Deletes the oldest receivable message for `$1` as of `$2`, returning it.
///
/// The inner select takes the row lock, so a competing receiver either waits
/// for the holder or skips the row, depending on `locking`.
pub(crate) fn receive(table: &TableName, locking: ClaimLocking) -> String {
    format!(
        concat!(
            "DELETE FROM {table} WHERE id = (",
            "SELECT id FROM {table} ",
            "WHERE recipient = $1 AND visible <= $2 AND expiration > $2 ",
            "ORDER BY id ASC LIMIT 1 {lock}",
            ") RETURNING id, headers, body",
        ),
        table = table.qualified(),
        lock = locking.clause(),
    )
}

pub(crate) fn purge_expired(table: &TableName) -> String {
    format!(
        "DELETE FROM {} WHERE recipient = $1 AND expiration <= $2",
        table.qualified()
    )
}

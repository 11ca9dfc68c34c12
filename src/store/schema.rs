//! Idempotent, race-tolerant table creation.

use diesel::connection::SimpleConnection;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use tracing::{debug, info};

use super::connection::{ConnectionProvider, UnitOfWork};
use super::error::StoreResult;
use super::table_name::TableName;

/// Outcome of an [`ensure_table`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaOutcome {
    /// This call created the table.
    Created,
    /// The table already existed, or a concurrent caller created it first.
    AlreadyPresent,
}

/// Creates `table` with `table_ddl` unless it already exists, then makes sure
/// `index_ddl` has been applied.
///
/// Existence is checked first. When two processes both miss the table and
/// race to create it, the loser re-lists the tables in a fresh unit of work
/// and reports [`SchemaOutcome::AlreadyPresent`] only if the table is really
/// there. A clashing type or view keeps its original error.
///
/// `index_ddl` must be idempotent (`CREATE INDEX IF NOT EXISTS`); it also runs
/// against an existing table, so older tables gain indexes added later.
pub(crate) fn ensure_table(
    provider: &ConnectionProvider,
    table: &TableName,
    table_ddl: &str,
    index_ddl: Option<&str>,
) -> StoreResult<SchemaOutcome> {
    let mut unit = provider.begin()?;
    if unit.list_tables()?.contains(table) {
        debug!(table = %table, "table already present");
        if let Some(ddl) = index_ddl {
            apply_index(provider, unit, table, ddl)?;
        }
        return Ok(SchemaOutcome::AlreadyPresent);
    }

    let conn = unit.connection()?;
    let created = match conn.batch_execute(table_ddl) {
        Ok(()) => index_ddl.map_or(Ok(()), |ddl| conn.batch_execute(ddl)),
        Err(err) => Err(err),
    };
    match created {
        Ok(()) => {}
        Err(err) if is_lost_creation_race(&err) => {
            drop(unit);
            return confirm_concurrent_creation(provider, table, err);
        }
        Err(err) => return Err(err.into()),
    }

    unit.complete()?;
    info!(table = %table, "created table");
    Ok(SchemaOutcome::Created)
}

fn confirm_concurrent_creation(
    provider: &ConnectionProvider,
    table: &TableName,
    err: DieselError,
) -> StoreResult<SchemaOutcome> {
    let mut check = provider.begin()?;
    if !check.list_tables()?.contains(table) {
        return Err(err.into());
    }
    check.complete()?;
    debug!(table = %table, error = %err, "table created concurrently");
    Ok(SchemaOutcome::AlreadyPresent)
}

/// Runs `ddl` on an existing table. A concurrent creator of the same index
/// makes the first attempt fail; the retry then finds it and does nothing.
fn apply_index(
    provider: &ConnectionProvider,
    mut unit: UnitOfWork,
    table: &TableName,
    ddl: &str,
) -> StoreResult<()> {
    match unit.connection()?.batch_execute(ddl) {
        Ok(()) => unit.complete(),
        Err(err) if is_lost_creation_race(&err) => {
            drop(unit);
            debug!(table = %table, error = %err, "index created concurrently");
            let mut retry = provider.begin()?;
            retry.connection()?.batch_execute(ddl)?;
            retry.complete()
        }
        Err(err) => Err(err.into()),
    }
}

/// Recognises the failures `PostgreSQL` reports to the loser of a concurrent
/// `CREATE TABLE`: a duplicate relation, or a unique violation on the
/// catalogue's row-type index.
///
/// The same failures come from a non-table object already holding the name,
/// so callers confirm the table exists before treating this as success.
pub(crate) fn is_lost_creation_race(err: &DieselError) -> bool {
    match err {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => true,
        DieselError::DatabaseError(_, info) => info.message().contains("already exists"),
        _ => false,
    }
}

//! Connection provider and unit-of-work lifecycle.
//!
//! A [`UnitOfWork`] owns one pooled connection and exactly one open
//! transaction. Store operations borrow it mutably, so several operations
//! within one logical unit share the transaction without any ambient state.
//! The transaction commits only through [`UnitOfWork::complete`]; every other
//! exit path, including unwinding, rolls back when the unit is dropped and
//! releases any row locks it holds.

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use diesel::connection::{AnsiTransactionManager, TransactionManager};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use diesel::sql_types::Text;
use tracing::{debug, warn};

use super::error::{StoreError, StoreResult};
use super::table_name::TableName;

/// `PostgreSQL` connection pool type.
pub type PgPool = Pool<ConnectionManager<PgConnection>>;

/// Pooled connection type for internal use.
type PooledConn = PooledConnection<ConnectionManager<PgConnection>>;

/// Pool and lock-wait settings for a [`ConnectionProvider`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionOptions {
    /// Maximum number of pooled connections.
    pub pool_size: u32,
    /// How long acquiring a connection may wait before failing.
    pub connection_timeout: Duration,
    /// Upper bound for any single row-lock wait inside a unit of work.
    ///
    /// `None` leaves the server default (wait indefinitely). Sub-millisecond
    /// values round up to one millisecond.
    pub lock_timeout: Option<Duration>,
}

/// Longest `lock_timeout` the server accepts, in milliseconds.
const MAX_LOCK_TIMEOUT_MS: u32 = i32::MAX.unsigned_abs();

/// Converts a lock-wait bound to the whole milliseconds `lock_timeout` takes.
///
/// Rounds up, so a non-zero bound never becomes `0`, which the server reads
/// as "wait forever".
pub(crate) fn lock_timeout_millis(timeout: Duration) -> StoreResult<u32> {
    let millis = timeout.as_nanos().div_ceil(1_000_000);
    u32::try_from(millis)
        .ok()
        .filter(|value| (1..=MAX_LOCK_TIMEOUT_MS).contains(value))
        .ok_or(StoreError::InvalidLockTimeout(timeout))
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            pool_size: 10,
            connection_timeout: Duration::from_secs(30),
            lock_timeout: None,
        }
    }
}

/// Hands out units of work bound to pooled `PostgreSQL` connections.
///
/// Cloning is cheap; clones share the pool.
///
/// # Example
///
/// ```ignore
/// use quay::store::{ConnectionOptions, ConnectionProvider};
///
/// let provider = ConnectionProvider::connect("postgres://...", ConnectionOptions::default())?;
/// let mut unit = provider.begin()?;
/// let tables = unit.list_tables()?;
/// unit.complete()?;
/// ```
#[derive(Debug, Clone)]
pub struct ConnectionProvider {
    pool: PgPool,
    lock_timeout_ms: Option<u32>,
}

impl ConnectionProvider {
    /// Wraps an existing pool.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidLockTimeout`] when `lock_timeout` is zero
    /// or longer than `PostgreSQL` accepts.
    pub fn new(pool: PgPool, lock_timeout: Option<Duration>) -> StoreResult<Self> {
        let lock_timeout_ms = lock_timeout.map(lock_timeout_millis).transpose()?;
        Ok(Self {
            pool,
            lock_timeout_ms,
        })
    }

    /// Builds a pool for `database_url` with the given options.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidLockTimeout`] for an unusable lock
    /// timeout, or [`StoreError::Connection`] when the pool cannot establish
    /// its initial connections within the connection timeout.
    pub fn connect(database_url: &str, options: ConnectionOptions) -> StoreResult<Self> {
        if let Some(timeout) = options.lock_timeout {
            lock_timeout_millis(timeout)?;
        }
        let manager = ConnectionManager::<PgConnection>::new(database_url);
        let pool = Pool::builder()
            .max_size(options.pool_size)
            .connection_timeout(options.connection_timeout)
            .build(manager)
            .map_err(|e| StoreError::connection(e.to_string()))?;
        Self::new(pool, options.lock_timeout)
    }

    /// Returns a reference to the connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Acquires a connection and opens its transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] when no connection can be obtained
    /// within the pool's timeout, or when the transaction cannot be started.
    pub fn begin(&self) -> StoreResult<UnitOfWork> {
        let mut conn = self
            .pool
            .get()
            .map_err(|e| StoreError::connection(e.to_string()))?;
        AnsiTransactionManager::begin_transaction(&mut *conn)
            .map_err(|e| StoreError::connection(format!("failed to begin transaction: {e}")))?;

        let mut unit = UnitOfWork { conn: Some(conn) };
        if let Some(millis) = self.lock_timeout_ms {
            unit.apply_lock_timeout(millis)?;
        }
        Ok(unit)
    }
}

/// Column metadata reported by [`UnitOfWork::list_columns`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,
    /// `information_schema` data type, e.g. `bigint` or `timestamp with time zone`.
    pub data_type: String,
}

#[derive(QueryableByName)]
struct TableRow {
    #[diesel(sql_type = Text)]
    table_schema: String,
    #[diesel(sql_type = Text)]
    table_name: String,
}

#[derive(QueryableByName)]
struct ColumnRow {
    #[diesel(sql_type = Text)]
    column_name: String,
    #[diesel(sql_type = Text)]
    data_type: String,
}

/// One transaction on one connection, committed only on [`complete`].
///
/// [`complete`]: UnitOfWork::complete
pub struct UnitOfWork {
    conn: Option<PooledConn>,
}

impl UnitOfWork {
    /// Returns the connection this unit's statements run on.
    ///
    /// Statements issued here join the unit's transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] if the unit has already released
    /// its connection.
    pub fn connection(&mut self) -> StoreResult<&mut PgConnection> {
        self.conn
            .as_deref_mut()
            .ok_or_else(|| StoreError::connection("unit of work has already been released"))
    }

    /// Runs parameterised statements bound to this unit's connection.
    ///
    /// # Errors
    ///
    /// Propagates the statement failure, classified by [`StoreError::from`].
    pub fn with_connection<T, F>(&mut self, statement: F) -> StoreResult<T>
    where
        F: FnOnce(&mut PgConnection) -> QueryResult<T>,
    {
        let conn = self.connection()?;
        statement(conn).map_err(StoreError::from)
    }

    /// Lists the base tables visible to this connection.
    ///
    /// Tables whose names are not usable identifiers are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the catalogue query fails.
    pub fn list_tables(&mut self) -> StoreResult<BTreeSet<TableName>> {
        let rows: Vec<TableRow> = self.with_connection(|conn| {
            diesel::sql_query(concat!(
                "SELECT table_schema::text AS table_schema, table_name::text AS table_name ",
                "FROM information_schema.tables ",
                "WHERE table_type = 'BASE TABLE' ",
                "AND table_schema NOT IN ('pg_catalog', 'information_schema')",
            ))
            .load(conn)
        })?;

        Ok(rows
            .into_iter()
            .filter_map(|row| match TableName::new(row.table_schema, row.table_name) {
                Ok(table) => Some(table),
                Err(err) => {
                    debug!(error = %err, "skipping table with unusable name");
                    None
                }
            })
            .collect())
    }

    /// Lists the columns of `table` in ordinal order.
    ///
    /// Returns an empty list when the table does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the catalogue query fails.
    pub fn list_columns(&mut self, table: &TableName) -> StoreResult<Vec<ColumnInfo>> {
        let schema = table.schema().to_owned();
        let name = table.name().to_owned();
        let rows: Vec<ColumnRow> = self.with_connection(|conn| {
            diesel::sql_query(concat!(
                "SELECT column_name::text AS column_name, data_type::text AS data_type ",
                "FROM information_schema.columns ",
                "WHERE table_schema = $1 AND table_name = $2 ",
                "ORDER BY ordinal_position",
            ))
            .bind::<Text, _>(schema)
            .bind::<Text, _>(name)
            .load(conn)
        })?;

        Ok(rows
            .into_iter()
            .map(|row| ColumnInfo {
                name: row.column_name,
                data_type: row.data_type,
            })
            .collect())
    }

    /// Commits the transaction and returns the connection to the pool.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the commit fails; the transaction is then
    /// rolled back by the server and the connection discarded.
    pub fn complete(mut self) -> StoreResult<()> {
        let Some(mut conn) = self.conn.take() else {
            return Err(StoreError::connection(
                "unit of work has already been released",
            ));
        };
        AnsiTransactionManager::commit_transaction(&mut *conn).map_err(StoreError::from)?;
        debug!("unit of work committed");
        Ok(())
    }

    /// Bounds row-lock waits for the rest of this transaction.
    ///
    /// `SET` does not accept bind parameters; the value is an integer
    /// millisecond count, so interpolation is safe.
    fn apply_lock_timeout(&mut self, millis: u32) -> StoreResult<()> {
        self.with_connection(|conn| {
            diesel::sql_query(format!("SET LOCAL lock_timeout = {millis}")).execute(conn)
        })?;
        Ok(())
    }
}

impl fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("active", &self.conn.is_some())
            .finish()
    }
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        let Some(mut conn) = self.conn.take() else {
            return;
        };
        match AnsiTransactionManager::rollback_transaction(&mut *conn) {
            Ok(()) => debug!("abandoned unit of work rolled back"),
            // The pool sees the broken transaction state and discards the
            // connection, which ends the server-side transaction.
            Err(err) => warn!(error = %err, "rollback of abandoned unit of work failed"),
        }
    }
}

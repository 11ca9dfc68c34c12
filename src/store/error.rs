//! Error taxonomy shared by the stores.
//!
//! Uses `thiserror` for typed variants. Diesel failures are classified once,
//! in [`StoreError::from`], so every store surfaces connection trouble and
//! statement failures the same way.

use super::table_name::TableNameError;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Marker in `PostgreSQL`'s message when `lock_timeout` cancels a statement.
const LOCK_TIMEOUT_MESSAGE: &str = "lock timeout";

/// Errors raised by the connection provider and the stores.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The store is unreachable, rejected the credentials, dropped the
    /// connection, or a lock wait exceeded the configured timeout.
    #[error("connection error: {0}")]
    Connection(String),

    /// Any other statement failure, surfaced as reported by the store.
    #[error("storage error: {0}")]
    Storage(Arc<dyn std::error::Error + Send + Sync>),

    /// Headers, metadata, or column values could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A configured table reference is unusable.
    #[error(transparent)]
    InvalidTableName(#[from] TableNameError),

    /// A queue name was empty.
    #[error("queue name must not be empty")]
    EmptyQueueName,

    /// A lock timeout is zero or exceeds what `PostgreSQL` accepts.
    #[error("lock timeout {0:?} must be between 1ms and 2147483647ms")]
    InvalidLockTimeout(Duration),

    /// A record was acknowledged that the batch never claimed.
    #[error("record {0} is not part of this batch")]
    UnknownRecord(i64),
}

impl StoreError {
    /// Creates a connection error.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Creates a storage error from any error type.
    #[must_use]
    pub fn storage(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Storage(Arc::new(err))
    }

    /// Creates a serialization error.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization(message.into())
    }

    /// Returns `true` when the failure concerns connectivity or lock waits.
    #[must_use]
    pub const fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

impl From<DieselError> for StoreError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::DatabaseError(DatabaseErrorKind::ClosedConnection, ref info) => {
                Self::connection(info.message())
            }
            DieselError::DatabaseError(_, ref info)
                if info.message().contains(LOCK_TIMEOUT_MESSAGE) =>
            {
                Self::connection(format!("lock wait timed out: {}", info.message()))
            }
            DieselError::BrokenTransactionManager => {
                Self::connection("transaction manager is in a broken state")
            }
            _ => Self::storage(err),
        }
    }
}

//! Layered settings for the stores.
//!
//! [`QuaySettings`] starts from built-in defaults, merges an optional TOML
//! file, then `QUAY_`-prefixed environment variables (for example
//! `QUAY_DATABASE_URL` or `QUAY_LOCK_TIMEOUT_MS`). The helpers on the settings
//! build a [`ConnectionProvider`] and the stores on top of it.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::deferred::DeferredStore;
use crate::snapshot::PostgresSagaSnapshotStorage;
use crate::store::{
    ClaimLocking, ConnectionOptions, ConnectionProvider, DEFAULT_SCHEMA, StoreError, TableName,
};
use crate::transport::PostgresTransport;

/// Prefix of environment variables that override file settings.
pub const ENV_PREFIX: &str = "QUAY_";

/// Errors raised while loading settings or wiring stores from them.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A source could not be read or a value has the wrong shape.
    #[error("invalid configuration: {0}")]
    Figment(#[from] Box<figment::Error>),

    /// No database URL was configured.
    #[error("database_url must be set")]
    MissingDatabaseUrl,

    /// The pool could not be built or a store rejected its settings.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Settings for the connection pool and the store tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuaySettings {
    /// `PostgreSQL` connection URL.
    pub database_url: String,
    /// Maximum pooled connections.
    pub pool_size: u32,
    /// Seconds to wait for a pooled connection.
    pub connection_timeout_secs: u64,
    /// Upper bound for a single row-lock wait, in milliseconds.
    ///
    /// `connect` rejects `0` and values above `2147483647`.
    pub lock_timeout_ms: Option<u64>,
    /// Whether claims wait on or skip rows locked by another claimer.
    pub claim_locking: ClaimLocking,
    /// Table holding deferred messages.
    pub deferred_table: TableName,
    /// Table holding saga snapshots.
    pub snapshot_table: TableName,
    /// Table holding transport messages.
    pub transport_table: TableName,
    /// Queue this endpoint receives from.
    pub input_queue: String,
}

impl Default for QuaySettings {
    fn default() -> Self {
        let options = ConnectionOptions::default();
        Self {
            database_url: String::new(),
            pool_size: options.pool_size,
            connection_timeout_secs: options.connection_timeout.as_secs(),
            lock_timeout_ms: None,
            claim_locking: ClaimLocking::default(),
            deferred_table: TableName::from_trusted(DEFAULT_SCHEMA, "deferred_messages"),
            snapshot_table: TableName::from_trusted(DEFAULT_SCHEMA, "saga_snapshots"),
            transport_table: TableName::from_trusted(DEFAULT_SCHEMA, "transport_queue"),
            input_queue: "quay".to_owned(),
        }
    }
}

impl QuaySettings {
    /// Builds the layered figment: defaults, then `path` when given, then the
    /// environment.
    #[must_use]
    pub fn figment(path: Option<&Path>) -> Figment {
        let base = Figment::new().merge(Serialized::defaults(Self::default()));
        let with_file = match path {
            Some(file) => base.merge(Toml::file(file)),
            None => base,
        };
        with_file.merge(Env::prefixed(ENV_PREFIX))
    }

    /// Loads settings from the layered sources.
    ///
    /// A missing file contributes nothing; a malformed one is an error.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Figment`] when a source is unreadable or a
    /// value does not fit its field.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        Self::figment(path)
            .extract()
            .map_err(|e| ConfigError::Figment(Box::new(e)))
    }

    /// Returns the pool options these settings describe.
    #[must_use]
    pub const fn connection_options(&self) -> ConnectionOptions {
        ConnectionOptions {
            pool_size: self.pool_size,
            connection_timeout: Duration::from_secs(self.connection_timeout_secs),
            lock_timeout: match self.lock_timeout_ms {
                Some(millis) => Some(Duration::from_millis(millis)),
                None => None,
            },
        }
    }

    /// Builds the connection provider.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingDatabaseUrl`] when no URL is set, or
    /// [`ConfigError::Store`] when the lock timeout is out of range or the
    /// pool cannot connect.
    pub fn connect(&self) -> ConfigResult<ConnectionProvider> {
        if self.database_url.trim().is_empty() {
            return Err(ConfigError::MissingDatabaseUrl);
        }
        let provider = ConnectionProvider::connect(&self.database_url, self.connection_options())?;
        info!(pool_size = self.pool_size, "connection pool ready");
        Ok(provider)
    }

    /// Builds the deferred-delivery store for the configured table.
    #[must_use]
    pub fn deferred_store<C>(
        &self,
        provider: ConnectionProvider,
        clock: Arc<C>,
    ) -> DeferredStore<C>
    where
        C: Clock + Send + Sync,
    {
        DeferredStore::new(provider, self.deferred_table.clone(), clock)
            .with_claim_locking(self.claim_locking)
    }

    /// Builds the snapshot storage for the configured table.
    #[must_use]
    pub fn snapshot_storage(&self, provider: ConnectionProvider) -> PostgresSagaSnapshotStorage {
        PostgresSagaSnapshotStorage::new(provider, self.snapshot_table.clone())
    }

    /// Builds the transport for the configured table and input queue.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Store`] when the input queue is blank.
    pub fn transport<C>(
        &self,
        provider: ConnectionProvider,
        clock: Arc<C>,
    ) -> ConfigResult<PostgresTransport<C>>
    where
        C: Clock + Send + Sync,
    {
        let transport = PostgresTransport::new(
            provider,
            self.transport_table.clone(),
            self.input_queue.clone(),
            clock,
        )?;
        Ok(transport.with_claim_locking(self.claim_locking))
    }
}

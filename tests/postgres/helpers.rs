//! Shared helpers for `PostgreSQL` integration tests.
//!
//! Each test works on freshly named tables, so tests share one database and
//! can run in parallel.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Local, TimeDelta, TimeZone, Utc};
use mockable::Clock;
use quay::store::{ConnectionOptions, ConnectionProvider, TableName};
use rstest::fixture;
use tokio::runtime::Runtime;
use uuid::Uuid;

pub use super::cluster::BoxError;
use super::cluster::shared_cluster;

/// Environment variable naming an external server to test against.
pub const DATABASE_URL_ENV: &str = "QUAY_TEST_DATABASE_URL";

/// Builds a current-thread runtime for driving async setup code.
///
/// # Errors
///
/// Returns an error if the runtime cannot be created.
pub fn test_runtime() -> Result<Runtime, BoxError> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| Box::new(err) as BoxError)
}

/// A reachable test database.
#[derive(Debug, Clone)]
pub struct TestDatabase {
    url: String,
}

impl TestDatabase {
    /// Returns a provider with default options.
    pub fn provider(&self) -> ConnectionProvider {
        self.provider_with(ConnectionOptions {
            pool_size: 4,
            ..ConnectionOptions::default()
        })
    }

    /// Returns a provider whose lock waits give up after `timeout`.
    pub fn provider_with_lock_timeout(&self, timeout: Duration) -> ConnectionProvider {
        self.provider_with(ConnectionOptions {
            pool_size: 4,
            lock_timeout: Some(timeout),
            ..ConnectionOptions::default()
        })
    }

    /// Returns a provider with explicit options.
    pub fn provider_with(&self, options: ConnectionOptions) -> ConnectionProvider {
        ConnectionProvider::connect(&self.url, options)
            .expect("test database should accept connections")
    }

    /// Returns the connection URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Resolves the database to test against.
///
/// Prefers [`DATABASE_URL_ENV`]; otherwise starts the embedded cluster, which
/// panics when it cannot come up so a broken environment never passes as a
/// green run.
#[fixture]
pub fn database() -> TestDatabase {
    if let Some(url) = std::env::var(DATABASE_URL_ENV).ok().filter(|url| !url.is_empty()) {
        return TestDatabase { url };
    }
    TestDatabase {
        url: shared_cluster().database_url("postgres"),
    }
}

/// Returns a table in the default schema that no other test uses.
pub fn unique_table(prefix: &str) -> TableName {
    TableName::with_default_schema(format!("{prefix}_{}", Uuid::new_v4().simple()))
        .expect("generated table name should be valid")
}

/// Clock whose time only moves when a test moves it.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Creates a clock reading `now`.
    pub fn at(now: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(now),
        })
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: TimeDelta) {
        let mut guard = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *guard += by;
    }
}

impl Clock for ManualClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A fixed instant that all relative test times hang off.
#[fixture]
pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0)
        .single()
        .expect("valid timestamp")
}

//! `PostgreSQL` implementation of [`SagaSnapshotStorage`].
//!
//! Snapshots land in an append-only table keyed by `(id, revision)`. Metadata
//! is stored as JSONB so audit queries can filter on individual keys.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel::sql_types::{Bytea, Integer, Jsonb, Uuid as SqlUuid};
use tracing::debug;

use crate::snapshot::domain::SagaSnapshot;
use crate::snapshot::ports::{SagaSnapshotStorage, SnapshotError, SnapshotResult};
use crate::store::schema::ensure_table;
use crate::store::{
    ConnectionProvider, SchemaOutcome, StoreError, StoreResult, TableName, UnitOfWork,
};

/// `PostgreSQL`-backed snapshot storage.
///
/// Cloning is cheap; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct PostgresSagaSnapshotStorage {
    provider: ConnectionProvider,
    table: TableName,
}

impl PostgresSagaSnapshotStorage {
    /// Creates a storage adapter writing to `table`.
    #[must_use]
    pub const fn new(provider: ConnectionProvider, table: TableName) -> Self {
        Self { provider, table }
    }

    /// Returns the table this adapter writes to.
    #[must_use]
    pub const fn table(&self) -> &TableName {
        &self.table
    }

    /// Creates the snapshot table unless it already exists.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] for failures other than losing a creation
    /// race.
    pub fn ensure_schema(&self) -> StoreResult<SchemaOutcome> {
        ensure_table(&self.provider, &self.table, &create_table(&self.table), None)
    }

    /// Inserts `snapshot` within the caller's unit of work.
    ///
    /// A conflicting `(id, revision)` leaves the transaction usable; the
    /// conflict is reported and nothing is written.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::DuplicateVersion`] if the revision was already
    /// recorded, or [`SnapshotError::Store`] if the metadata cannot be encoded,
    /// the revision does not fit the column, or the insert fails.
    pub fn save_snapshot(
        &self,
        unit: &mut UnitOfWork,
        snapshot: &SagaSnapshot,
    ) -> SnapshotResult<()> {
        let revision = i32::try_from(snapshot.revision().value()).map_err(|_| {
            StoreError::serialization(format!(
                "revision {} exceeds the storable range",
                snapshot.revision()
            ))
        })?;
        let metadata = serde_json::to_value(snapshot.metadata())
            .map_err(|e| StoreError::serialization(e.to_string()))?;
        let statement = insert(&self.table);
        let data = snapshot.data().to_vec();
        let saga_id = snapshot.saga_id();

        let inserted = unit.with_connection(|conn| {
            diesel::sql_query(statement)
                .bind::<SqlUuid, _>(saga_id.into_inner())
                .bind::<Integer, _>(revision)
                .bind::<Jsonb, _>(metadata)
                .bind::<Bytea, _>(data)
                .execute(conn)
        })?;

        if inserted == 0 {
            return Err(SnapshotError::DuplicateVersion {
                saga_id,
                revision: snapshot.revision(),
            });
        }

        debug!(table = %self.table, %saga_id, revision, "saved saga snapshot");
        Ok(())
    }
}

#[async_trait]
impl SagaSnapshotStorage for PostgresSagaSnapshotStorage {
    async fn save(&self, snapshot: &SagaSnapshot) -> SnapshotResult<()> {
        let storage = self.clone();
        let owned = snapshot.clone();

        tokio::task::spawn_blocking(move || -> SnapshotResult<()> {
            let mut unit = storage.provider.begin()?;
            storage.save_snapshot(&mut unit, &owned)?;
            unit.complete()?;
            Ok(())
        })
        .await
        .map_err(|e| StoreError::connection(format!("task join error: {e}")))?
    }
}

fn create_table(table: &TableName) -> String {
    format!(
        concat!(
            "CREATE TABLE {} (",
            "id UUID NOT NULL, ",
            "revision INTEGER NOT NULL, ",
            "metadata JSONB NOT NULL, ",
            "data BYTEA NOT NULL, ",
            "PRIMARY KEY (id, revision)",
            ")",
        ),
        table.qualified()
    )
}

fn insert(table: &TableName) -> String {
    format!(
        concat!(
            "INSERT INTO {} (id, revision, metadata, data) VALUES ($1, $2, $3, $4) ",
            "ON CONFLICT (id, revision) DO NOTHING",
        ),
        table.qualified()
    )
}

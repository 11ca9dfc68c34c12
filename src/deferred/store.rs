//! `PostgreSQL` deferred-delivery store.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Bytea, Nullable, Text, Timestamptz};
use mockable::Clock;
use tracing::debug;

use super::batch::DueBatch;
use super::domain::{DeferredId, DueMessage};
use super::sql;
use crate::store::schema::ensure_table;
use crate::store::{
    ClaimLocking, ConnectionProvider, HeaderCodec, Headers, JsonHeaderCodec, SchemaOutcome,
    StoreResult, TableName, UnitOfWork,
};

#[derive(QueryableByName)]
struct InsertedRow {
    #[diesel(sql_type = BigInt)]
    id: i64,
}

#[derive(QueryableByName)]
struct DueRow {
    #[diesel(sql_type = BigInt)]
    id: i64,
    #[diesel(sql_type = Timestamptz)]
    due_time: DateTime<Utc>,
    #[diesel(sql_type = Text)]
    headers: String,
    #[diesel(sql_type = Nullable<Bytea>)]
    body: Option<Vec<u8>>,
}

/// Persists "deliver after time T" records and claims the due ones.
///
/// Insertion joins the caller's unit of work. Claiming opens a unit of its
/// own, which the returned [`DueBatch`] carries until it completes or drops.
pub struct DeferredStore<C>
where
    C: Clock + Send + Sync,
{
    provider: ConnectionProvider,
    table: TableName,
    codec: Arc<dyn HeaderCodec>,
    clock: Arc<C>,
    locking: ClaimLocking,
}

impl<C> Clone for DeferredStore<C>
where
    C: Clock + Send + Sync,
{
    fn clone(&self) -> Self {
        Self {
            provider: self.provider.clone(),
            table: self.table.clone(),
            codec: Arc::clone(&self.codec),
            clock: Arc::clone(&self.clock),
            locking: self.locking,
        }
    }
}

impl<C> fmt::Debug for DeferredStore<C>
where
    C: Clock + Send + Sync,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredStore")
            .field("table", &self.table)
            .field("codec", &self.codec)
            .field("locking", &self.locking)
            .finish_non_exhaustive()
    }
}

impl<C> DeferredStore<C>
where
    C: Clock + Send + Sync,
{
    /// Creates a store over `table` using JSON headers and blocking claims.
    #[must_use]
    pub fn new(provider: ConnectionProvider, table: TableName, clock: Arc<C>) -> Self {
        Self {
            provider,
            table,
            codec: Arc::new(JsonHeaderCodec),
            clock,
            locking: ClaimLocking::Wait,
        }
    }

    /// Replaces the header codec.
    #[must_use]
    pub fn with_codec(mut self, codec: Arc<dyn HeaderCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// Replaces the claim locking discipline.
    #[must_use]
    pub fn with_claim_locking(mut self, locking: ClaimLocking) -> Self {
        self.locking = locking;
        self
    }

    /// Returns the table this store uses.
    #[must_use]
    pub const fn table(&self) -> &TableName {
        &self.table
    }

    /// Creates the table and its due-time index unless they already exist.
    ///
    /// Safe to call concurrently from several processes.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`](crate::store::StoreError) for failures other
    /// than losing a creation race.
    pub fn ensure_schema(&self) -> StoreResult<SchemaOutcome> {
        let index = self.table.derived(sql::DUE_TIME_INDEX_SUFFIX)?;
        ensure_table(
            &self.provider,
            &self.table,
            &sql::create_table(&self.table),
            Some(&sql::create_index(&self.table, &index)),
        )
    }

    /// Inserts a record due at `due_time`, normalised to UTC.
    ///
    /// The record becomes claimable once `unit` commits.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`](crate::store::StoreError) if the headers
    /// cannot be encoded or the insert fails.
    pub fn defer<Tz: TimeZone>(
        &self,
        unit: &mut UnitOfWork,
        due_time: &DateTime<Tz>,
        headers: &Headers,
        body: &[u8],
    ) -> StoreResult<DeferredId> {
        let due_utc = due_time.with_timezone(&Utc);
        let encoded = self.codec.encode(headers)?;
        let statement = sql::insert(&self.table);
        let payload = body.to_vec();

        let row: InsertedRow = unit.with_connection(|conn| {
            diesel::sql_query(statement)
                .bind::<Timestamptz, _>(due_utc)
                .bind::<Text, _>(encoded)
                .bind::<Nullable<Bytea>, _>(Some(payload))
                .get_result(conn)
        })?;

        let id = DeferredId::new(row.id);
        debug!(table = %self.table, %id, due_time = %due_utc, "deferred message");
        Ok(id)
    }

    /// Claims every record due at the clock's current time.
    ///
    /// # Errors
    ///
    /// See [`DeferredStore::claim_due_at`].
    pub fn claim_due(&self) -> StoreResult<DueBatch> {
        self.claim_due_at(self.clock.utc())
    }

    /// Claims every record with `due_time <= now`, earliest first, locking
    /// each selected row until the batch completes or is dropped.
    ///
    /// With [`ClaimLocking::Wait`] this blocks while another open batch holds
    /// any of the due rows.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`](crate::store::StoreError) if no connection is
    /// available, the select fails, or a row cannot be decoded. The claim's
    /// unit of work is rolled back before the error is returned.
    pub fn claim_due_at(&self, now: DateTime<Utc>) -> StoreResult<DueBatch> {
        let mut unit = self.provider.begin()?;
        let statement = sql::select_due(&self.table, self.locking);
        let rows: Vec<DueRow> = unit.with_connection(|conn| {
            diesel::sql_query(statement)
                .bind::<Timestamptz, _>(now)
                .load(conn)
        })?;

        let messages = rows
            .into_iter()
            .map(|row| self.row_to_message(row))
            .collect::<StoreResult<Vec<_>>>()?;

        debug!(table = %self.table, count = messages.len(), "claimed due messages");
        Ok(DueBatch::new(unit, self.table.clone(), messages))
    }

    fn row_to_message(&self, row: DueRow) -> StoreResult<DueMessage> {
        let headers = self.codec.decode(&row.headers)?;
        Ok(DueMessage::new(
            DeferredId::new(row.id),
            row.due_time,
            headers,
            row.body.unwrap_or_default(),
        ))
    }
}

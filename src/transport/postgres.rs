//! `PostgreSQL` competing-consumer transport.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Bytea, Nullable, Text, Timestamptz};
use mockable::Clock;
use tracing::debug;

use super::message::{
    DEFERRED_UNTIL_HEADER, ReceivedMessage, TIME_TO_BE_RECEIVED_HEADER, TransportMessage,
    TransportMessageId,
};
use super::sql;
use crate::store::schema::ensure_table;
use crate::store::{
    ClaimLocking, ConnectionProvider, HeaderCodec, Headers, JsonHeaderCodec, SchemaOutcome,
    StoreError, StoreResult, TableName, UnitOfWork,
};

#[derive(QueryableByName)]
struct InsertedRow {
    #[diesel(sql_type = BigInt)]
    id: i64,
}

#[derive(QueryableByName)]
struct ReceivedRow {
    #[diesel(sql_type = BigInt)]
    id: i64,
    #[diesel(sql_type = Text)]
    headers: String,
    #[diesel(sql_type = Bytea)]
    body: Vec<u8>,
}

/// Sends and receives messages through one shared queue table.
///
/// Every endpoint reads the rows addressed to its own input queue. Sending
/// and receiving both join a caller's [`UnitOfWork`]: a send is invisible
/// until that unit commits, and a receive deletes the message only when it
/// commits. Rolling a receive back puts the message back on the queue.
pub struct PostgresTransport<C>
where
    C: Clock + Send + Sync,
{
    provider: ConnectionProvider,
    table: TableName,
    input_queue: String,
    codec: Arc<dyn HeaderCodec>,
    clock: Arc<C>,
    locking: ClaimLocking,
}

impl<C> Clone for PostgresTransport<C>
where
    C: Clock + Send + Sync,
{
    fn clone(&self) -> Self {
        Self {
            provider: self.provider.clone(),
            table: self.table.clone(),
            input_queue: self.input_queue.clone(),
            codec: Arc::clone(&self.codec),
            clock: Arc::clone(&self.clock),
            locking: self.locking,
        }
    }
}

impl<C> fmt::Debug for PostgresTransport<C>
where
    C: Clock + Send + Sync,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresTransport")
            .field("table", &self.table)
            .field("input_queue", &self.input_queue)
            .field("codec", &self.codec)
            .field("locking", &self.locking)
            .finish_non_exhaustive()
    }
}

impl<C> PostgresTransport<C>
where
    C: Clock + Send + Sync,
{
    /// Creates a transport receiving from `queue`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::EmptyQueueName`] if `queue` is blank.
    pub fn new(
        provider: ConnectionProvider,
        table: TableName,
        queue: impl Into<String>,
        clock: Arc<C>,
    ) -> StoreResult<Self> {
        let input_queue = validate_queue(queue.into())?;
        Ok(Self {
            provider,
            table,
            input_queue,
            codec: Arc::new(JsonHeaderCodec),
            clock,
            locking: ClaimLocking::Wait,
        })
    }

    /// Replaces the header codec.
    #[must_use]
    pub fn with_codec(mut self, codec: Arc<dyn HeaderCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// Replaces the receive locking discipline.
    #[must_use]
    pub fn with_claim_locking(mut self, locking: ClaimLocking) -> Self {
        self.locking = locking;
        self
    }

    /// Returns the queue this transport receives from.
    #[must_use]
    pub fn input_queue(&self) -> &str {
        &self.input_queue
    }

    /// Returns the queue table.
    #[must_use]
    pub const fn table(&self) -> &TableName {
        &self.table
    }

    /// Creates the queue table unless it already exists, and its index
    /// unless that exists.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] for failures other than losing a creation
    /// race.
    pub fn ensure_schema(&self) -> StoreResult<SchemaOutcome> {
        let index = self.table.derived(sql::RECIPIENT_INDEX_SUFFIX)?;
        ensure_table(
            &self.provider,
            &self.table,
            &sql::create_table(&self.table),
            Some(&sql::create_index(&self.table, &index)),
        )
    }

    /// Queues `message` for `destination` within `unit`.
    ///
    /// An [`x-deferred-until`](DEFERRED_UNTIL_HEADER) header hides the message
    /// until that instant; an
    /// [`x-time-to-be-received`](TIME_TO_BE_RECEIVED_HEADER) header expires
    /// it that many seconds from now.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::EmptyQueueName`] for a blank destination,
    /// [`StoreError::Serialization`] for malformed delivery headers, or a
    /// [`StoreError`] if the insert fails.
    pub fn send(
        &self,
        unit: &mut UnitOfWork,
        destination: &str,
        message: &TransportMessage,
    ) -> StoreResult<TransportMessageId> {
        let recipient = validate_queue(destination.to_owned())?;
        let now = self.clock.utc();
        let visible = visible_from(message.headers(), now)?;
        let expiration = expires_at(message.headers(), now)?;
        let encoded = self.codec.encode(message.headers())?;
        let statement = sql::insert(&self.table);
        let body = message.body().to_vec();

        let row: InsertedRow = unit.with_connection(|conn| {
            diesel::sql_query(statement)
                .bind::<Text, _>(recipient.as_str())
                .bind::<Text, _>(encoded)
                .bind::<Bytea, _>(body)
                .bind::<Timestamptz, _>(visible)
                .bind::<Nullable<Timestamptz>, _>(expiration)
                .get_result(conn)
        })?;

        let id = TransportMessageId::new(row.id);
        debug!(table = %self.table, %recipient, %id, "sent message");
        Ok(id)
    }

    /// Takes the oldest receivable message off the input queue.
    ///
    /// The message is deleted within `unit` and locked until it ends. Returns
    /// `None` when nothing is visible and unexpired.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] if a lock wait exceeds the
    /// configured timeout, [`StoreError::Serialization`] if the headers cannot
    /// be decoded, or a [`StoreError`] if the statement fails.
    pub fn receive(&self, unit: &mut UnitOfWork) -> StoreResult<Option<ReceivedMessage>> {
        let now = self.clock.utc();
        let statement = sql::receive(&self.table, self.locking);
        let row: Option<ReceivedRow> = unit.with_connection(|conn| {
            diesel::sql_query(statement)
                .bind::<Text, _>(self.input_queue.as_str())
                .bind::<Timestamptz, _>(now)
                .get_result(conn)
                .optional()
        })?;

        let Some(received) = row else {
            return Ok(None);
        };
        let headers = self.codec.decode(&received.headers)?;
        let id = TransportMessageId::new(received.id);
        debug!(table = %self.table, recipient = %self.input_queue, %id, "received message");
        Ok(Some(ReceivedMessage::new(id, headers, received.body)))
    }

    /// Deletes the input queue's expired messages in a unit of work of its
    /// own, returning how many were removed.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if no connection is available or the delete
    /// fails.
    pub fn purge_expired(&self) -> StoreResult<u64> {
        let now = self.clock.utc();
        let statement = sql::purge_expired(&self.table);
        let mut unit = self.provider.begin()?;
        let removed = unit.with_connection(|conn| {
            diesel::sql_query(statement)
                .bind::<Text, _>(self.input_queue.as_str())
                .bind::<Timestamptz, _>(now)
                .execute(conn)
        })?;
        unit.complete()?;

        let count = u64::try_from(removed).unwrap_or(u64::MAX);
        if count > 0 {
            debug!(
                table = %self.table,
                recipient = %self.input_queue,
                count,
                "purged expired messages"
            );
        }
        Ok(count)
    }
}

fn validate_queue(queue: String) -> StoreResult<String> {
    if queue.trim().is_empty() {
        return Err(StoreError::EmptyQueueName);
    }
    Ok(queue)
}

/// Resolves when a sent message becomes receivable.
pub(super) fn visible_from(headers: &Headers, now: DateTime<Utc>) -> StoreResult<DateTime<Utc>> {
    headers.get(DEFERRED_UNTIL_HEADER).map_or(Ok(now), |raw| {
        DateTime::parse_from_rfc3339(raw)
            .map(|instant| instant.with_timezone(&Utc))
            .map_err(|e| {
                StoreError::serialization(format!("invalid {DEFERRED_UNTIL_HEADER} '{raw}': {e}"))
            })
    })
}

/// Resolves when a sent message expires; `None` means never.
///
/// Lifetimes too long to represent are treated as unlimited.
pub(super) fn expires_at(
    headers: &Headers,
    now: DateTime<Utc>,
) -> StoreResult<Option<DateTime<Utc>>> {
    let Some(raw) = headers.get(TIME_TO_BE_RECEIVED_HEADER) else {
        return Ok(None);
    };
    let seconds: i64 = raw.trim().parse().map_err(|e| {
        StoreError::serialization(format!("invalid {TIME_TO_BE_RECEIVED_HEADER} '{raw}': {e}"))
    })?;
    if seconds < 0 {
        return Err(StoreError::serialization(format!(
            "{TIME_TO_BE_RECEIVED_HEADER} must not be negative, got {seconds}"
        )));
    }
    Ok(TimeDelta::try_seconds(seconds).and_then(|lifetime| now.checked_add_signed(lifetime)))
}

//! Claimed batches of due records.

use std::collections::BTreeSet;

use diesel::prelude::*;
use diesel::sql_types::BigInt;
use tracing::debug;

use super::domain::{DeferredId, DueMessage};
use super::sql;
use crate::store::{StoreError, StoreResult, TableName, UnitOfWork};

/// Due records claimed under row locks, together with the unit of work
/// holding those locks.
///
/// The rows stay locked until [`DueBatch::complete`] commits or the batch is
/// dropped. Dropping without completing rolls back: locks are released and
/// acknowledged records reappear for the next claimer. A record is gone for
/// good only when it was acknowledged *and* the batch completed.
#[derive(Debug)]
pub struct DueBatch {
    unit: UnitOfWork,
    table: TableName,
    messages: Vec<DueMessage>,
    acknowledged: BTreeSet<DeferredId>,
}

impl DueBatch {
    pub(crate) const fn new(unit: UnitOfWork, table: TableName, messages: Vec<DueMessage>) -> Self {
        Self {
            unit,
            table,
            messages,
            acknowledged: BTreeSet::new(),
        }
    }

    /// Returns the claimed records, earliest due time first.
    #[must_use]
    pub fn messages(&self) -> &[DueMessage] {
        &self.messages
    }

    /// Returns the number of claimed records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns `true` when nothing was due.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Returns `true` once `id` has been acknowledged in this batch.
    #[must_use]
    pub fn is_acknowledged(&self, id: DeferredId) -> bool {
        self.acknowledged.contains(&id)
    }

    /// Deletes the record within the batch's transaction.
    ///
    /// Acknowledging the same record twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownRecord`] if `id` was not claimed by this
    /// batch, or a [`StoreError`] if the delete fails.
    pub fn acknowledge(&mut self, id: DeferredId) -> StoreResult<()> {
        if !self.messages.iter().any(|message| message.id() == id) {
            return Err(StoreError::UnknownRecord(id.into_inner()));
        }
        if self.acknowledged.contains(&id) {
            return Ok(());
        }

        let statement = sql::delete(&self.table);
        self.unit.with_connection(|conn| {
            diesel::sql_query(statement)
                .bind::<BigInt, _>(id.into_inner())
                .execute(conn)
        })?;
        self.acknowledged.insert(id);
        Ok(())
    }

    /// Commits the batch, making acknowledgements permanent and releasing
    /// the remaining locks and the connection.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the commit fails; nothing is deleted then.
    pub fn complete(self) -> StoreResult<()> {
        let acknowledged = self.acknowledged.len();
        let claimed = self.messages.len();
        self.unit.complete()?;
        debug!(
            table = %self.table,
            claimed,
            acknowledged,
            "due batch completed"
        );
        Ok(())
    }
}

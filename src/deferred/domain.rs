//! Deferred record types.

use chrono::{DateTime, Utc};
use std::fmt;

use crate::store::Headers;

/// Store-assigned identity of a deferred record.
///
/// Assigned from a sequence at insert time and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeferredId(i64);

impl DeferredId {
    /// Wraps a raw identity value.
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the raw identity value.
    #[must_use]
    pub const fn into_inner(self) -> i64 {
        self.0
    }
}

impl fmt::Display for DeferredId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A deferred record whose due time has arrived, decoded for processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueMessage {
    id: DeferredId,
    due_time: DateTime<Utc>,
    headers: Headers,
    body: Vec<u8>,
}

impl DueMessage {
    pub(crate) const fn new(
        id: DeferredId,
        due_time: DateTime<Utc>,
        headers: Headers,
        body: Vec<u8>,
    ) -> Self {
        Self {
            id,
            due_time,
            headers,
            body,
        }
    }

    /// Returns the record identity, used to acknowledge it.
    #[must_use]
    pub const fn id(&self) -> DeferredId {
        self.id
    }

    /// Returns the UTC time the record became due.
    #[must_use]
    pub const fn due_time(&self) -> DateTime<Utc> {
        self.due_time
    }

    /// Returns the decoded headers.
    #[must_use]
    pub const fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the opaque body.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

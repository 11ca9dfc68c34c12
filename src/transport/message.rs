//! Messages carried by the transport.

use std::fmt;

use crate::store::Headers;

/// Header holding an RFC 3339 instant before which the message stays hidden.
pub const DEFERRED_UNTIL_HEADER: &str = "x-deferred-until";

/// Header holding the number of whole seconds the message may wait to be
/// received before it expires.
pub const TIME_TO_BE_RECEIVED_HEADER: &str = "x-time-to-be-received";

/// Store identity of a queued message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransportMessageId(i64);

impl TransportMessageId {
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

impl fmt::Display for TransportMessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An outgoing message: string headers and an opaque body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportMessage {
    headers: Headers,
    body: Vec<u8>,
}

impl TransportMessage {
    /// Creates a message.
    #[must_use]
    pub const fn new(headers: Headers, body: Vec<u8>) -> Self {
        Self { headers, body }
    }

    /// Adds or replaces a header.
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Returns the headers.
    #[must_use]
    pub const fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the body.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

/// A message taken off the input queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    id: TransportMessageId,
    headers: Headers,
    body: Vec<u8>,
}

impl ReceivedMessage {
    pub(crate) const fn new(id: TransportMessageId, headers: Headers, body: Vec<u8>) -> Self {
        Self { id, headers, body }
    }

    /// Returns the store identity.
    #[must_use]
    pub const fn id(&self) -> TransportMessageId {
        self.id
    }

    /// Returns the headers.
    #[must_use]
    pub const fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the body.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Splits the message into headers and body.
    #[must_use]
    pub fn into_parts(self) -> (Headers, Vec<u8>) {
        (self.headers, self.body)
    }
}

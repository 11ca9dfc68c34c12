//! Competing-consumer message transport on a single queue table.
//!
//! Receivers claim messages with the same row-locking discipline as the
//! deferred store: select the oldest row for the input queue under
//! `FOR UPDATE`, delete it, and let the receiving unit of work decide whether
//! the delete sticks.

mod message;
mod postgres;
mod sql;

pub use message::{
    DEFERRED_UNTIL_HEADER, ReceivedMessage, TIME_TO_BE_RECEIVED_HEADER, TransportMessage,
    TransportMessageId,
};
pub use postgres::PostgresTransport;

#[cfg(test)]
mod tests;

//! Append-only saga snapshot audit log.
//!
//! Every state change of a saga can be captured as a [`SagaSnapshot`] keyed by
//! saga identifier and revision. The store only writes; a separate consumer
//! reads the table for audit. Recording a revision twice fails with
//! [`SnapshotError::DuplicateVersion`].
//!
//! The [`SagaSnapshotStorage`] port is async. The `PostgreSQL` adapter also
//! exposes a synchronous
//! [`save_snapshot`](PostgresSagaSnapshotStorage::save_snapshot) that joins a
//! caller's unit of work, so a snapshot can commit atomically with the message
//! handling that produced it.

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

pub use adapters::memory::InMemorySagaSnapshotStorage;
pub use adapters::postgres::PostgresSagaSnapshotStorage;
pub use domain::{Revision, SagaId, SagaSnapshot, SnapshotMetadata};
pub use ports::{SagaSnapshotStorage, SnapshotError, SnapshotResult};
pub use services::{AuditContext, SnapshotAuditService};

#[cfg(test)]
mod tests;

//! Port for saga snapshot storage.

use async_trait::async_trait;
use thiserror::Error;

use super::domain::{Revision, SagaId, SagaSnapshot};
use crate::store::StoreError;

/// Result type for snapshot operations.
pub type SnapshotResult<T> = Result<T, SnapshotError>;

/// Append-only storage for saga snapshots.
///
/// There is deliberately no read operation; audit consumers query the table
/// directly.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SagaSnapshotStorage: Send + Sync {
    /// Stores a snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::DuplicateVersion`] if a snapshot for the same
    /// saga and revision already exists, or [`SnapshotError::Store`] if
    /// storage fails.
    async fn save(&self, snapshot: &SagaSnapshot) -> SnapshotResult<()>;
}

/// Errors that can occur while storing snapshots.
#[derive(Debug, Clone, Error)]
pub enum SnapshotError {
    /// A snapshot for this saga revision was already recorded.
    #[error("snapshot of saga {saga_id} at revision {revision} already exists")]
    DuplicateVersion {
        /// The saga instance.
        saga_id: SagaId,
        /// The conflicting revision.
        revision: Revision,
    },

    /// Any other storage failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

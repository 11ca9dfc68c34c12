//! Saga snapshot domain types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Identifier of a saga instance.
///
/// # Examples
///
/// ```
/// use quay::snapshot::SagaId;
///
/// let id = SagaId::new();
/// assert!(!id.as_ref().is_nil());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SagaId(Uuid);

impl SagaId {
    /// Creates a new random saga identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a saga identifier from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID value.
    #[must_use]
    pub const fn into_inner(self) -> Uuid {
        self.0
    }
}

/// Generates a new random identifier, like [`SagaId::new`].
impl Default for SagaId {
    fn default() -> Self {
        Self::new()
    }
}

impl AsRef<Uuid> for SagaId {
    fn as_ref(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for SagaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Version of a saga instance at the moment of a snapshot.
///
/// Stored in an `INTEGER` column, so values above `i32::MAX` are rejected at
/// persistence time.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Revision(u32);

impl Revision {
    /// Creates a revision.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Returns the raw revision number.
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }

    /// Returns the following revision, saturating at `u32::MAX`.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Audit metadata attached to a snapshot.
pub type SnapshotMetadata = BTreeMap<String, String>;

/// One revision of a saga's state, captured for audit.
///
/// `(saga_id, revision)` identifies a snapshot; the store keeps at most one
/// per pair and never updates or deletes them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SagaSnapshot {
    saga_id: SagaId,
    revision: Revision,
    data: Vec<u8>,
    metadata: SnapshotMetadata,
}

impl SagaSnapshot {
    /// Creates a snapshot of serialised saga state.
    #[must_use]
    pub const fn new(
        saga_id: SagaId,
        revision: Revision,
        data: Vec<u8>,
        metadata: SnapshotMetadata,
    ) -> Self {
        Self {
            saga_id,
            revision,
            data,
            metadata,
        }
    }

    /// Returns the saga instance identifier.
    #[must_use]
    pub const fn saga_id(&self) -> SagaId {
        self.saga_id
    }

    /// Returns the captured revision.
    #[must_use]
    pub const fn revision(&self) -> Revision {
        self.revision
    }

    /// Returns the serialised saga state.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Returns the audit metadata.
    #[must_use]
    pub const fn metadata(&self) -> &SnapshotMetadata {
        &self.metadata
    }
}

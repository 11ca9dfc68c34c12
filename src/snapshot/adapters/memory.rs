//! In-memory implementation of [`SagaSnapshotStorage`].
//!
//! Thread-safe and database-free, for testing code that records snapshots.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

use async_trait::async_trait;

use crate::snapshot::domain::{Revision, SagaId, SagaSnapshot};
use crate::snapshot::ports::{SagaSnapshotStorage, SnapshotError, SnapshotResult};

type SnapshotKey = (SagaId, Revision);

/// In-memory snapshot storage with the same duplicate semantics as the
/// `PostgreSQL` adapter.
#[derive(Debug, Clone, Default)]
pub struct InMemorySagaSnapshotStorage {
    snapshots: Arc<RwLock<BTreeMap<SnapshotKey, SagaSnapshot>>>,
}

impl InMemorySagaSnapshotStorage {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored snapshots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Returns `true` if no snapshots are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the snapshot recorded for `saga_id` at `revision`, if any.
    #[must_use]
    pub fn get(&self, saga_id: SagaId, revision: Revision) -> Option<SagaSnapshot> {
        self.read().get(&(saga_id, revision)).cloned()
    }

    /// Returns every snapshot of `saga_id`, lowest revision first.
    #[must_use]
    pub fn history(&self, saga_id: SagaId) -> Vec<SagaSnapshot> {
        self.read()
            .range((saga_id, Revision::new(0))..=(saga_id, Revision::new(u32::MAX)))
            .map(|(_, snapshot)| snapshot.clone())
            .collect()
    }

    /// Each save is a single insert, so a poisoned map is still consistent.
    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<SnapshotKey, SagaSnapshot>> {
        self.snapshots.read().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl SagaSnapshotStorage for InMemorySagaSnapshotStorage {
    async fn save(&self, snapshot: &SagaSnapshot) -> SnapshotResult<()> {
        let mut guard = self
            .snapshots
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        let key = (snapshot.saga_id(), snapshot.revision());
        if guard.contains_key(&key) {
            return Err(SnapshotError::DuplicateVersion {
                saga_id: snapshot.saga_id(),
                revision: snapshot.revision(),
            });
        }
        guard.insert(key, snapshot.clone());
        Ok(())
    }
}

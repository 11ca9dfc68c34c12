//! Snapshot capture with audit metadata.

use std::sync::Arc;

use mockable::Clock;
use tracing::debug;

use crate::snapshot::domain::{Revision, SagaId, SagaSnapshot, SnapshotMetadata};
use crate::snapshot::ports::{SagaSnapshotStorage, SnapshotResult};

/// Metadata key naming the handler that processed the message.
pub const HANDLED_BY_KEY: &str = "handled_by";
/// Metadata key naming the host that processed the message.
pub const MACHINE_NAME_KEY: &str = "machine_name";
/// Metadata key holding the triggering message's identifier.
pub const MESSAGE_ID_KEY: &str = "message_id";
/// Metadata key holding the triggering message's type.
pub const MESSAGE_TYPE_KEY: &str = "message_type";
/// Metadata key holding the correlation identifier.
pub const CORRELATION_ID_KEY: &str = "correlation_id";
/// Metadata key holding the capture time (RFC 3339, UTC).
pub const CAPTURED_AT_KEY: &str = "captured_at";

/// Where a saga state change came from.
///
/// Every field is optional; absent fields are left out of the metadata.
///
/// # Example
///
/// ```
/// use quay::snapshot::AuditContext;
///
/// let context = AuditContext::empty()
///     .with_handled_by("OrderSaga")
///     .with_message_id("42");
///
/// assert!(!context.is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditContext {
    handled_by: Option<String>,
    machine_name: Option<String>,
    message_id: Option<String>,
    message_type: Option<String>,
    correlation_id: Option<String>,
}

impl AuditContext {
    /// Creates a context with no fields set.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            handled_by: None,
            machine_name: None,
            message_id: None,
            message_type: None,
            correlation_id: None,
        }
    }

    /// Sets the handler name.
    #[must_use]
    pub fn with_handled_by(mut self, handled_by: impl Into<String>) -> Self {
        self.handled_by = Some(handled_by.into());
        self
    }

    /// Sets the host name.
    #[must_use]
    pub fn with_machine_name(mut self, machine_name: impl Into<String>) -> Self {
        self.machine_name = Some(machine_name.into());
        self
    }

    /// Sets the triggering message identifier.
    #[must_use]
    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    /// Sets the triggering message type.
    #[must_use]
    pub fn with_message_type(mut self, message_type: impl Into<String>) -> Self {
        self.message_type = Some(message_type.into());
        self
    }

    /// Sets the correlation identifier.
    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Returns `true` if no field is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.handled_by.is_none()
            && self.machine_name.is_none()
            && self.message_id.is_none()
            && self.message_type.is_none()
            && self.correlation_id.is_none()
    }

    fn entries(&self) -> impl Iterator<Item = (&'static str, &String)> {
        [
            (HANDLED_BY_KEY, self.handled_by.as_ref()),
            (MACHINE_NAME_KEY, self.machine_name.as_ref()),
            (MESSAGE_ID_KEY, self.message_id.as_ref()),
            (MESSAGE_TYPE_KEY, self.message_type.as_ref()),
            (CORRELATION_ID_KEY, self.correlation_id.as_ref()),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.map(|present| (key, present)))
    }
}

/// Records saga snapshots stamped with audit metadata.
#[derive(Clone)]
pub struct SnapshotAuditService<S, C>
where
    S: SagaSnapshotStorage,
    C: Clock + Send + Sync,
{
    storage: Arc<S>,
    clock: Arc<C>,
}

impl<S, C> SnapshotAuditService<S, C>
where
    S: SagaSnapshotStorage,
    C: Clock + Send + Sync,
{
    /// Creates a new audit service.
    #[must_use]
    pub const fn new(storage: Arc<S>, clock: Arc<C>) -> Self {
        Self { storage, clock }
    }

    /// Builds the metadata map for `context`, stamped with the current time.
    #[must_use]
    pub fn metadata_for(&self, context: &AuditContext) -> SnapshotMetadata {
        let mut metadata: SnapshotMetadata = context
            .entries()
            .map(|(key, value)| (key.to_owned(), value.clone()))
            .collect();
        metadata.insert(CAPTURED_AT_KEY.to_owned(), self.clock.utc().to_rfc3339());
        metadata
    }

    /// Captures `data` as the state of `saga_id` at `revision` and stores it.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::DuplicateVersion`] when the revision was
    /// already recorded, or [`SnapshotError::Store`] when storage fails.
    ///
    /// [`SnapshotError::DuplicateVersion`]: crate::snapshot::SnapshotError::DuplicateVersion
    /// [`SnapshotError::Store`]: crate::snapshot::SnapshotError::Store
    pub async fn record(
        &self,
        saga_id: SagaId,
        revision: Revision,
        data: Vec<u8>,
        context: &AuditContext,
    ) -> SnapshotResult<SagaSnapshot> {
        let snapshot = SagaSnapshot::new(saga_id, revision, data, self.metadata_for(context));
        self.storage.save(&snapshot).await?;
        debug!(%saga_id, %revision, "recorded saga snapshot");
        Ok(snapshot)
    }
}

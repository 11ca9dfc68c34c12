//! Snapshot services.

mod audit;

pub use audit::{
    AuditContext, CAPTURED_AT_KEY, CORRELATION_ID_KEY, HANDLED_BY_KEY, MACHINE_NAME_KEY,
    MESSAGE_ID_KEY, MESSAGE_TYPE_KEY, SnapshotAuditService,
};

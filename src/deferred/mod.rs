//! Durable deferred delivery.
//!
//! Callers [`defer`](DeferredStore::defer) a message for a future time inside
//! their own unit of work. A poller later calls
//! [`claim_due`](DeferredStore::claim_due), which selects every due record
//! earliest-first under `FOR UPDATE` row locks and returns a [`DueBatch`].
//! Each record handled is [`acknowledged`](DueBatch::acknowledge) (deleted
//! within the batch transaction); [`complete`](DueBatch::complete) commits.
//!
//! Delivery is at-least-once: a claimer that crashes or drops its batch rolls
//! back, and the same records are claimed again later.
//!
//! # Example
//!
//! ```ignore
//! use chrono::{Duration, Utc};
//! use quay::deferred::DeferredStore;
//! use quay::store::Headers;
//!
//! let store = DeferredStore::new(provider.clone(), table, clock);
//! store.ensure_schema()?;
//!
//! let mut unit = provider.begin()?;
//! store.defer(&mut unit, &(Utc::now() + Duration::minutes(5)), &Headers::new(), b"payload")?;
//! unit.complete()?;
//!
//! let mut batch = store.claim_due()?;
//! let ids: Vec<_> = batch.messages().iter().map(|message| message.id()).collect();
//! for id in ids {
//!     batch.acknowledge(id)?;
//! }
//! batch.complete()?;
//! ```

mod batch;
mod domain;
mod sql;
mod store;

pub use batch::DueBatch;
pub use domain::{DeferredId, DueMessage};
pub use store::DeferredStore;

//! Shared `PostgreSQL` plumbing for the stores.
//!
//! - [`TableName`]: validated, quoted table references
//! - [`ConnectionProvider`] and [`UnitOfWork`]: pooled connections bound to one
//!   explicit transaction each, plus catalogue introspection
//! - [`HeaderCodec`]: pluggable header encoding
//! - [`ClaimLocking`]: the row-lock discipline used by every claim
//! - [`StoreError`]: the error taxonomy surfaced by all operations

pub mod codec;
pub mod connection;
pub mod error;
pub mod locking;
pub mod schema;
pub mod table_name;

pub use codec::{HeaderCodec, Headers, JsonHeaderCodec};
pub use connection::{ColumnInfo, ConnectionOptions, ConnectionProvider, PgPool, UnitOfWork};
pub use error::{StoreError, StoreResult};
pub use locking::ClaimLocking;
pub use schema::SchemaOutcome;
pub use table_name::{DEFAULT_SCHEMA, TableName, TableNameError};

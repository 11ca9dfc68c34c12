//! Quay: durable message-bus storage on `PostgreSQL`.
//!
//! This crate provides the persistence a message bus needs around its
//! handlers: deferred delivery ("deliver after time T"), an append-only saga
//! snapshot log, and a competing-consumer queue. Coordination between
//! processes relies solely on `PostgreSQL` transactions and row locks.
//!
//! # Units of work
//!
//! Every store operation runs inside an explicit
//! [`UnitOfWork`](store::UnitOfWork): one pooled connection with one open
//! transaction. Completing the unit commits; dropping it rolls back and
//! releases every row lock it took.
//!
//! # Modules
//!
//! - [`store`]: connection provider, unit of work, table names, errors
//! - [`deferred`]: deferred-delivery store and due-message claims
//! - [`snapshot`]: saga snapshot audit log
//! - [`transport`]: competing-consumer send/receive queue
//! - [`config`]: layered settings that wire the above together

pub mod config;
pub mod deferred;
pub mod snapshot;
pub mod store;
pub mod transport;

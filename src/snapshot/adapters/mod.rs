//! Snapshot storage adapters.

pub mod memory;
pub mod postgres;

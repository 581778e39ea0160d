//! Surrogate State - Scene stores and replication reconciliation
//!
//! This crate implements the document side of delegation:
//! - Scene store seam (lookup, create, update, delete)
//! - In-memory scene store with a change feed
//! - Lagged replication of a change feed into a replica
//! - Replication reconciler (bounded polling for replicated tiles)

pub mod reconcile;
pub mod replication;
pub mod store;

pub use reconcile::*;
pub use replication::*;
pub use store::*;

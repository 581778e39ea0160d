//! Surrogate Test Harness - Multi-participant delegation scenarios
//!
//! This crate provides:
//! - Host stand-ins for the non-delegated path
//! - A cluster of participants over a shared in-process hub, with an
//!   authoritative store, lagged replicas and configurable link conditions
//! - End-to-end scenarios (delegation, fall-through, elevated churn,
//!   lossy and duplicating links)

pub mod cluster;
pub mod host;

#[cfg(test)]
mod integration;

pub use cluster::*;
pub use host::*;

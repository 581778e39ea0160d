//! Surrogate Transport - Best-effort broadcast channels
//!
//! This crate provides:
//! - The broadcast channel seam used by the delegation runtime
//! - An in-process hub with seeded loss/duplication
//! - UDP fan-out to a fixed peer list

pub mod channel;
pub mod local;
pub mod udp;

pub use channel::*;
pub use local::*;
pub use udp::*;

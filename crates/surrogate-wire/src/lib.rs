//! Surrogate Wire Protocol - JSON message envelope
//!
//! This crate implements the only bit-exact contract of the subsystem:
//! - Request/response envelope (`v`, `action`, correlation fields)
//! - Delegated operation names and their payloads
//! - Secondary option whitelist

pub mod envelope;
pub mod operation;
pub mod options;

pub use envelope::*;
pub use operation::*;
pub use options::*;

//! Surrogate Time - Timer capability
//!
//! Every suspension that waits on the passage of time (RPC timeouts,
//! reconciliation back-off) goes through a [`Timer`], so tests can drive
//! time by hand instead of sleeping on the wall clock.

pub mod clock;

pub use clock::*;

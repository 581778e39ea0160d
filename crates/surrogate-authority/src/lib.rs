//! Surrogate Authority
//!
//! Who must delegate, and to whom.
//!
//! # Asymmetric Authority
//!
//! Only elevated participants may mutate tiles. A regular participant that
//! is attached to a scene may still ask for a mutation: the capability gate
//! decides that the call must be delegated, and election picks the single
//! elevated peer that will carry it out.
//!
//! Both are pure functions of the current session view, cheap enough to run
//! inside per-interaction permission checks.

pub mod election;
pub mod gate;

pub use election::*;
pub use gate::*;

//! Surrogate Runtime - Delegation of privileged tile operations
//!
//! A non-elevated participant's tile operations are redirected to an
//! elected elevated peer over a best-effort broadcast channel:
//! 1. Interception layer asks the capability gate
//! 2. RPC relay elects a delegate and sends a correlated request
//! 3. Operation executor on the delegate mutates the store and replies
//! 4. RPC relay settles the caller's future (response or timeout)
//! 5. Reconciler waits for the mutation to replicate locally
//!
//! `Deputy` wires these together for one participant.

pub mod config;
pub mod executor;
pub mod intercept;
pub mod logging;
pub mod node;
pub mod relay;

pub use config::*;
pub use executor::*;
pub use intercept::*;
pub use logging::*;
pub use node::*;
pub use relay::*;

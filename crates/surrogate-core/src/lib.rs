//! Surrogate Core - Fundamental types and host seams
//!
//! This crate defines the types shared by every layer of the delegation
//! subsystem:
//! - Identifiers (ParticipantId, SceneId, DocumentId, RequestId)
//! - Participants and their role/connectivity view
//! - Tile documents and their data maps
//! - Session context and the administrative feature flag
//! - Host entry points that the interception layer wraps
//! - The error taxonomy

pub mod document;
pub mod error;
pub mod host;
pub mod id;
pub mod participant;
pub mod session;
pub mod setting;

pub use document::*;
pub use error::*;
pub use host::*;
pub use id::*;
pub use participant::*;
pub use session::*;
pub use setting::*;

//! Error types for the delegation subsystem

use std::time::Duration;

use thiserror::Error;

use crate::RequestId;

/// Surrogate errors
///
/// The Display text of the elevated-side variants is what a failure
/// response carries in its `error` field.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SurrogateError {
    // Requester-side delegation errors
    #[error("No active GM is connected.")]
    NoAuthority,

    #[error("Timed out waiting for GM response.")]
    RpcTimeout { request_id: RequestId, waited: Duration },

    /// Elevated peer reported failure; carries its description verbatim
    #[error("{0}")]
    RemoteOperation(String),

    #[error("Relay shut down before request {0} settled")]
    RelayClosed(RequestId),

    // Elevated-side execution errors
    #[error("Player tile editing is disabled by the GM.")]
    Disabled,

    #[error("Scene not found.")]
    SceneNotFound,

    #[error("Tile not found.")]
    TileNotFound,

    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    // Local host errors
    #[error("User lacks permission to {0} tiles in this scene")]
    PermissionDenied(&'static str),

    // Plumbing errors
    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl SurrogateError {
    /// True for errors produced by the delegation path rather than by the host
    pub fn is_delegation_failure(&self) -> bool {
        matches!(
            self,
            SurrogateError::NoAuthority
                | SurrogateError::RpcTimeout { .. }
                | SurrogateError::RemoteOperation(_)
                | SurrogateError::RelayClosed(_)
        )
    }
}

impl From<serde_json::Error> for SurrogateError {
    fn from(err: serde_json::Error) -> Self {
        SurrogateError::Codec(err.to_string())
    }
}

/// Result type for Surrogate operations
pub type SurrogateResult<T> = Result<T, SurrogateError>;

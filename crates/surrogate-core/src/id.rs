//! Identity types for the delegation protocol
//!
//! Host identifiers are opaque strings. Ordering is plain byte-wise
//! (ordinal) string comparison, which is what authority election relies on.

use std::fmt;

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Length of generated identifiers, matching the host's random ID format
pub const GENERATED_ID_LEN: usize = 16;

fn random_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_ID_LEN)
        .map(char::from)
        .collect()
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $debug:literal) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            #[inline]
            pub fn new(id: impl Into<String>) -> Self {
                $name(id.into())
            }

            #[inline]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($debug, "({})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                $name(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                $name(id)
            }
        }
    };
}

string_id!(
    /// Participant identity - stable for the lifetime of a session
    ParticipantId,
    "Participant"
);

string_id!(
    /// Scene identity - the shared context a mutation is scoped to
    SceneId,
    "Scene"
);

string_id!(
    /// Document identity - unique within a scene's tile collection
    DocumentId,
    "Doc"
);

string_id!(
    /// Correlation identity for one delegated request
    RequestId,
    "Request"
);

impl DocumentId {
    /// Generate a fresh document ID
    pub fn generate() -> Self {
        DocumentId(random_id())
    }
}

impl RequestId {
    /// Generate a fresh correlation ID
    pub fn generate() -> Self {
        RequestId(random_id())
    }
}

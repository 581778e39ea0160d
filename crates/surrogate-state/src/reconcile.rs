//! Replication reconciler
//!
//! After an elevated peer performs a mutation, the affected tiles reach the
//! requester only through replication. The reconciler polls the local view
//! until every requested tile is present or the attempts run out. Running
//! out is a soft outcome: the caller gets whatever subset is visible.

use std::time::Duration;

use tracing::{debug, warn};

use surrogate_core::{DocumentId, SceneId, TileDocument};
use surrogate_time::Timer;

use crate::TileLookup;

/// Default number of lookups before giving up
pub const DEFAULT_RECONCILE_ATTEMPTS: u32 = 10;

/// Default pause between lookups
pub const DEFAULT_RECONCILE_DELAY: Duration = Duration::from_millis(50);

/// Polling bounds for [`await_replicated`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReconcilePolicy {
    /// Lookups performed at most (at least one is always made)
    pub attempts: u32,
    /// Pause between two lookups
    pub delay: Duration,
}

impl Default for ReconcilePolicy {
    fn default() -> Self {
        ReconcilePolicy {
            attempts: DEFAULT_RECONCILE_ATTEMPTS,
            delay: DEFAULT_RECONCILE_DELAY,
        }
    }
}

/// Tiles from `ids` that are currently visible, in request order
pub fn resolve_present<L: TileLookup + ?Sized>(
    lookup: &L,
    scene: &SceneId,
    ids: &[DocumentId],
) -> Vec<TileDocument> {
    ids.iter().filter_map(|id| lookup.get_tile(scene, id)).collect()
}

/// Wait until every id in `ids` resolves in `lookup`, or the attempts run out.
///
/// Returns as soon as all tiles are present. On exhaustion returns the
/// subset visible at the last lookup; never errors, never blocks past
/// `attempts` lookups and `attempts - 1` delays.
pub async fn await_replicated<L: TileLookup + ?Sized>(
    lookup: &L,
    scene: &SceneId,
    ids: &[DocumentId],
    policy: ReconcilePolicy,
    timer: &dyn Timer,
) -> Vec<TileDocument> {
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        let found = resolve_present(lookup, scene, ids);
        if found.len() == ids.len() {
            debug!(%scene, tiles = found.len(), attempt, "replicated tiles visible");
            return found;
        }
        if attempt >= attempts {
            warn!(
                %scene,
                requested = ids.len(),
                visible = found.len(),
                attempts,
                "replication incomplete, returning partial result"
            );
            return found;
        }
        timer.sleep(policy.delay).await;
        attempt += 1;
    }
}

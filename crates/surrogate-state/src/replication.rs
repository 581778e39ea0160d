//! Lagged replication of a store's change feed into a replica

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use surrogate_time::Timer;

use crate::{MemoryScenes, StoreChange};

/// Forward every change from `feed` into `replica`, holding each one back
/// by `lag`. Ends when the source store is dropped.
pub fn spawn_replication(
    mut feed: broadcast::Receiver<StoreChange>,
    replica: Arc<MemoryScenes>,
    lag: Duration,
    timer: Arc<dyn Timer>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match feed.recv().await {
                Ok(change) => {
                    if !lag.is_zero() {
                        timer.sleep(lag).await;
                    }
                    debug!(?change, "replicating change");
                    replica.apply(change);
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "replica fell behind the change feed");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SceneStore, TileLookup};
    use surrogate_core::DocumentData;
    use surrogate_time::TokioTimer;

    #[tokio::test(start_paused = true)]
    async fn test_replica_catches_up_after_lag() {
        let primary = MemoryScenes::with_scenes(["S1"]);
        let replica = Arc::new(MemoryScenes::with_scenes(["S1"]));
        let _task = spawn_replication(
            primary.changes(),
            replica.clone(),
            Duration::from_millis(30),
            TokioTimer::shared(),
        );

        let scene = "S1".into();
        let tile = primary
            .create_tiles(&scene, vec![DocumentData::new()], &DocumentData::new())
            .unwrap()
            .remove(0);
        assert!(replica.get_tile(&scene, &tile.id).is_none());

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(replica.get_tile(&scene, &tile.id), Some(tile));
    }
}

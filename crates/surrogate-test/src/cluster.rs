//! Multi-participant cluster over a shared in-process hub
//!
//! One authoritative store stands in for the host's server. Elevated peers
//! read and write it directly; players see it through a replica that lags
//! behind by `replication_lag`.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use surrogate_core::{
    DocumentId, FeatureFlag, HostHooks, LocalSession, Participant, ParticipantId, Roster, SceneId,
    SurrogateResult, TileDocument,
};
use surrogate_runtime::{Deputy, DeputyConfig};
use surrogate_state::{spawn_replication, MemoryScenes, StoreChange, TileLookup};
use surrogate_time::{Timer, TokioTimer};
use surrogate_transport::{LinkConditions, LocalHub};

use crate::{DirectTiles, RecordingLayerOptions, StaticLayer};

/// Cluster configuration
#[derive(Clone, Debug)]
pub struct ClusterConfig {
    /// Scenes present in the authoritative store
    pub scenes: Vec<SceneId>,
    /// Delay before a change reaches a player's replica
    pub replication_lag: Duration,
    /// Link behaviour of the shared hub
    pub link: LinkConditions,
    /// Initial state of the delegation setting
    pub enabled: bool,
    pub deputy: DeputyConfig,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        ClusterConfig {
            scenes: vec![SceneId::new("S1"), SceneId::new("S2")],
            replication_lag: Duration::from_millis(30),
            link: LinkConditions::perfect(),
            enabled: true,
            deputy: DeputyConfig::default(),
        }
    }
}

/// One participant of the cluster
pub struct Peer {
    pub id: ParticipantId,
    pub session: Arc<LocalSession>,
    /// What this participant sees locally
    pub view: Arc<MemoryScenes>,
    pub deputy: Deputy,
    pub hooks: HostHooks,
    pub layer_options: Arc<RecordingLayerOptions>,
    replication: Option<JoinHandle<()>>,
}

impl Peer {
    /// Tile as seen locally by this participant
    pub fn get_tile(&self, scene: &str, id: &DocumentId) -> Option<TileDocument> {
        self.view.get_tile(&scene.into(), id)
    }
}

impl Drop for Peer {
    fn drop(&mut self) {
        if let Some(task) = self.replication.take() {
            task.abort();
        }
    }
}

/// A set of participants sharing a roster, a hub, a setting and a world
pub struct Cluster {
    config: ClusterConfig,
    roster: Arc<Roster>,
    hub: Arc<LocalHub>,
    flag: Arc<FeatureFlag>,
    world: Arc<MemoryScenes>,
    timer: Arc<dyn Timer>,
}

impl Cluster {
    pub fn new(config: ClusterConfig) -> Self {
        let flag = Arc::new(FeatureFlag::delegation());
        flag.set(config.enabled);
        Cluster {
            roster: Arc::new(Roster::default()),
            hub: Arc::new(LocalHub::with_conditions(config.link.clone())),
            world: Arc::new(MemoryScenes::with_scenes(config.scenes.clone())),
            timer: Arc::new(TokioTimer::new()),
            flag,
            config,
        }
    }

    /// Join an elevated participant viewing `scene`. Must run inside a
    /// tokio runtime.
    pub fn join_elevated(&self, id: &str, scene: &str) -> SurrogateResult<Peer> {
        self.join(Participant::elevated(id), scene)
    }

    /// Join a non-elevated participant viewing `scene`
    pub fn join_player(&self, id: &str, scene: &str) -> SurrogateResult<Peer> {
        self.join(Participant::player(id), scene)
    }

    fn join(&self, participant: Participant, scene: &str) -> SurrogateResult<Peer> {
        let id = participant.id.clone();
        let elevated = participant.elevated;
        self.roster.upsert(participant);

        let session = Arc::new(
            LocalSession::new(id.clone(), Arc::clone(&self.roster)).with_active_scene(scene),
        );

        let (view, replication) = if elevated {
            (Arc::clone(&self.world), None)
        } else {
            let replica = Arc::new(MemoryScenes::with_scenes(self.world_scenes()));
            let task = spawn_replication(
                self.world.changes(),
                Arc::clone(&replica),
                self.config.replication_lag,
                Arc::clone(&self.timer),
            );
            // Catch up on what already exists
            for scene in self.world_scenes() {
                for tile in self.world.tiles(&scene) {
                    replica.apply(StoreChange::Upserted(tile));
                }
            }
            (replica, Some(task))
        };

        let layer_options = Arc::new(RecordingLayerOptions::default());
        let direct = Arc::new(DirectTiles::new(session.clone(), self.world.clone()));
        let mut hooks = HostHooks::new(direct.clone(), direct, Arc::new(StaticLayer(elevated)));

        let deputy = Deputy::builder(session.clone(), self.hub.clone(), Arc::clone(&self.flag))
            .config(self.config.deputy.clone())
            .timer(Arc::clone(&self.timer))
            .store(self.world.clone())
            .replica(view.clone())
            .layer_options(layer_options.clone())
            .build()?;
        deputy.install(&mut hooks);
        deputy.start();

        Ok(Peer {
            id,
            session,
            view,
            deputy,
            hooks,
            layer_options,
            replication,
        })
    }

    fn world_scenes(&self) -> Vec<SceneId> {
        self.config.scenes.clone()
    }

    /// Mark a participant disconnected (or reconnected)
    pub fn set_connected(&self, id: &str, connected: bool) {
        self.roster.set_connected(&id.into(), connected);
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.flag.set(enabled);
    }

    pub fn set_link(&self, link: LinkConditions) {
        self.hub.set_conditions(link);
    }

    pub fn world(&self) -> &Arc<MemoryScenes> {
        &self.world
    }

    pub fn hub(&self) -> &Arc<LocalHub> {
        &self.hub
    }

    pub fn roster(&self) -> &Arc<Roster> {
        &self.roster
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }
}

//! Deputy - one participant's delegation runtime

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use surrogate_authority::CapabilityGate;
use surrogate_core::{
    FeatureFlag, HostHooks, LayerOptions, SceneEmbeddedHandler, SessionContext, SurrogateError,
    SurrogateResult, TileDocumentHandler, TileLayerCapabilities,
};
use surrogate_state::{SceneStore, TileLookup};
use surrogate_time::{Timer, TokioTimer};
use surrogate_transport::BroadcastChannel;
use surrogate_wire::Envelope;

use crate::{
    Delegation, DelegatingEmbedded, DelegatingLayer, DelegatingTiles, DeputyConfig,
    OperationExecutor, RpcRelay,
};

/// Listener counters
#[derive(Debug, Default)]
pub struct DeputyStats {
    pub messages_in: AtomicU64,
    pub undecodable: AtomicU64,
    pub responses_routed: AtomicU64,
    pub requests_answered: AtomicU64,
}

/// Builder for [`Deputy`]
pub struct DeputyBuilder {
    config: DeputyConfig,
    session: Arc<dyn SessionContext>,
    channel: Arc<dyn BroadcastChannel>,
    flag: Arc<FeatureFlag>,
    timer: Option<Arc<dyn Timer>>,
    store: Option<Arc<dyn SceneStore>>,
    replica: Option<Arc<dyn TileLookup>>,
    layer_options: Option<Arc<dyn LayerOptions>>,
}

impl DeputyBuilder {
    /// Override the default config
    pub fn config(mut self, config: DeputyConfig) -> Self {
        self.config = config;
        self
    }

    /// Timer for relay timeouts and reconciler delays (tokio by default)
    pub fn timer(mut self, timer: Arc<dyn Timer>) -> Self {
        self.timer = Some(timer);
        self
    }

    /// Authoritative store; enables the executor on this participant
    pub fn store(mut self, store: Arc<dyn SceneStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Local replicated view used by the reconciler
    pub fn replica(mut self, replica: Arc<dyn TileLookup>) -> Self {
        self.replica = Some(replica);
        self
    }

    /// Host hook notified when the tile layer options must be refreshed
    pub fn layer_options(mut self, options: Arc<dyn LayerOptions>) -> Self {
        self.layer_options = Some(options);
        self
    }

    pub fn build(self) -> SurrogateResult<Deputy> {
        self.config.validate()?;
        let replica = self
            .replica
            .ok_or_else(|| SurrogateError::Config("a replica view is required".into()))?;
        let timer = self.timer.unwrap_or_else(TokioTimer::shared);

        let gate = CapabilityGate::new(Arc::clone(&self.flag), Arc::clone(&self.session));
        let relay = Arc::new(RpcRelay::new(
            Arc::clone(&self.session),
            Arc::clone(&self.channel),
            Arc::clone(&timer),
            &self.config,
        ));
        let executor = self.store.map(|store| {
            Arc::new(OperationExecutor::new(
                Arc::clone(&self.session),
                Arc::clone(&self.flag),
                store,
                self.config.served_cache_capacity,
            ))
        });
        let delegation = Arc::new(Delegation::new(
            gate,
            Arc::clone(&relay),
            replica,
            timer,
            self.config.reconcile_policy(),
        ));

        Ok(Deputy {
            config: self.config,
            session: self.session,
            channel: self.channel,
            flag: self.flag,
            relay,
            executor,
            delegation,
            layer_options: self.layer_options,
            stats: Arc::new(DeputyStats::default()),
            started: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        })
    }
}

/// Delegation runtime of one participant.
///
/// Owns the relay (requester side) and, when given a store, the executor
/// (elevated side). `start` spawns the inbound listener and the feature
/// flag watcher; `install` wraps the host's entry points.
pub struct Deputy {
    config: DeputyConfig,
    session: Arc<dyn SessionContext>,
    channel: Arc<dyn BroadcastChannel>,
    flag: Arc<FeatureFlag>,
    relay: Arc<RpcRelay>,
    executor: Option<Arc<OperationExecutor>>,
    delegation: Arc<Delegation>,
    layer_options: Option<Arc<dyn LayerOptions>>,
    stats: Arc<DeputyStats>,
    started: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Deputy {
    /// Start building a deputy for the local session
    pub fn builder(
        session: Arc<dyn SessionContext>,
        channel: Arc<dyn BroadcastChannel>,
        flag: Arc<FeatureFlag>,
    ) -> DeputyBuilder {
        DeputyBuilder {
            config: DeputyConfig::default(),
            session,
            channel,
            flag,
            timer: None,
            store: None,
            replica: None,
            layer_options: None,
        }
    }

    /// Spawn the listener and flag watcher. One-shot: returns false if
    /// already started. Must be called inside a tokio runtime.
    pub fn start(&self) -> bool {
        if self.started.swap(true, Ordering::SeqCst) {
            return false;
        }

        // Subscribe before returning so nothing emitted afterwards is missed
        let mut inbound = self.channel.subscribe(&self.config.event_name);
        let listener = {
            let relay = Arc::clone(&self.relay);
            let executor = self.executor.clone();
            let channel = Arc::clone(&self.channel);
            let event = self.config.event_name.clone();
            let stats = Arc::clone(&self.stats);
            tokio::spawn(async move {
                while let Some(message) = inbound.recv().await {
                    handle_inbound(
                        &relay,
                        executor.as_deref(),
                        channel.as_ref(),
                        &event,
                        &stats,
                        message,
                    );
                }
                debug!(event = %event, "Inbound channel closed");
            })
        };

        let mut tasks = self.tasks.lock();
        tasks.push(listener);

        let gate = self.delegation.gate().clone();
        if let Some(options) = self.layer_options.clone() {
            options.refresh(gate.layer_open());
            let mut changes = self.flag.subscribe();
            tasks.push(tokio::spawn(async move {
                while changes.changed().await.is_ok() {
                    let allow = gate.layer_open();
                    debug!(allow, "Delegation setting changed, refreshing layer options");
                    options.refresh(allow);
                }
            }));
        }

        let local = self.session.local();
        if local.elevated && self.flag.enabled() {
            info!(
                participant = %local.id,
                "Player tile editing is enabled; this participant executes delegated requests"
            );
        }
        true
    }

    /// Wrap the host's entry points. Each is wrapped at most once; returns
    /// how many were wrapped by this call.
    pub fn install(&self, hooks: &mut HostHooks) -> usize {
        let mut wrapped = 0;

        let delegation = Arc::clone(&self.delegation);
        if hooks.wrap_tiles(|inner| -> Arc<dyn TileDocumentHandler> {
            Arc::new(DelegatingTiles::new(inner, delegation))
        }) {
            wrapped += 1;
        }

        let delegation = Arc::clone(&self.delegation);
        if hooks.wrap_embedded(|inner| -> Arc<dyn SceneEmbeddedHandler> {
            Arc::new(DelegatingEmbedded::new(inner, delegation))
        }) {
            wrapped += 1;
        }

        let gate = self.delegation.gate().clone();
        if hooks.wrap_layer(|inner| -> Arc<dyn TileLayerCapabilities> {
            Arc::new(DelegatingLayer::new(inner, gate))
        }) {
            wrapped += 1;
        }

        debug!(wrapped, "Installed delegation wrappers");
        wrapped
    }

    /// Abort the spawned tasks; pending requests run into their timeouts
    pub fn shutdown(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }

    /// Whether `start` has run
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Get config
    pub fn config(&self) -> &DeputyConfig {
        &self.config
    }

    /// Local session view
    pub fn session(&self) -> &Arc<dyn SessionContext> {
        &self.session
    }

    /// Delegation setting
    pub fn flag(&self) -> &Arc<FeatureFlag> {
        &self.flag
    }

    /// Outbound request relay
    pub fn relay(&self) -> &Arc<RpcRelay> {
        &self.relay
    }

    /// Request executor, present on elevated participants only
    pub fn executor(&self) -> Option<&Arc<OperationExecutor>> {
        self.executor.as_ref()
    }

    /// Shared state of the delegating wrappers
    pub fn delegation(&self) -> &Arc<Delegation> {
        &self.delegation
    }

    /// Get statistics
    pub fn stats(&self) -> &DeputyStats {
        &self.stats
    }
}

impl Drop for Deputy {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Route one inbound message. Never fails: bad traffic is dropped.
fn handle_inbound(
    relay: &RpcRelay,
    executor: Option<&OperationExecutor>,
    channel: &dyn BroadcastChannel,
    event: &str,
    stats: &DeputyStats,
    message: Value,
) {
    stats.messages_in.fetch_add(1, Ordering::Relaxed);
    let envelope = match Envelope::decode(message) {
        Ok(envelope) => envelope,
        Err(e) => {
            stats.undecodable.fetch_add(1, Ordering::Relaxed);
            debug!(error = %e, "Dropping undecodable message");
            return;
        }
    };
    trace!(request_id = %envelope.request_id(), "Routing inbound message");

    match envelope {
        Envelope::Response(response) => {
            if relay.handle_response(response) {
                stats.responses_routed.fetch_add(1, Ordering::Relaxed);
            }
        }
        Envelope::Request(request) => {
            let Some(response) = executor.and_then(|executor| executor.handle_request(&request))
            else {
                return;
            };
            let request_id = response.request_id.clone();
            match Envelope::from(response)
                .encode()
                .and_then(|message| channel.emit(event, message))
            {
                Ok(()) => {
                    stats.requests_answered.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    warn!(request_id = %request_id, error = %e, "Failed to send response");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use serde_json::json;
    use surrogate_core::{
        BoxFuture, DocumentData, DocumentId, EntryPoint, LocalSession, ModifyAction, Participant,
        PermissionLevel, Roster, SceneId, TileDocument,
    };
    use surrogate_state::MemoryScenes;
    use surrogate_transport::LocalHub;
    use surrogate_wire::Operation;

    #[derive(Default)]
    struct RecordedRefresh(Mutex<Vec<bool>>);

    impl LayerOptions for RecordedRefresh {
        fn refresh(&self, allow: bool) {
            self.0.lock().push(allow);
        }
    }

    struct Inert;

    impl TileDocumentHandler for Inert {
        fn create<'a>(
            &'a self,
            _: &'a SceneId,
            _: DocumentData,
            _: DocumentData,
        ) -> BoxFuture<'a, SurrogateResult<Option<TileDocument>>> {
            Box::pin(async { Ok(None) })
        }
        fn update<'a>(
            &'a self,
            tile: &'a TileDocument,
            _: DocumentData,
            _: DocumentData,
        ) -> BoxFuture<'a, SurrogateResult<TileDocument>> {
            Box::pin(async move { Ok(tile.clone()) })
        }
        fn delete<'a>(
            &'a self,
            tile: &'a TileDocument,
            _: DocumentData,
        ) -> BoxFuture<'a, SurrogateResult<TileDocument>> {
            Box::pin(async move { Ok(tile.clone()) })
        }
        fn can_user_create(&self, _: &Participant, _: &SceneId, _: &DocumentData) -> bool {
            false
        }
        fn can_user_modify(&self, _: &Participant, _: &TileDocument, _: ModifyAction) -> bool {
            false
        }
        fn test_user_permission(&self, _: &Participant, _: &TileDocument, _: PermissionLevel) -> bool {
            false
        }
    }

    impl SceneEmbeddedHandler for Inert {
        fn create_embedded<'a>(
            &'a self,
            _: &'a SceneId,
            _: &'a str,
            _: Vec<DocumentData>,
            _: DocumentData,
        ) -> BoxFuture<'a, SurrogateResult<Vec<TileDocument>>> {
            Box::pin(async { Ok(Vec::new()) })
        }
        fn update_embedded<'a>(
            &'a self,
            _: &'a SceneId,
            _: &'a str,
            _: Vec<DocumentData>,
            _: DocumentData,
        ) -> BoxFuture<'a, SurrogateResult<Vec<TileDocument>>> {
            Box::pin(async { Ok(Vec::new()) })
        }
        fn delete_embedded<'a>(
            &'a self,
            _: &'a SceneId,
            _: &'a str,
            _: Vec<DocumentId>,
            _: DocumentData,
        ) -> BoxFuture<'a, SurrogateResult<Vec<TileDocument>>> {
            Box::pin(async { Ok(Vec::new()) })
        }
    }

    impl TileLayerCapabilities for Inert {
        fn can_drag_create(&self) -> bool {
            false
        }
        fn can_create(&self) -> bool {
            false
        }
        fn can_control(&self) -> bool {
            false
        }
    }

    struct Pair {
        hub: Arc<LocalHub>,
        store: Arc<MemoryScenes>,
        flag: Arc<FeatureFlag>,
        gm: Deputy,
        player: Deputy,
    }

    fn pair() -> Pair {
        let roster = Arc::new(Roster::new(vec![
            Participant::elevated("gm"),
            Participant::player("p1"),
        ]));
        let hub = Arc::new(LocalHub::new());
        let flag = Arc::new(FeatureFlag::delegation());
        flag.set(true);
        let store = Arc::new(MemoryScenes::with_scenes(["S1"]));

        let gm = Deputy::builder(
            Arc::new(LocalSession::new("gm", roster.clone()).with_active_scene("S1")),
            hub.clone(),
            flag.clone(),
        )
        .store(store.clone())
        .replica(store.clone())
        .build()
        .unwrap();
        let player = Deputy::builder(
            Arc::new(LocalSession::new("p1", roster).with_active_scene("S1")),
            hub.clone(),
            flag.clone(),
        )
        .replica(store.clone())
        .build()
        .unwrap();

        Pair { hub, store, flag, gm, player }
    }

    #[test]
    fn test_build_requires_replica() {
        let roster = Arc::new(Roster::new(vec![]));
        let result = Deputy::builder(
            Arc::new(LocalSession::new("p1", roster)),
            Arc::new(LocalHub::new()),
            Arc::new(FeatureFlag::delegation()),
        )
        .build();
        assert!(matches!(result, Err(SurrogateError::Config(_))));
    }

    #[tokio::test]
    async fn test_request_round_trip_between_deputies() {
        let p = pair();
        assert!(p.gm.start());
        assert!(p.player.start());

        let result = p
            .player
            .relay()
            .request(Operation::Create, json!({"sceneId": "S1", "data": [{"x": 1, "y": 2}]}))
            .await
            .unwrap();

        let ids: Vec<String> = serde_json::from_value(result["documentIds"].clone()).unwrap();
        assert_eq!(ids.len(), 1);
        assert_eq!(p.store.tile_count(&"S1".into()), 1);
        assert_eq!(p.gm.stats().requests_answered.load(Ordering::Relaxed), 1);
        assert_eq!(p.player.stats().responses_routed.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_start_is_one_shot() {
        let p = pair();
        assert!(p.gm.start());
        assert!(!p.gm.start());
        assert!(p.gm.is_started());
        assert!(p.player.start());

        // A second listener would answer twice
        p.player
            .relay()
            .request(Operation::Create, json!({"sceneId": "S1", "data": [{}]}))
            .await
            .unwrap();
        assert_eq!(p.gm.stats().requests_answered.load(Ordering::Relaxed), 1);
        assert_eq!(p.hub.emitted(), 2);
    }

    #[tokio::test]
    async fn test_noise_is_dropped() {
        let p = pair();
        p.gm.start();
        p.hub.emit(&p.gm.config().event_name, json!("garbage")).unwrap();
        p.hub
            .emit(&p.gm.config().event_name, json!({"v": 2, "action": "request"}))
            .unwrap();
        tokio::task::yield_now().await;
        assert_eq!(p.gm.stats().undecodable.load(Ordering::Relaxed), 2);
        assert_eq!(p.gm.stats().requests_answered.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_install_wraps_once() {
        let p = pair();
        let mut hooks = HostHooks::new(Arc::new(Inert), Arc::new(Inert), Arc::new(Inert));

        assert_eq!(p.player.install(&mut hooks), 3);
        assert_eq!(p.player.install(&mut hooks), 0);
        assert!(hooks.is_wrapped(EntryPoint::TileDocument));
        assert!(hooks.is_wrapped(EntryPoint::SceneEmbedded));
        assert!(hooks.layer().can_create());
    }

    #[tokio::test]
    async fn test_flag_watcher_refreshes_layer_options() {
        let roster = Arc::new(Roster::new(vec![Participant::player("p1")]));
        let flag = Arc::new(FeatureFlag::delegation());
        let refresh = Arc::new(RecordedRefresh::default());
        let store = Arc::new(MemoryScenes::new());
        let deputy = Deputy::builder(
            Arc::new(LocalSession::new("p1", roster)),
            Arc::new(LocalHub::new()),
            flag.clone(),
        )
        .replica(store)
        .layer_options(refresh.clone())
        .build()
        .unwrap();

        deputy.start();
        assert_eq!(*refresh.0.lock(), vec![false]);

        flag.set(true);
        tokio::time::timeout(Duration::from_secs(1), async {
            while refresh.0.lock().len() < 2 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert_eq!(*refresh.0.lock(), vec![false, true]);
    }

    #[tokio::test]
    async fn test_disabled_flag_round_trip() {
        let p = pair();
        p.gm.start();
        p.player.start();
        p.flag.set(false);

        let err = p
            .player
            .relay()
            .request(Operation::Create, json!({"sceneId": "S1", "data": [{}]}))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Player tile editing is disabled by the GM.");
    }
}

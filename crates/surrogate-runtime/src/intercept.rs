//! Interception layer
//!
//! Decorators over the host's entry points. When the capability gate says a
//! call must be delegated, it goes through the relay and the reconciler;
//! otherwise the wrapped original runs untouched.

use std::sync::Arc;

use tracing::debug;

use surrogate_authority::CapabilityGate;
use surrogate_core::{
    BoxFuture, DocumentData, DocumentId, ModifyAction, Participant, PermissionLevel,
    SceneEmbeddedHandler, SceneId, SurrogateResult, TileDocument, TileDocumentHandler,
    TileLayerCapabilities, TILE_KIND,
};
use surrogate_state::{await_replicated, resolve_present, ReconcilePolicy, TileLookup};
use surrogate_time::Timer;
use surrogate_wire::{
    CreatePayload, DeleteManyPayload, DeletePayload, OperationPayload, OperationResult,
    RpcOptions, UpdateManyPayload, UpdatePayload,
};

use crate::RpcRelay;

/// Everything a delegating entry point needs
pub struct Delegation {
    gate: CapabilityGate,
    relay: Arc<RpcRelay>,
    replica: Arc<dyn TileLookup>,
    timer: Arc<dyn Timer>,
    policy: ReconcilePolicy,
}

impl Delegation {
    pub fn new(
        gate: CapabilityGate,
        relay: Arc<RpcRelay>,
        replica: Arc<dyn TileLookup>,
        timer: Arc<dyn Timer>,
        policy: ReconcilePolicy,
    ) -> Self {
        Delegation {
            gate,
            relay,
            replica,
            timer,
            policy,
        }
    }

    /// Must the local participant's operation on `scene` be delegated?
    pub fn applies(&self, scene: &SceneId) -> bool {
        let local = self.gate.session().local();
        self.gate.allowed(Some(&local), Some(scene))
    }

    /// Would `user` be delegated on `scene`? Used by permission predicates.
    pub fn applies_to(&self, user: &Participant, scene: &SceneId) -> bool {
        self.gate.allowed(Some(user), Some(scene))
    }

    pub fn gate(&self) -> &CapabilityGate {
        &self.gate
    }

    pub fn relay(&self) -> &Arc<RpcRelay> {
        &self.relay
    }

    async fn send(&self, payload: OperationPayload) -> SurrogateResult<OperationResult> {
        debug!(
            op = %payload.operation(),
            scene = ?payload.scene_id(),
            "Delegating tile operation"
        );
        let result = self.relay.request_payload(&payload).await?;
        Ok(OperationResult::from_value(&result))
    }

    /// Delegate `payload`, then wait for the affected tiles to replicate
    /// when the operation leaves documents behind. `fallback` supplies the
    /// ids when the delegate reports none.
    async fn apply(
        &self,
        scene: &SceneId,
        payload: OperationPayload,
        fallback: impl FnOnce() -> Vec<DocumentId>,
    ) -> SurrogateResult<Vec<TileDocument>> {
        let operation = payload.operation();
        let result = self.send(payload).await?;
        if !operation.needs_reconciliation() {
            return Ok(Vec::new());
        }
        let ids = result.ids_or(fallback);
        Ok(await_replicated(
            self.replica.as_ref(),
            scene,
            &ids,
            self.policy,
            self.timer.as_ref(),
        )
        .await)
    }
}

/// Delegating decorator for single-document tile operations
pub struct DelegatingTiles {
    inner: Arc<dyn TileDocumentHandler>,
    delegation: Arc<Delegation>,
}

impl DelegatingTiles {
    pub fn new(inner: Arc<dyn TileDocumentHandler>, delegation: Arc<Delegation>) -> Self {
        DelegatingTiles { inner, delegation }
    }
}

impl TileDocumentHandler for DelegatingTiles {
    fn create<'a>(
        &'a self,
        scene: &'a SceneId,
        data: DocumentData,
        options: DocumentData,
    ) -> BoxFuture<'a, SurrogateResult<Option<TileDocument>>> {
        if !self.delegation.applies(scene) {
            return self.inner.create(scene, data, options);
        }
        Box::pin(async move {
            let payload = OperationPayload::Create(CreatePayload {
                scene_id: Some(scene.clone()),
                data: vec![data],
                options: RpcOptions::pick(&options),
            });
            let tiles = self.delegation.apply(scene, payload, Vec::new).await?;
            Ok(tiles.into_iter().next())
        })
    }

    fn update<'a>(
        &'a self,
        tile: &'a TileDocument,
        changes: DocumentData,
        options: DocumentData,
    ) -> BoxFuture<'a, SurrogateResult<TileDocument>> {
        if !self.delegation.applies(&tile.scene_id) {
            return self.inner.update(tile, changes, options);
        }
        Box::pin(async move {
            let payload = OperationPayload::Update(UpdatePayload {
                scene_id: Some(tile.scene_id.clone()),
                document_id: Some(tile.id.clone()),
                changes,
                options: RpcOptions::pick(&options),
            });
            let tiles = self
                .delegation
                .apply(&tile.scene_id, payload, || vec![tile.id.clone()])
                .await?;
            Ok(tiles.into_iter().next().unwrap_or_else(|| tile.clone()))
        })
    }

    fn delete<'a>(
        &'a self,
        tile: &'a TileDocument,
        options: DocumentData,
    ) -> BoxFuture<'a, SurrogateResult<TileDocument>> {
        if !self.delegation.applies(&tile.scene_id) {
            return self.inner.delete(tile, options);
        }
        Box::pin(async move {
            let payload = OperationPayload::Delete(DeletePayload {
                scene_id: Some(tile.scene_id.clone()),
                document_id: Some(tile.id.clone()),
                options: RpcOptions::pick(&options),
            });
            self.delegation
                .apply(&tile.scene_id, payload, Vec::new)
                .await?;
            Ok(tile.clone())
        })
    }

    fn can_user_create(&self, user: &Participant, scene: &SceneId, data: &DocumentData) -> bool {
        self.delegation.applies_to(user, scene) || self.inner.can_user_create(user, scene, data)
    }

    fn can_user_modify(
        &self,
        user: &Participant,
        tile: &TileDocument,
        action: ModifyAction,
    ) -> bool {
        self.delegation.applies_to(user, &tile.scene_id)
            || self.inner.can_user_modify(user, tile, action)
    }

    fn test_user_permission(
        &self,
        user: &Participant,
        tile: &TileDocument,
        permission: PermissionLevel,
    ) -> bool {
        self.delegation.applies_to(user, &tile.scene_id)
            || self.inner.test_user_permission(user, tile, permission)
    }
}

/// Delegating decorator for a scene's embedded batch operations.
/// Only the tile kind is delegated.
pub struct DelegatingEmbedded {
    inner: Arc<dyn SceneEmbeddedHandler>,
    delegation: Arc<Delegation>,
}

impl DelegatingEmbedded {
    pub fn new(inner: Arc<dyn SceneEmbeddedHandler>, delegation: Arc<Delegation>) -> Self {
        DelegatingEmbedded { inner, delegation }
    }

    fn applies(&self, scene: &SceneId, kind: &str) -> bool {
        kind == TILE_KIND && self.delegation.applies(scene)
    }
}

impl SceneEmbeddedHandler for DelegatingEmbedded {
    fn create_embedded<'a>(
        &'a self,
        scene: &'a SceneId,
        kind: &'a str,
        data: Vec<DocumentData>,
        options: DocumentData,
    ) -> BoxFuture<'a, SurrogateResult<Vec<TileDocument>>> {
        if !self.applies(scene, kind) {
            return self.inner.create_embedded(scene, kind, data, options);
        }
        Box::pin(async move {
            let payload = OperationPayload::Create(CreatePayload {
                scene_id: Some(scene.clone()),
                data,
                options: RpcOptions::pick(&options),
            });
            self.delegation.apply(scene, payload, Vec::new).await
        })
    }

    fn update_embedded<'a>(
        &'a self,
        scene: &'a SceneId,
        kind: &'a str,
        updates: Vec<DocumentData>,
        options: DocumentData,
    ) -> BoxFuture<'a, SurrogateResult<Vec<TileDocument>>> {
        if !self.applies(scene, kind) {
            return self.inner.update_embedded(scene, kind, updates, options);
        }
        Box::pin(async move {
            let payload = UpdateManyPayload {
                scene_id: Some(scene.clone()),
                updates,
                options: RpcOptions::pick(&options),
            };
            // Entry ids stand in when the delegate reports none; they are
            // caller-supplied, not confirmed by the delegate.
            let fallback = payload.fallback_ids();
            self.delegation
                .apply(scene, OperationPayload::UpdateMany(payload), || fallback)
                .await
        })
    }

    fn delete_embedded<'a>(
        &'a self,
        scene: &'a SceneId,
        kind: &'a str,
        ids: Vec<DocumentId>,
        options: DocumentData,
    ) -> BoxFuture<'a, SurrogateResult<Vec<TileDocument>>> {
        if !self.applies(scene, kind) {
            return self.inner.delete_embedded(scene, kind, ids, options);
        }
        Box::pin(async move {
            // Captured before the deletion replicates away
            let originals = resolve_present(self.delegation.replica.as_ref(), scene, &ids);
            let payload = OperationPayload::DeleteMany(DeleteManyPayload {
                scene_id: Some(scene.clone()),
                ids,
                options: RpcOptions::pick(&options),
            });
            self.delegation.apply(scene, payload, Vec::new).await?;
            Ok(originals)
        })
    }
}

/// Tile layer capabilities, opened for non-elevated participants while the
/// feature is on. Never turns an original `true` into `false`.
pub struct DelegatingLayer {
    inner: Arc<dyn TileLayerCapabilities>,
    gate: CapabilityGate,
}

impl DelegatingLayer {
    pub fn new(inner: Arc<dyn TileLayerCapabilities>, gate: CapabilityGate) -> Self {
        DelegatingLayer { inner, gate }
    }
}

impl TileLayerCapabilities for DelegatingLayer {
    fn can_drag_create(&self) -> bool {
        self.inner.can_drag_create() || self.gate.layer_open()
    }

    fn can_create(&self) -> bool {
        self.inner.can_create() || self.gate.layer_open()
    }

    fn can_control(&self) -> bool {
        self.inner.can_control() || self.gate.layer_open()
    }
}

//! Host stand-ins for the non-delegated path
//!
//! `DirectTiles` behaves like the host's own tile operations: elevated
//! participants mutate the authoritative store, everyone else is refused.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use surrogate_core::{
    BoxFuture, DocumentData, DocumentId, LayerOptions, ModifyAction, Participant,
    PermissionLevel, SceneEmbeddedHandler, SceneId, SessionContext, SurrogateError,
    SurrogateResult, TileDocument, TileDocumentHandler, TileLayerCapabilities, ID_FIELD,
    TILE_KIND,
};
use surrogate_state::SceneStore;

/// Host tile operations without delegation
pub struct DirectTiles {
    session: Arc<dyn SessionContext>,
    store: Arc<dyn SceneStore>,
}

impl DirectTiles {
    pub fn new(session: Arc<dyn SessionContext>, store: Arc<dyn SceneStore>) -> Self {
        DirectTiles { session, store }
    }

    fn require_elevated(&self, action: &'static str) -> SurrogateResult<()> {
        if self.session.local().elevated {
            Ok(())
        } else {
            Err(SurrogateError::PermissionDenied(action))
        }
    }

    fn require_tiles(kind: &str) -> SurrogateResult<()> {
        if kind == TILE_KIND {
            Ok(())
        } else {
            Err(SurrogateError::InvalidPayload(format!("unsupported embedded kind {}", kind)))
        }
    }
}

impl TileDocumentHandler for DirectTiles {
    fn create<'a>(
        &'a self,
        scene: &'a SceneId,
        data: DocumentData,
        options: DocumentData,
    ) -> BoxFuture<'a, SurrogateResult<Option<TileDocument>>> {
        Box::pin(async move {
            self.require_elevated("create")?;
            let created = self.store.create_tiles(scene, vec![data], &options)?;
            Ok(created.into_iter().next())
        })
    }

    fn update<'a>(
        &'a self,
        tile: &'a TileDocument,
        mut changes: DocumentData,
        options: DocumentData,
    ) -> BoxFuture<'a, SurrogateResult<TileDocument>> {
        Box::pin(async move {
            self.require_elevated("update")?;
            changes.insert(ID_FIELD.to_string(), Value::String(tile.id.as_str().to_string()));
            let updated = self.store.update_tiles(&tile.scene_id, vec![changes], &options)?;
            updated.into_iter().next().ok_or(SurrogateError::TileNotFound)
        })
    }

    fn delete<'a>(
        &'a self,
        tile: &'a TileDocument,
        options: DocumentData,
    ) -> BoxFuture<'a, SurrogateResult<TileDocument>> {
        Box::pin(async move {
            self.require_elevated("delete")?;
            self.store
                .delete_tiles(&tile.scene_id, std::slice::from_ref(&tile.id), &options)?;
            Ok(tile.clone())
        })
    }

    fn can_user_create(&self, user: &Participant, _scene: &SceneId, _data: &DocumentData) -> bool {
        user.elevated
    }

    fn can_user_modify(&self, user: &Participant, _tile: &TileDocument, _action: ModifyAction) -> bool {
        user.elevated
    }

    fn test_user_permission(
        &self,
        user: &Participant,
        _tile: &TileDocument,
        _permission: PermissionLevel,
    ) -> bool {
        user.elevated
    }
}

impl SceneEmbeddedHandler for DirectTiles {
    fn create_embedded<'a>(
        &'a self,
        scene: &'a SceneId,
        kind: &'a str,
        data: Vec<DocumentData>,
        options: DocumentData,
    ) -> BoxFuture<'a, SurrogateResult<Vec<TileDocument>>> {
        Box::pin(async move {
            self.require_elevated("create")?;
            Self::require_tiles(kind)?;
            self.store.create_tiles(scene, data, &options)
        })
    }

    fn update_embedded<'a>(
        &'a self,
        scene: &'a SceneId,
        kind: &'a str,
        updates: Vec<DocumentData>,
        options: DocumentData,
    ) -> BoxFuture<'a, SurrogateResult<Vec<TileDocument>>> {
        Box::pin(async move {
            self.require_elevated("update")?;
            Self::require_tiles(kind)?;
            self.store.update_tiles(scene, updates, &options)
        })
    }

    fn delete_embedded<'a>(
        &'a self,
        scene: &'a SceneId,
        kind: &'a str,
        ids: Vec<DocumentId>,
        options: DocumentData,
    ) -> BoxFuture<'a, SurrogateResult<Vec<TileDocument>>> {
        Box::pin(async move {
            self.require_elevated("delete")?;
            Self::require_tiles(kind)?;
            let originals: Vec<TileDocument> =
                ids.iter().filter_map(|id| self.store.get_tile(scene, id)).collect();
            self.store.delete_tiles(scene, &ids, &options)?;
            Ok(originals)
        })
    }
}

/// Layer capabilities fixed at construction (true for elevated hosts)
pub struct StaticLayer(pub bool);

impl TileLayerCapabilities for StaticLayer {
    fn can_drag_create(&self) -> bool {
        self.0
    }

    fn can_create(&self) -> bool {
        self.0
    }

    fn can_control(&self) -> bool {
        self.0
    }
}

/// Records every layer option refresh
#[derive(Debug, Default)]
pub struct RecordingLayerOptions {
    calls: Mutex<Vec<bool>>,
}

impl RecordingLayerOptions {
    pub fn calls(&self) -> Vec<bool> {
        self.calls.lock().clone()
    }

    pub fn last(&self) -> Option<bool> {
        self.calls.lock().last().copied()
    }
}

impl LayerOptions for RecordingLayerOptions {
    fn refresh(&self, allow: bool) {
        self.calls.lock().push(allow);
    }
}

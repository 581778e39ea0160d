//! Scene tile stores

use std::collections::HashMap;

use parking_lot::RwLock;
use tokio::sync::broadcast;

use surrogate_core::{
    document_id_of, DocumentData, DocumentId, SceneId, SurrogateError, SurrogateResult,
    TileDocument,
};

/// Change feed capacity before slow replicas start lagging
pub const CHANGE_FEED_CAPACITY: usize = 1024;

/// Lookup-by-identifier on a scene's tile collection
pub trait TileLookup: Send + Sync {
    fn get_tile(&self, scene: &SceneId, id: &DocumentId) -> Option<TileDocument>;
}

/// Backing store for tiles, scoped per scene.
///
/// Each document-level operation is atomic; a batch is not.
pub trait SceneStore: TileLookup {
    fn has_scene(&self, scene: &SceneId) -> bool;

    /// Insert documents; returns them with their assigned identifiers
    fn create_tiles(
        &self,
        scene: &SceneId,
        data: Vec<DocumentData>,
        options: &DocumentData,
    ) -> SurrogateResult<Vec<TileDocument>>;

    /// Apply each update to the tile named by its `_id`/`id`
    fn update_tiles(
        &self,
        scene: &SceneId,
        updates: Vec<DocumentData>,
        options: &DocumentData,
    ) -> SurrogateResult<Vec<TileDocument>>;

    /// Remove tiles; returns the removed identifiers
    fn delete_tiles(
        &self,
        scene: &SceneId,
        ids: &[DocumentId],
        options: &DocumentData,
    ) -> SurrogateResult<Vec<DocumentId>>;
}

/// One applied mutation, as published on the change feed
#[derive(Clone, Debug, PartialEq)]
pub enum StoreChange {
    SceneAdded(SceneId),
    Upserted(TileDocument),
    Deleted { scene: SceneId, id: DocumentId },
}

/// In-memory scene store
pub struct MemoryScenes {
    scenes: RwLock<HashMap<SceneId, HashMap<DocumentId, TileDocument>>>,
    changes: broadcast::Sender<StoreChange>,
}

impl MemoryScenes {
    pub fn new() -> Self {
        let (changes, _rx) = broadcast::channel(CHANGE_FEED_CAPACITY);
        MemoryScenes {
            scenes: RwLock::new(HashMap::new()),
            changes,
        }
    }

    pub fn with_scenes<I, S>(scenes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SceneId>,
    {
        let store = Self::new();
        for scene in scenes {
            store.add_scene(scene.into());
        }
        store
    }

    pub fn add_scene(&self, scene: SceneId) {
        self.scenes.write().entry(scene.clone()).or_default();
        self.publish(StoreChange::SceneAdded(scene));
    }

    /// Subscribe to mutations applied from now on
    pub fn changes(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }

    /// Apply a replicated change without validation
    pub fn apply(&self, change: StoreChange) {
        {
            let mut scenes = self.scenes.write();
            match &change {
                StoreChange::SceneAdded(scene) => {
                    scenes.entry(scene.clone()).or_default();
                }
                StoreChange::Upserted(tile) => {
                    scenes
                        .entry(tile.scene_id.clone())
                        .or_default()
                        .insert(tile.id.clone(), tile.clone());
                }
                StoreChange::Deleted { scene, id } => {
                    if let Some(tiles) = scenes.get_mut(scene) {
                        tiles.remove(id);
                    }
                }
            }
        }
        self.publish(change);
    }

    pub fn tiles(&self, scene: &SceneId) -> Vec<TileDocument> {
        self.scenes
            .read()
            .get(scene)
            .map(|tiles| tiles.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn tile_count(&self, scene: &SceneId) -> usize {
        self.scenes.read().get(scene).map_or(0, HashMap::len)
    }

    fn publish(&self, change: StoreChange) {
        // No subscribers is fine
        let _ = self.changes.send(change);
    }
}

impl Default for MemoryScenes {
    fn default() -> Self {
        Self::new()
    }
}

impl TileLookup for MemoryScenes {
    fn get_tile(&self, scene: &SceneId, id: &DocumentId) -> Option<TileDocument> {
        self.scenes.read().get(scene)?.get(id).cloned()
    }
}

impl SceneStore for MemoryScenes {
    fn has_scene(&self, scene: &SceneId) -> bool {
        self.scenes.read().contains_key(scene)
    }

    fn create_tiles(
        &self,
        scene: &SceneId,
        data: Vec<DocumentData>,
        _options: &DocumentData,
    ) -> SurrogateResult<Vec<TileDocument>> {
        let mut created = Vec::with_capacity(data.len());
        for fields in data {
            let tile = TileDocument::new(DocumentId::generate(), scene.clone(), fields);
            {
                let mut scenes = self.scenes.write();
                let tiles = scenes.get_mut(scene).ok_or(SurrogateError::SceneNotFound)?;
                tiles.insert(tile.id.clone(), tile.clone());
            }
            self.publish(StoreChange::Upserted(tile.clone()));
            created.push(tile);
        }
        Ok(created)
    }

    fn update_tiles(
        &self,
        scene: &SceneId,
        updates: Vec<DocumentData>,
        _options: &DocumentData,
    ) -> SurrogateResult<Vec<TileDocument>> {
        let mut updated = Vec::with_capacity(updates.len());
        for changes in updates {
            let id = document_id_of(&changes).ok_or_else(|| {
                SurrogateError::InvalidPayload("update entry without _id".to_string())
            })?;
            let tile = {
                let mut scenes = self.scenes.write();
                let tiles = scenes.get_mut(scene).ok_or(SurrogateError::SceneNotFound)?;
                let tile = tiles.get_mut(&id).ok_or(SurrogateError::TileNotFound)?;
                tile.apply_changes(&changes);
                tile.clone()
            };
            self.publish(StoreChange::Upserted(tile.clone()));
            updated.push(tile);
        }
        Ok(updated)
    }

    fn delete_tiles(
        &self,
        scene: &SceneId,
        ids: &[DocumentId],
        _options: &DocumentData,
    ) -> SurrogateResult<Vec<DocumentId>> {
        let mut deleted = Vec::with_capacity(ids.len());
        for id in ids {
            {
                let mut scenes = self.scenes.write();
                let tiles = scenes.get_mut(scene).ok_or(SurrogateError::SceneNotFound)?;
                tiles.remove(id).ok_or(SurrogateError::TileNotFound)?;
            }
            self.publish(StoreChange::Deleted {
                scene: scene.clone(),
                id: id.clone(),
            });
            deleted.push(id.clone());
        }
        Ok(deleted)
    }
}

//! Host entry points
//!
//! The host exposes tile operations, scene-embedded batch operations and
//! tile-layer capability checks through these traits. `HostHooks` is the
//! host's table of the currently installed implementations; the
//! interception layer replaces entries in it exactly once.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::{DocumentData, DocumentId, Participant, SceneId, SurrogateResult, TileDocument};

/// Boxed, sendable future used by the object-safe host traits
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Action checked by `can_user_modify`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifyAction {
    Update,
    Delete,
}

/// Ownership level checked by `test_user_permission`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PermissionLevel {
    None,
    Limited,
    Observer,
    Owner,
}

/// Single-document tile operations and permission predicates
pub trait TileDocumentHandler: Send + Sync {
    /// Create one tile in `scene`; `None` when nothing was created
    fn create<'a>(
        &'a self,
        scene: &'a SceneId,
        data: DocumentData,
        options: DocumentData,
    ) -> BoxFuture<'a, SurrogateResult<Option<TileDocument>>>;

    fn update<'a>(
        &'a self,
        tile: &'a TileDocument,
        changes: DocumentData,
        options: DocumentData,
    ) -> BoxFuture<'a, SurrogateResult<TileDocument>>;

    fn delete<'a>(
        &'a self,
        tile: &'a TileDocument,
        options: DocumentData,
    ) -> BoxFuture<'a, SurrogateResult<TileDocument>>;

    fn can_user_create(&self, user: &Participant, scene: &SceneId, data: &DocumentData) -> bool;

    fn can_user_modify(&self, user: &Participant, tile: &TileDocument, action: ModifyAction)
        -> bool;

    fn test_user_permission(
        &self,
        user: &Participant,
        tile: &TileDocument,
        permission: PermissionLevel,
    ) -> bool;
}

/// Batch operations on a scene's embedded collections, addressed by kind
pub trait SceneEmbeddedHandler: Send + Sync {
    fn create_embedded<'a>(
        &'a self,
        scene: &'a SceneId,
        kind: &'a str,
        data: Vec<DocumentData>,
        options: DocumentData,
    ) -> BoxFuture<'a, SurrogateResult<Vec<TileDocument>>>;

    fn update_embedded<'a>(
        &'a self,
        scene: &'a SceneId,
        kind: &'a str,
        updates: Vec<DocumentData>,
        options: DocumentData,
    ) -> BoxFuture<'a, SurrogateResult<Vec<TileDocument>>>;

    fn delete_embedded<'a>(
        &'a self,
        scene: &'a SceneId,
        kind: &'a str,
        ids: Vec<DocumentId>,
        options: DocumentData,
    ) -> BoxFuture<'a, SurrogateResult<Vec<TileDocument>>>;
}

/// Interactive capabilities of the tile layer on the active view
pub trait TileLayerCapabilities: Send + Sync {
    fn can_drag_create(&self) -> bool;
    fn can_create(&self) -> bool;
    fn can_control(&self) -> bool;
}

/// Host hook that re-applies tile layer options and scene controls
pub trait LayerOptions: Send + Sync {
    fn refresh(&self, allow: bool);
}

/// Wrappable entry point groups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryPoint {
    TileDocument,
    SceneEmbedded,
    TileLayer,
}

/// The host's table of installed entry points
pub struct HostHooks {
    tiles: Arc<dyn TileDocumentHandler>,
    embedded: Arc<dyn SceneEmbeddedHandler>,
    layer: Arc<dyn TileLayerCapabilities>,
    wrapped: HashSet<EntryPoint>,
}

impl HostHooks {
    pub fn new(
        tiles: Arc<dyn TileDocumentHandler>,
        embedded: Arc<dyn SceneEmbeddedHandler>,
        layer: Arc<dyn TileLayerCapabilities>,
    ) -> Self {
        HostHooks {
            tiles,
            embedded,
            layer,
            wrapped: HashSet::new(),
        }
    }

    pub fn tiles(&self) -> Arc<dyn TileDocumentHandler> {
        Arc::clone(&self.tiles)
    }

    pub fn embedded(&self) -> Arc<dyn SceneEmbeddedHandler> {
        Arc::clone(&self.embedded)
    }

    pub fn layer(&self) -> Arc<dyn TileLayerCapabilities> {
        Arc::clone(&self.layer)
    }

    pub fn is_wrapped(&self, point: EntryPoint) -> bool {
        self.wrapped.contains(&point)
    }

    /// Replace the tile document handler unless already wrapped.
    /// Returns true if the wrapper was applied.
    pub fn wrap_tiles<F>(&mut self, wrapper: F) -> bool
    where
        F: FnOnce(Arc<dyn TileDocumentHandler>) -> Arc<dyn TileDocumentHandler>,
    {
        if !self.wrapped.insert(EntryPoint::TileDocument) {
            return false;
        }
        self.tiles = wrapper(Arc::clone(&self.tiles));
        true
    }

    pub fn wrap_embedded<F>(&mut self, wrapper: F) -> bool
    where
        F: FnOnce(Arc<dyn SceneEmbeddedHandler>) -> Arc<dyn SceneEmbeddedHandler>,
    {
        if !self.wrapped.insert(EntryPoint::SceneEmbedded) {
            return false;
        }
        self.embedded = wrapper(Arc::clone(&self.embedded));
        true
    }

    pub fn wrap_layer<F>(&mut self, wrapper: F) -> bool
    where
        F: FnOnce(Arc<dyn TileLayerCapabilities>) -> Arc<dyn TileLayerCapabilities>,
    {
        if !self.wrapped.insert(EntryPoint::TileLayer) {
            return false;
        }
        self.layer = wrapper(Arc::clone(&self.layer));
        true
    }
}

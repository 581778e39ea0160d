//! Operation executor - runs delegated operations on the elevated peer

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, warn};

use surrogate_core::{
    DocumentData, FeatureFlag, RequestId, SceneId, SessionContext, SurrogateError,
    SurrogateResult, ID_FIELD,
};
use surrogate_state::SceneStore;
use surrogate_wire::{Operation, OperationPayload, OperationResult, RequestMessage, ResponseMessage};

/// Responses already sent, by request id. Oldest evicted first.
pub struct ServedRequests {
    capacity: usize,
    order: VecDeque<RequestId>,
    responses: HashMap<RequestId, ResponseMessage>,
}

impl ServedRequests {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        ServedRequests {
            capacity,
            order: VecDeque::with_capacity(capacity),
            responses: HashMap::with_capacity(capacity),
        }
    }

    pub fn get(&self, request_id: &RequestId) -> Option<&ResponseMessage> {
        self.responses.get(request_id)
    }

    pub fn insert(&mut self, response: ResponseMessage) {
        let request_id = response.request_id.clone();
        if self.responses.insert(request_id.clone(), response).is_some() {
            return;
        }
        self.order.push_back(request_id);
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.responses.remove(&evicted);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.responses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }
}

/// Elevated-side handler for delegated requests
pub struct OperationExecutor {
    session: Arc<dyn SessionContext>,
    flag: Arc<FeatureFlag>,
    store: Arc<dyn SceneStore>,
    served: Mutex<ServedRequests>,
}

impl OperationExecutor {
    pub fn new(
        session: Arc<dyn SessionContext>,
        flag: Arc<FeatureFlag>,
        store: Arc<dyn SceneStore>,
        served_capacity: usize,
    ) -> Self {
        OperationExecutor {
            session,
            flag,
            store,
            served: Mutex::new(ServedRequests::new(served_capacity)),
        }
    }

    /// Produce the response for a request addressed to this participant.
    ///
    /// `None` when the request is not ours to answer (local participant not
    /// elevated, or a different delegate was targeted). Never fails: every
    /// error becomes a failure response.
    pub fn handle_request(&self, request: &RequestMessage) -> Option<ResponseMessage> {
        let local = self.session.local();
        if !local.elevated || request.target_gm != local.id {
            return None;
        }

        if let Some(cached) = self.served.lock().get(&request.request_id) {
            debug!(
                request_id = %request.request_id,
                "Duplicate request, replaying served response"
            );
            return Some(cached.clone());
        }

        let response = match self.execute(&request.op, request.payload.clone()) {
            Ok(result) => {
                debug!(
                    request_id = %request.request_id,
                    op = %request.op,
                    sender = %request.sender_id,
                    "Executed delegated operation"
                );
                request.reply_ok(result)
            }
            Err(err) => {
                warn!(
                    request_id = %request.request_id,
                    op = %request.op,
                    sender = %request.sender_id,
                    error = %err,
                    "Delegated operation failed"
                );
                request.reply_err(err.to_string())
            }
        };

        self.served.lock().insert(response.clone());
        Some(response)
    }

    /// Run one operation against the store; result is `{documentIds: [...]}`
    pub fn execute(&self, op: &str, payload: Value) -> SurrogateResult<Value> {
        if !self.flag.enabled() {
            return Err(SurrogateError::Disabled);
        }

        let op: Operation = op.parse()?;
        let ids = match OperationPayload::parse(op, payload)? {
            OperationPayload::Create(p) => {
                let scene = self.scene(p.scene_id)?;
                self.store
                    .create_tiles(&scene, p.data, p.options.as_map())?
                    .into_iter()
                    .map(|tile| tile.id)
                    .collect()
            }
            OperationPayload::UpdateMany(p) => {
                let scene = self.scene(p.scene_id)?;
                self.store
                    .update_tiles(&scene, p.updates, p.options.as_map())?
                    .into_iter()
                    .map(|tile| tile.id)
                    .collect()
            }
            OperationPayload::DeleteMany(p) => {
                let scene = self.scene(p.scene_id)?;
                self.store.delete_tiles(&scene, &p.ids, p.options.as_map())?;
                p.ids
            }
            OperationPayload::Update(p) => {
                let scene = self.scene(p.scene_id)?;
                let tile = p
                    .document_id
                    .and_then(|id| self.store.get_tile(&scene, &id))
                    .ok_or(SurrogateError::TileNotFound)?;

                let mut entry: DocumentData = p.changes;
                entry.insert(ID_FIELD.to_string(), Value::String(tile.id.as_str().to_string()));
                let updated = self.store.update_tiles(&scene, vec![entry], p.options.as_map())?;
                vec![updated.into_iter().next().map_or(tile.id, |t| t.id)]
            }
            OperationPayload::Delete(p) => {
                let scene = self.scene(p.scene_id)?;
                let tile = p
                    .document_id
                    .and_then(|id| self.store.get_tile(&scene, &id))
                    .ok_or(SurrogateError::TileNotFound)?;
                self.store
                    .delete_tiles(&scene, std::slice::from_ref(&tile.id), p.options.as_map())?;
                vec![tile.id]
            }
        };

        OperationResult::with_ids(ids).to_value()
    }

    pub fn served_count(&self) -> usize {
        self.served.lock().len()
    }

    fn scene(&self, scene: Option<SceneId>) -> SurrogateResult<SceneId> {
        scene
            .filter(|scene| self.store.has_scene(scene))
            .ok_or(SurrogateError::SceneNotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use surrogate_core::{LocalSession, Participant, Roster, TileDocument};
    use surrogate_state::{MemoryScenes, TileLookup};
    use surrogate_wire::Envelope;

    struct Fixture {
        store: Arc<MemoryScenes>,
        flag: Arc<FeatureFlag>,
        executor: OperationExecutor,
    }

    fn fixture(local: &str) -> Fixture {
        let roster = Arc::new(Roster::new(vec![
            Participant::elevated("gm"),
            Participant::elevated("gm-2"),
            Participant::player("p1"),
        ]));
        let session = Arc::new(LocalSession::new(local, roster));
        let flag = Arc::new(FeatureFlag::delegation());
        flag.set(true);
        let store = Arc::new(MemoryScenes::with_scenes(["S1"]));
        let executor = OperationExecutor::new(session, flag.clone(), store.clone(), 4);
        Fixture { store, flag, executor }
    }

    fn request(id: &str, target: &str, op: &str, payload: Value) -> RequestMessage {
        RequestMessage::new(id.into(), "p1".into(), target.into(), op, payload)
    }

    fn seed(store: &MemoryScenes) -> TileDocument {
        store
            .create_tiles(
                &"S1".into(),
                vec![json!({"x": 1}).as_object().cloned().unwrap()],
                &DocumentData::new(),
            )
            .unwrap()
            .remove(0)
    }

    fn ids(response: &ResponseMessage) -> Vec<String> {
        serde_json::from_value(response.result.as_ref().unwrap()["documentIds"].clone()).unwrap()
    }

    #[test]
    fn test_only_targeted_elevated_peer_answers() {
        let f = fixture("gm");
        let payload = json!({"sceneId": "S1", "data": [{}]});
        assert!(f.executor.handle_request(&request("r1", "gm-2", "tile.create", payload.clone())).is_none());

        let player = fixture("p1");
        assert!(player.executor.handle_request(&request("r1", "p1", "tile.create", payload)).is_none());
        assert_eq!(player.store.tile_count(&"S1".into()), 0);
    }

    #[test]
    fn test_create_reports_new_ids() {
        let f = fixture("gm");
        let response = f
            .executor
            .handle_request(&request(
                "r1",
                "gm",
                "tile.create",
                json!({"sceneId": "S1", "data": [{"x": 1}, {"x": 2}], "options": {"render": false}}),
            ))
            .unwrap();

        assert!(response.ok);
        assert_eq!(response.recipient_id.as_str(), "p1");
        let created = ids(&response);
        assert_eq!(created.len(), 2);
        for id in &created {
            assert!(f.store.get_tile(&"S1".into(), &id.as_str().into()).is_some());
        }
    }

    #[test]
    fn test_update_and_delete_single() {
        let f = fixture("gm");
        let tile = seed(&f.store);

        let response = f
            .executor
            .handle_request(&request(
                "r1",
                "gm",
                "tile.update",
                json!({"sceneId": "S1", "documentId": tile.id.as_str(), "changes": {"x": 9}}),
            ))
            .unwrap();
        assert_eq!(ids(&response), vec![tile.id.as_str().to_string()]);
        assert_eq!(f.store.get_tile(&"S1".into(), &tile.id).unwrap().get("x"), Some(&json!(9)));

        let response = f
            .executor
            .handle_request(&request(
                "r2",
                "gm",
                "tile.delete",
                json!({"sceneId": "S1", "documentId": tile.id.as_str()}),
            ))
            .unwrap();
        assert_eq!(ids(&response), vec![tile.id.as_str().to_string()]);
        assert!(f.store.get_tile(&"S1".into(), &tile.id).is_none());
    }

    #[test]
    fn test_batch_operations() {
        let f = fixture("gm");
        let a = seed(&f.store);
        let b = seed(&f.store);

        let response = f
            .executor
            .handle_request(&request(
                "r1",
                "gm",
                "tile.updateMany",
                json!({"sceneId": "S1", "updates": [{"_id": a.id.as_str(), "x": 5}, {"id": b.id.as_str(), "x": 6}]}),
            ))
            .unwrap();
        assert_eq!(ids(&response), vec![a.id.as_str().to_string(), b.id.as_str().to_string()]);

        let response = f
            .executor
            .handle_request(&request(
                "r2",
                "gm",
                "tile.deleteMany",
                json!({"sceneId": "S1", "ids": [a.id.as_str(), b.id.as_str()]}),
            ))
            .unwrap();
        assert!(response.ok);
        assert_eq!(ids(&response).len(), 2);
        assert_eq!(f.store.tile_count(&"S1".into()), 0);
    }

    #[test]
    fn test_failures_become_responses() {
        let f = fixture("gm");
        let cases = [
            ("tile.create", json!({"sceneId": "S9", "data": [{}]}), "Scene not found."),
            ("tile.create", json!({"data": [{}]}), "Scene not found."),
            ("tile.update", json!({"sceneId": "S1", "documentId": "ghost"}), "Tile not found."),
            ("tile.delete", json!({"sceneId": "S1"}), "Tile not found."),
            ("tile.explode", json!({"sceneId": "S1"}), "Unknown operation: tile.explode"),
        ];
        for (n, (op, payload, expected)) in cases.into_iter().enumerate() {
            let response = f
                .executor
                .handle_request(&request(&format!("r{}", n), "gm", op, payload))
                .unwrap();
            assert!(!response.ok, "{}", op);
            assert_eq!(response.error.as_deref(), Some(expected));
            assert!(response.result.is_none());
        }
    }

    #[test]
    fn test_disabled_feature() {
        let f = fixture("gm");
        f.flag.set(false);
        let response = f
            .executor
            .handle_request(&request("r1", "gm", "tile.create", json!({"sceneId": "S1", "data": [{}]})))
            .unwrap();
        assert_eq!(response.error.as_deref(), Some("Player tile editing is disabled by the GM."));
        assert_eq!(f.store.tile_count(&"S1".into()), 0);
    }

    #[test]
    fn test_duplicate_request_is_consumed_once() {
        let f = fixture("gm");
        let message = request("r1", "gm", "tile.create", json!({"sceneId": "S1", "data": [{}]}));

        let first = f.executor.handle_request(&message).unwrap();
        let second = f.executor.handle_request(&message).unwrap();
        assert_eq!(first, second);
        assert_eq!(f.store.tile_count(&"S1".into()), 1);
        assert_eq!(f.executor.served_count(), 1);
    }

    #[test]
    fn test_served_cache_evicts_oldest() {
        let mut served = ServedRequests::new(2);
        for id in ["a", "b", "c"] {
            let message = request(id, "gm", "tile.create", json!({}));
            served.insert(message.reply_ok(json!({})));
        }
        assert_eq!(served.len(), 2);
        assert!(served.get(&"a".into()).is_none());
        assert!(served.get(&"c".into()).is_some());
    }

    #[test]
    fn test_response_wire_shape() {
        let f = fixture("gm");
        let response = f
            .executor
            .handle_request(&request("r1", "gm", "tile.nope", json!({})))
            .unwrap();
        let wire = Envelope::from(response).encode().unwrap();
        assert_eq!(
            wire,
            json!({
                "v": 1,
                "action": "response",
                "requestId": "r1",
                "recipientId": "p1",
                "ok": false,
                "error": "Unknown operation: tile.nope"
            })
        );
    }
}

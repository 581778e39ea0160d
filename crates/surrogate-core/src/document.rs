//! Tile documents - the spatial overlay objects on a scene canvas

use serde_json::{Map, Value};

use crate::{DocumentId, SceneId};

/// Document field data as the host stores it
pub type DocumentData = Map<String, Value>;

/// Embedded document kind that the delegation subsystem handles
pub const TILE_KIND: &str = "Tile";

/// Key under which a document carries its own identifier
pub const ID_FIELD: &str = "_id";

/// A tile living in one scene's embedded collection
#[derive(Clone, Debug, PartialEq)]
pub struct TileDocument {
    pub id: DocumentId,
    /// Parent scene
    pub scene_id: SceneId,
    pub data: DocumentData,
}

impl TileDocument {
    pub fn new(id: DocumentId, scene_id: SceneId, mut data: DocumentData) -> Self {
        data.insert(ID_FIELD.to_string(), Value::String(id.0.clone()));
        TileDocument { id, scene_id, data }
    }

    /// Read a field
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Shallow merge of changes; the identifier field is never overwritten
    pub fn apply_changes(&mut self, changes: &DocumentData) {
        for (key, value) in changes {
            if key == ID_FIELD || key == "id" {
                continue;
            }
            self.data.insert(key.clone(), value.clone());
        }
    }
}

/// Identifier carried by an update entry (`_id`, falling back to `id`)
pub fn document_id_of(data: &DocumentData) -> Option<DocumentId> {
    data.get(ID_FIELD)
        .or_else(|| data.get("id"))
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(DocumentId::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(value: Value) -> DocumentData {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_new_tile_stamps_id_field() {
        let tile = TileDocument::new("T1".into(), "S1".into(), data(json!({"x": 1})));
        assert_eq!(tile.get(ID_FIELD), Some(&json!("T1")));
        assert_eq!(tile.get("x"), Some(&json!(1)));
    }

    #[test]
    fn test_apply_changes_keeps_identity() {
        let mut tile = TileDocument::new("T1".into(), "S1".into(), data(json!({"x": 1, "y": 2})));
        tile.apply_changes(&data(json!({"_id": "other", "x": 10, "hidden": true})));

        assert_eq!(tile.id, DocumentId::new("T1"));
        assert_eq!(tile.get(ID_FIELD), Some(&json!("T1")));
        assert_eq!(tile.get("x"), Some(&json!(10)));
        assert_eq!(tile.get("y"), Some(&json!(2)));
        assert_eq!(tile.get("hidden"), Some(&json!(true)));
    }

    #[test]
    fn test_document_id_of_prefers_underscore_id() {
        assert_eq!(
            document_id_of(&data(json!({"_id": "A", "id": "B"}))),
            Some(DocumentId::new("A"))
        );
        assert_eq!(
            document_id_of(&data(json!({"id": "B"}))),
            Some(DocumentId::new("B"))
        );
        assert_eq!(document_id_of(&data(json!({"_id": ""}))), None);
        assert_eq!(document_id_of(&data(json!({"x": 1}))), None);
    }
}

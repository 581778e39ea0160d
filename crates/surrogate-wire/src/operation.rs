//! Delegated operations and their payloads

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use surrogate_core::{
    document_id_of, DocumentData, DocumentId, SceneId, SurrogateError, SurrogateResult,
};

use crate::RpcOptions;

/// Fixed set of operations an elevated peer executes on request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Update,
    UpdateMany,
    Delete,
    DeleteMany,
}

impl Operation {
    pub const ALL: [Operation; 5] = [
        Operation::Create,
        Operation::Update,
        Operation::UpdateMany,
        Operation::Delete,
        Operation::DeleteMany,
    ];

    /// Wire name
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Create => "tile.create",
            Operation::Update => "tile.update",
            Operation::UpdateMany => "tile.updateMany",
            Operation::Delete => "tile.delete",
            Operation::DeleteMany => "tile.deleteMany",
        }
    }

    /// Whether the caller must wait for replicated documents afterwards
    pub fn needs_reconciliation(self) -> bool {
        !matches!(self, Operation::Delete | Operation::DeleteMany)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = SurrogateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| SurrogateError::UnknownOperation(s.to_string()))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePayload {
    #[serde(default)]
    pub scene_id: Option<SceneId>,
    #[serde(default)]
    pub data: Vec<DocumentData>,
    #[serde(default)]
    pub options: RpcOptions,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePayload {
    #[serde(default)]
    pub scene_id: Option<SceneId>,
    #[serde(default)]
    pub document_id: Option<DocumentId>,
    #[serde(default)]
    pub changes: DocumentData,
    #[serde(default)]
    pub options: RpcOptions,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateManyPayload {
    #[serde(default)]
    pub scene_id: Option<SceneId>,
    #[serde(default)]
    pub updates: Vec<DocumentData>,
    #[serde(default)]
    pub options: RpcOptions,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletePayload {
    #[serde(default)]
    pub scene_id: Option<SceneId>,
    #[serde(default)]
    pub document_id: Option<DocumentId>,
    #[serde(default)]
    pub options: RpcOptions,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteManyPayload {
    #[serde(default)]
    pub scene_id: Option<SceneId>,
    #[serde(default)]
    pub ids: Vec<DocumentId>,
    #[serde(default)]
    pub options: RpcOptions,
}

impl UpdateManyPayload {
    /// Identifiers named by the update entries themselves
    pub fn fallback_ids(&self) -> Vec<DocumentId> {
        self.updates.iter().filter_map(document_id_of).collect()
    }
}

/// Typed payload for one delegated operation
#[derive(Clone, Debug, PartialEq)]
pub enum OperationPayload {
    Create(CreatePayload),
    Update(UpdatePayload),
    UpdateMany(UpdateManyPayload),
    Delete(DeletePayload),
    DeleteMany(DeleteManyPayload),
}

impl OperationPayload {
    pub fn operation(&self) -> Operation {
        match self {
            OperationPayload::Create(_) => Operation::Create,
            OperationPayload::Update(_) => Operation::Update,
            OperationPayload::UpdateMany(_) => Operation::UpdateMany,
            OperationPayload::Delete(_) => Operation::Delete,
            OperationPayload::DeleteMany(_) => Operation::DeleteMany,
        }
    }

    pub fn scene_id(&self) -> Option<&SceneId> {
        match self {
            OperationPayload::Create(p) => p.scene_id.as_ref(),
            OperationPayload::Update(p) => p.scene_id.as_ref(),
            OperationPayload::UpdateMany(p) => p.scene_id.as_ref(),
            OperationPayload::Delete(p) => p.scene_id.as_ref(),
            OperationPayload::DeleteMany(p) => p.scene_id.as_ref(),
        }
    }

    /// Parse the payload of a received request
    pub fn parse(op: Operation, payload: Value) -> SurrogateResult<Self> {
        let invalid = |e: serde_json::Error| SurrogateError::InvalidPayload(e.to_string());
        // A missing payload behaves like an empty object.
        let payload = match payload {
            Value::Null => Value::Object(DocumentData::new()),
            other => other,
        };
        Ok(match op {
            Operation::Create => {
                OperationPayload::Create(serde_json::from_value(payload).map_err(invalid)?)
            }
            Operation::Update => {
                OperationPayload::Update(serde_json::from_value(payload).map_err(invalid)?)
            }
            Operation::UpdateMany => {
                OperationPayload::UpdateMany(serde_json::from_value(payload).map_err(invalid)?)
            }
            Operation::Delete => {
                OperationPayload::Delete(serde_json::from_value(payload).map_err(invalid)?)
            }
            Operation::DeleteMany => {
                OperationPayload::DeleteMany(serde_json::from_value(payload).map_err(invalid)?)
            }
        })
    }

    pub fn to_value(&self) -> SurrogateResult<Value> {
        let value = match self {
            OperationPayload::Create(p) => serde_json::to_value(p)?,
            OperationPayload::Update(p) => serde_json::to_value(p)?,
            OperationPayload::UpdateMany(p) => serde_json::to_value(p)?,
            OperationPayload::Delete(p) => serde_json::to_value(p)?,
            OperationPayload::DeleteMany(p) => serde_json::to_value(p)?,
        };
        Ok(value)
    }
}

/// Success result of every operation: `{documentIds: [...]}`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_ids: Option<Vec<DocumentId>>,
}

impl OperationResult {
    pub fn with_ids(ids: Vec<DocumentId>) -> Self {
        OperationResult {
            document_ids: Some(ids),
        }
    }

    /// Read a relay result; anything unreadable counts as "no ids reported"
    pub fn from_value(value: &Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or_default()
    }

    pub fn to_value(&self) -> SurrogateResult<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Reported ids, or `fallback` when the response omitted them
    pub fn ids_or(self, fallback: impl FnOnce() -> Vec<DocumentId>) -> Vec<DocumentId> {
        self.document_ids.unwrap_or_else(fallback)
    }
}

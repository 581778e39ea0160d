//! Request/response envelope
//!
//! ```text
//! request:  {v:1, action:"request",  requestId, senderId, targetGM, op, payload}
//! response: {v:1, action:"response", requestId, recipientId, ok, result?, error?}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use surrogate_core::{ParticipantId, RequestId, SurrogateError, SurrogateResult};

/// Envelope version written into every message
pub const PROTOCOL_VERSION: u8 = 1;

/// One message on the broadcast event
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum Envelope {
    Request(RequestMessage),
    Response(ResponseMessage),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestMessage {
    pub v: u8,
    pub request_id: RequestId,
    pub sender_id: ParticipantId,
    /// Elected elevated peer that must execute the request
    #[serde(rename = "targetGM")]
    pub target_gm: ParticipantId,
    pub op: String,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMessage {
    pub v: u8,
    pub request_id: RequestId,
    pub recipient_id: ParticipantId,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RequestMessage {
    pub fn new(
        request_id: RequestId,
        sender_id: ParticipantId,
        target_gm: ParticipantId,
        op: impl Into<String>,
        payload: Value,
    ) -> Self {
        RequestMessage {
            v: PROTOCOL_VERSION,
            request_id,
            sender_id,
            target_gm,
            op: op.into(),
            payload,
        }
    }

    /// Build the success response addressed back to the sender
    pub fn reply_ok(&self, result: Value) -> ResponseMessage {
        ResponseMessage {
            v: PROTOCOL_VERSION,
            request_id: self.request_id.clone(),
            recipient_id: self.sender_id.clone(),
            ok: true,
            result: Some(result),
            error: None,
        }
    }

    /// Build the failure response addressed back to the sender
    pub fn reply_err(&self, error: impl Into<String>) -> ResponseMessage {
        ResponseMessage {
            v: PROTOCOL_VERSION,
            request_id: self.request_id.clone(),
            recipient_id: self.sender_id.clone(),
            ok: false,
            result: None,
            error: Some(error.into()),
        }
    }
}

impl ResponseMessage {
    /// Settlement value for the waiting caller
    pub fn into_outcome(self) -> SurrogateResult<Value> {
        if self.ok {
            Ok(self.result.unwrap_or(Value::Null))
        } else {
            Err(SurrogateError::RemoteOperation(
                self.error.unwrap_or_else(|| "GM request failed.".to_string()),
            ))
        }
    }
}

impl Envelope {
    /// Decode a received message; rejects foreign versions
    pub fn decode(value: Value) -> SurrogateResult<Self> {
        let envelope: Envelope = serde_json::from_value(value)?;
        let v = match &envelope {
            Envelope::Request(m) => m.v,
            Envelope::Response(m) => m.v,
        };
        if v != PROTOCOL_VERSION {
            return Err(SurrogateError::Codec(format!(
                "unsupported envelope version {}",
                v
            )));
        }
        Ok(envelope)
    }

    pub fn encode(&self) -> SurrogateResult<Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn request_id(&self) -> &RequestId {
        match self {
            Envelope::Request(m) => &m.request_id,
            Envelope::Response(m) => &m.request_id,
        }
    }
}

impl From<RequestMessage> for Envelope {
    fn from(message: RequestMessage) -> Self {
        Envelope::Request(message)
    }
}

impl From<ResponseMessage> for Envelope {
    fn from(message: ResponseMessage) -> Self {
        Envelope::Response(message)
    }
}

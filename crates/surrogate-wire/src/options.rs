//! Secondary option whitelist

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use surrogate_core::DocumentData;

/// Option keys that may cross the wire
pub const FORWARDED_OPTION_KEYS: [&str; 5] = ["animate", "diff", "render", "recursive", "noHook"];

/// Operation options restricted to the forwarded keys.
/// Filtered on construction and again on deserialization.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RpcOptions(DocumentData);

impl RpcOptions {
    /// Keep only whitelisted keys
    pub fn pick(options: &DocumentData) -> Self {
        let picked = FORWARDED_OPTION_KEYS
            .iter()
            .filter_map(|key| options.get(*key).map(|v| (key.to_string(), v.clone())))
            .collect();
        RpcOptions(picked)
    }

    /// Non-object values yield empty options
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Object(map) => Self::pick(map),
            _ => RpcOptions::default(),
        }
    }

    pub fn as_map(&self) -> &DocumentData {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for RpcOptions {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for RpcOptions {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(RpcOptions::from_value(&value))
    }
}

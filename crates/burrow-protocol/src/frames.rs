use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Server → browser push event.
/// Wire: `{ "type": "event", "event": "traffic", "payload": {...}, "seq": 42 }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventFrame {
    #[serde(rename = "type")]
    pub frame_type: String,
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
}

impl EventFrame {
    pub fn new(event: impl Into<String>, payload: impl Serialize) -> Self {
        Self {
            frame_type: "event".to_string(),
            event: event.into(),
            payload: Some(serde_json::to_value(payload).unwrap_or(Value::Null)),
            seq: None,
        }
    }

    pub fn with_seq(mut self, seq: u64) -> Self {
        self.seq = Some(seq);
        self
    }

    /// Serialize once so the same bytes can be fanned out to every browser.
    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

/// Event names pushed over `/_ws`.
pub mod events {
    pub const STATUS: &str = "status";
    pub const TUNNELS: &str = "tunnels";
    pub const TRAFFIC: &str = "traffic";
    pub const TICK: &str = "tick";
}

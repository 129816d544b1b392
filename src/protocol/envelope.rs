//! Wire envelopes exchanged over the push channel.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Raw `{type, data}` frame before the payload is interpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Event discriminant, e.g. `task_updated`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Event payload; absent for payload-less events such as `feed_cleared`.
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }

    /// Parse a text frame. Frames that are not a JSON object with a string
    /// `type` are decode failures.
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::Decode(format!("malformed envelope: {}", e)))
    }

    pub fn to_text(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Messages the client sends to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientMessage {
    /// Keep-alive; the server answers with `pong`.
    Ping,
}

impl ClientMessage {
    pub fn to_envelope(self) -> Envelope {
        match self {
            ClientMessage::Ping => Envelope::new("ping", Value::Null),
        }
    }

    pub fn to_text(self) -> Result<String> {
        self.to_envelope().to_text()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_envelope() {
        let envelope = Envelope::parse(r#"{"type": "task_deleted", "data": {"id": "t1"}}"#).unwrap();
        assert_eq!(envelope.kind, "task_deleted");
        assert_eq!(envelope.data, json!({"id": "t1"}));
    }

    #[test]
    fn test_parse_without_data() {
        let envelope = Envelope::parse(r#"{"type": "feed_cleared"}"#).unwrap();
        assert_eq!(envelope.kind, "feed_cleared");
        assert!(envelope.data.is_null());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(Envelope::parse("not json"), Err(Error::Decode(_))));
        assert!(matches!(Envelope::parse(r#"{"data": {}}"#), Err(Error::Decode(_))));
        assert!(matches!(Envelope::parse(r#"{"type": 7}"#), Err(Error::Decode(_))));
    }

    #[test]
    fn test_ping_text() {
        let text = ClientMessage::Ping.to_text().unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "ping");
    }
}

//! Wire Protocol
//!
//! Each WebSocket text message carries one JSON frame:
//!
//! ```json
//! {"type": "event", "event": "chat", "data": {"text": "hi"}, "id": 7}
//! {"type": "ack", "id": 7}
//! ```
//!
//! `data` is omitted when an event has no payload. `id` is only present when
//! the sender wants an `ack` frame back.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::socket::{Result, SocketError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Frame {
    Event {
        event: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<u64>,
    },
    Ack {
        id: u64,
    },
}

impl Frame {
    pub fn event(event: impl Into<String>, data: Option<Value>) -> Self {
        Frame::Event {
            event: event.into(),
            data,
            id: None,
        }
    }

    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(SocketError::Encode)
    }

    pub fn decode(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(SocketError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encode_omits_absent_fields() {
        let text = Frame::event("ping", None).encode().unwrap();
        assert_eq!(text, r#"{"type":"event","event":"ping"}"#);

        let text = Frame::Event {
            event: "chat".into(),
            data: Some(json!({"a": 1})),
            id: Some(3),
        }
        .encode()
        .unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(
            value,
            json!({"type": "event", "event": "chat", "data": {"a": 1}, "id": 3})
        );
    }

    #[test]
    fn test_decode() {
        assert_eq!(
            Frame::decode(r#"{"type":"event","event":"ping","data":42}"#).unwrap(),
            Frame::event("ping", Some(json!(42)))
        );
        assert_eq!(
            Frame::decode(r#"{"type":"ack","id":9}"#).unwrap(),
            Frame::Ack { id: 9 }
        );
    }

    #[test]
    fn test_decode_rejects_unknown_frames() {
        assert!(matches!(
            Frame::decode(r#"{"type":"hello"}"#),
            Err(SocketError::Decode(_))
        ));
        assert!(matches!(Frame::decode("not json"), Err(SocketError::Decode(_))));
        assert!(matches!(
            Frame::decode(r#"{"type":"event"}"#),
            Err(SocketError::Decode(_))
        ));
    }
}

//! Wire frames for the real-time channel
//!
//! JSON text frames of the shape `{"event": <name>, "data": <payload>}`.
//! Payloads are opaque to the manager; well-known event names (new-message,
//! room-update, typing, join-room, leave-room) belong to the collaborators.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_tungstenite::tungstenite::protocol::Message;

/// One event frame, in either direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub event: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

impl Frame {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// Authentication frame sent first thing after every (re)connect.
    pub(crate) fn auth(access_token: &str) -> Self {
        Self::new(
            "auth",
            serde_json::json!({ "token": format!("Bearer {}", access_token) }),
        )
    }

    pub(crate) fn into_message(self) -> Message {
        let text = serde_json::to_string(&self).expect("frame serializes");
        Message::Text(text)
    }

    /// Parse an incoming transport message; non-text and non-frame messages
    /// return None.
    pub(crate) fn from_message(message: &Message) -> Option<Self> {
        match message {
            Message::Text(text) => serde_json::from_str(text).ok(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_roundtrip_through_message() {
        let frame = Frame::new("typing", serde_json::json!({"roomId": "r1", "isTyping": true}));
        let parsed = Frame::from_message(&frame.clone().into_message()).unwrap();
        assert_eq!(parsed, frame);
    }

    #[test]
    fn test_dataless_frame_omits_field() {
        let frame = Frame::new("leave-room", Value::Null);
        let Message::Text(text) = frame.into_message() else {
            panic!("expected text message");
        };
        assert_eq!(text, r#"{"event":"leave-room"}"#);

        let parsed = Frame::from_message(&Message::Text(text)).unwrap();
        assert_eq!(parsed.data, Value::Null);
    }

    #[test]
    fn test_auth_frame_shape() {
        let frame = Frame::auth("tok-1");
        assert_eq!(frame.event, "auth");
        assert_eq!(frame.data["token"], "Bearer tok-1");
    }

    #[test]
    fn test_binary_message_ignored() {
        assert!(Frame::from_message(&Message::Binary(vec![1, 2, 3])).is_none());
        assert!(Frame::from_message(&Message::Text("not json".into())).is_none());
    }
}

//! Wire protocol envelopes.
//!
//! Every frame pushed on a stream, received from a chat socket or exchanged
//! with the agent endpoints is a `{type, data}` envelope. `Envelope::decode`
//! is the single place raw client input is validated; everything downstream
//! handles typed envelopes only, so the wire contract lives here and nowhere
//! else.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Error code attached to `error` envelopes produced by the decode boundary.
pub const CODE_MALFORMED_ENVELOPE: &str = "MALFORMED_ENVELOPE";

/// Decode failure. The raw input did not form a valid envelope.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),
}

/// Role of a `message` envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// Data for a `connection` envelope, pushed once when a stream opens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionData {
    pub status: String,
    pub authenticated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

/// Data for a `heartbeat` envelope, pushed periodically on open streams.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatData {
    pub timestamp: String,
    pub authenticated: bool,
}

/// Data for a `message` envelope.
///
/// Agent messages carry only `role` and `content`. Persisted group chat
/// messages additionally carry the view fields assigned at the persistence
/// boundary, so stream consumers see the storage order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageData {
    pub role: MessageRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// Data for an `events` envelope returned by the action bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventsData {
    pub events: Vec<Value>,
    pub title: String,
    pub message: String,
}

/// Data for an `error` envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorData {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// The closed set of frames exchanged on every wire boundary.
///
/// Serialized as `{"type": "...", "data": {...}}`. Unknown `type` values and
/// `data` shapes that do not match their `type` are rejected at decode time,
/// never forwarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum Envelope {
    Connection(ConnectionData),
    Heartbeat(HeartbeatData),
    Message(MessageData),
    Events(EventsData),
    Error(ErrorData),
}

impl Envelope {
    /// Parse and validate a raw frame.
    pub fn decode(raw: &str) -> Result<Self, DecodeError> {
        let envelope: Envelope = serde_json::from_str(raw)
            .map_err(|e| DecodeError::MalformedEnvelope(e.to_string()))?;
        envelope.validate()?;
        Ok(envelope)
    }

    /// Parse and validate an already-deserialized JSON value.
    pub fn from_value(value: Value) -> Result<Self, DecodeError> {
        let envelope: Envelope = serde_json::from_value(value)
            .map_err(|e| DecodeError::MalformedEnvelope(e.to_string()))?;
        envelope.validate()?;
        Ok(envelope)
    }

    fn validate(&self) -> Result<(), DecodeError> {
        if let Envelope::Message(data) = self {
            if data.content.trim().is_empty() {
                return Err(DecodeError::MalformedEnvelope(
                    "message content must not be empty".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Serialize the envelope. Infallible for envelopes built through the
    /// typed constructors: every variant has a matching data shape.
    pub fn encode(&self) -> String {
        serde_json::to_string(self).expect("envelope serialization cannot fail")
    }

    pub fn connected(authenticated: bool, user: Option<String>) -> Self {
        Envelope::Connection(ConnectionData {
            status: "connected".to_string(),
            authenticated,
            user,
        })
    }

    pub fn heartbeat(timestamp: impl Into<String>, authenticated: bool) -> Self {
        Envelope::Heartbeat(HeartbeatData {
            timestamp: timestamp.into(),
            authenticated,
        })
    }

    pub fn user_message(content: impl Into<String>) -> Self {
        Envelope::Message(MessageData {
            role: MessageRole::User,
            content: content.into(),
            id: None,
            group_id: None,
            sender_id: None,
            kind: None,
            created_at: None,
        })
    }

    pub fn assistant_message(content: impl Into<String>) -> Self {
        Envelope::Message(MessageData {
            role: MessageRole::Assistant,
            content: content.into(),
            id: None,
            group_id: None,
            sender_id: None,
            kind: None,
            created_at: None,
        })
    }

    pub fn events(events: Vec<Value>, title: impl Into<String>, message: impl Into<String>) -> Self {
        Envelope::Events(EventsData {
            events,
            title: title.into(),
            message: message.into(),
        })
    }

    pub fn error(message: impl Into<String>, code: Option<&str>) -> Self {
        Envelope::Error(ErrorData {
            message: message.into(),
            code: code.map(str::to_string),
        })
    }
}

impl From<DecodeError> for Envelope {
    fn from(err: DecodeError) -> Self {
        Envelope::error(err.to_string(), Some(CODE_MALFORMED_ENVELOPE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_round_trip_all_variants() {
        let envelopes = vec![
            Envelope::connected(true, Some("dev@localhost".to_string())),
            Envelope::connected(false, None),
            Envelope::heartbeat("2025-01-01T00:00:00Z", true),
            Envelope::user_message("hello"),
            Envelope::assistant_message("hi there"),
            Envelope::events(
                vec![json!({"id": 1, "title": "Open gym"})],
                "Search results",
                "Found 1 events matching your criteria",
            ),
            Envelope::error("boom", Some("INTERNAL_ERROR")),
            Envelope::error("boom", None),
        ];

        for envelope in envelopes {
            let decoded = Envelope::decode(&envelope.encode()).unwrap();
            assert_eq!(decoded, envelope);
        }
    }

    #[test]
    fn test_decode_missing_type() {
        let err = Envelope::decode(r#"{"data": {"role": "user", "content": "x"}}"#).unwrap_err();
        assert!(matches!(err, DecodeError::MalformedEnvelope(_)));
    }

    #[test]
    fn test_decode_unknown_type() {
        let err = Envelope::decode(r#"{"type": "typing", "data": {"is_typing": true}}"#).unwrap_err();
        assert!(matches!(err, DecodeError::MalformedEnvelope(_)));
    }

    #[test]
    fn test_decode_missing_required_field() {
        // message data without content
        let err = Envelope::decode(r#"{"type": "message", "data": {"role": "user"}}"#).unwrap_err();
        assert!(matches!(err, DecodeError::MalformedEnvelope(_)));
    }

    #[test]
    fn test_decode_invalid_role() {
        let raw = r#"{"type": "message", "data": {"role": "system", "content": "x"}}"#;
        assert!(Envelope::decode(raw).is_err());
    }

    #[test]
    fn test_decode_blank_content() {
        let raw = r#"{"type": "message", "data": {"role": "user", "content": "   "}}"#;
        assert!(Envelope::decode(raw).is_err());
    }

    #[test]
    fn test_chat_message_view_fields_survive() {
        let raw = json!({
            "type": "message",
            "data": {
                "role": "user",
                "content": "hi",
                "id": 7,
                "group_id": 3,
                "sender_id": "alice",
                "kind": "text",
                "created_at": "2025-01-01T00:00:00Z"
            }
        });
        let envelope = Envelope::from_value(raw).unwrap();
        match &envelope {
            Envelope::Message(data) => {
                assert_eq!(data.id, Some(7));
                assert_eq!(data.sender_id.as_deref(), Some("alice"));
            }
            other => panic!("unexpected envelope: {other:?}"),
        }
        assert_eq!(Envelope::decode(&envelope.encode()).unwrap(), envelope);
    }
}

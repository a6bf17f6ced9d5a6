//! Chat event model and its bus wire codec.
//!
//! A `ChatEvent` is one message from one participant. It is built by the
//! session handler, appended to the message store, carried over the broadcast
//! bus as a JSON record, and finally rendered to clients as `"{sender}: {body}"`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CodecError;
use crate::identity::Identity;

/// Default pub/sub channel chat events travel on.
pub const CHAT_CHANNEL: &str = "chat";

/// Immutable record of one chat message.
///
/// Wire form (JSON):
///
/// ```json
/// {"id":"0190...","sender":"alice","body":"hello","timestamp":"2026-01-01T00:00:00Z"}
/// ```
///
/// Decoding requires `sender` and `body`. The legacy field names `user` and
/// `message` are accepted, and `id`/`timestamp` are filled in when absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEvent {
    #[serde(default = "Uuid::now_v7")]
    id: Uuid,
    #[serde(alias = "user")]
    sender: Identity,
    #[serde(alias = "message")]
    body: String,
    #[serde(default = "Utc::now")]
    timestamp: DateTime<Utc>,
}

impl ChatEvent {
    /// Create a new event stamped with a fresh UUIDv7 and the current time.
    pub fn new(sender: Identity, body: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            sender,
            body: body.into(),
            timestamp: Utc::now(),
        }
    }

    /// Rebuild an event from stored parts.
    pub fn from_parts(id: Uuid, sender: Identity, body: String, timestamp: DateTime<Utc>) -> Self {
        Self {
            id,
            sender,
            body,
            timestamp,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn sender(&self) -> &Identity {
        &self.sender
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// The client-visible line: exactly `"<sender>: <body>"`.
    pub fn render(&self) -> String {
        format!("{}: {}", self.sender, self.body)
    }

    /// Encode for the broadcast bus.
    pub fn to_wire(&self) -> Result<String, CodecError> {
        serde_json::to_string(self).map_err(|e| CodecError::Encode(e.to_string()))
    }

    /// Decode a bus payload.
    pub fn from_wire(payload: &str) -> Result<Self, CodecError> {
        serde_json::from_str(payload).map_err(|e| CodecError::Decode(e.to_string()))
    }
}

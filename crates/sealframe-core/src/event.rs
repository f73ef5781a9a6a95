//! Event envelopes and content parsing.
//!
//! Only the shapes the decryption path needs are modeled. Content keeps the
//! raw JSON object alongside an optional typed view, so unknown event types
//! survive decryption untouched.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;

use crate::ids::{EventId, RoomId, SenderKey, SessionId, UserId};

/// Algorithm name for group-ratchet encrypted room events.
pub const MEGOLM_ALGORITHM: &str = "m.megolm.v1.aes-sha2";

/// Event type string, e.g. `m.room.message`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventType(String);

impl EventType {
    /// Encrypted room event.
    pub const ROOM_ENCRYPTED: &'static str = "m.room.encrypted";
    /// Room message.
    pub const ROOM_MESSAGE: &'static str = "m.room.message";
    /// Annotation on another event.
    pub const REACTION: &'static str = "m.reaction";

    /// Wrap a raw type string.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the raw type string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Content of an `m.room.encrypted` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedContent {
    /// Encryption algorithm
    pub algorithm: String,
    /// Sender's Curve25519 identity key
    pub sender_key: SenderKey,
    /// Group session the ciphertext belongs to
    pub session_id: SessionId,
    /// Base64 wire bytes of the group message
    pub ciphertext: String,
    /// Sending device, informational only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

/// Content of an `m.room.message` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageContent {
    /// Message kind, e.g. `m.text`
    pub msgtype: String,
    /// Plain-text body
    pub body: String,
    /// Markup format of `formatted_body`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Rich body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formatted_body: Option<String>,
}

/// Relation carried by an `m.reaction` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    /// Relation kind, `m.annotation`
    pub rel_type: String,
    /// Annotated event
    pub event_id: EventId,
    /// Reaction key
    pub key: String,
}

/// Content of an `m.reaction` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionContent {
    /// The annotation
    #[serde(rename = "m.relates_to")]
    pub relates_to: Annotation,
}

/// Typed view over recognized content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedContent {
    /// `m.room.encrypted`
    Encrypted(EncryptedContent),
    /// `m.room.message`
    Message(MessageContent),
    /// `m.reaction`
    Reaction(ReactionContent),
}

/// Content parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContentError {
    /// No typed view exists for this event type
    #[error("unsupported content type {event_type}")]
    Unsupported {
        /// The unrecognized type
        event_type: String,
    },

    /// Content does not match the schema of its type
    #[error("malformed {event_type} content: {reason}")]
    Malformed {
        /// The recognized type
        event_type: String,
        /// Deserializer message
        reason: String,
    },
}

impl ContentError {
    /// Unsupported types are not failures; the raw content is kept.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported { .. })
    }
}

/// Event content: raw JSON plus an optional typed view.
///
/// Serializes as the raw JSON only.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Content {
    raw: Value,
    parsed: Option<ParsedContent>,
}

impl Content {
    /// Wrap raw JSON without parsing.
    pub fn from_raw(raw: Value) -> Self {
        Self { raw, parsed: None }
    }

    /// Raw JSON as received.
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// Typed view, if [`parse_raw`](Self::parse_raw) succeeded.
    pub fn parsed(&self) -> Option<&ParsedContent> {
        self.parsed.as_ref()
    }

    /// Typed view as encrypted content.
    pub fn as_encrypted(&self) -> Option<&EncryptedContent> {
        match &self.parsed {
            Some(ParsedContent::Encrypted(content)) => Some(content),
            _ => None,
        }
    }

    /// Build the typed view for `event_type`.
    ///
    /// On any error the raw content is left intact and the typed view is
    /// cleared.
    pub fn parse_raw(&mut self, event_type: &EventType) -> Result<(), ContentError> {
        self.parsed = None;

        let parsed = match event_type.as_str() {
            EventType::ROOM_ENCRYPTED => ParsedContent::Encrypted(self.typed(event_type)?),
            EventType::ROOM_MESSAGE => ParsedContent::Message(self.typed(event_type)?),
            EventType::REACTION => ParsedContent::Reaction(self.typed(event_type)?),
            other => return Err(ContentError::Unsupported { event_type: other.to_owned() }),
        };

        self.parsed = Some(parsed);
        Ok(())
    }

    fn typed<T: serde::de::DeserializeOwned>(&self, event_type: &EventType) -> Result<T, ContentError> {
        T::deserialize(&self.raw).map_err(|e| ContentError::Malformed {
            event_type: event_type.to_string(),
            reason: e.to_string(),
        })
    }
}

impl Serialize for Content {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.raw.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Content {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Self::from_raw(Value::deserialize(deserializer)?))
    }
}

/// Failure to read an event from JSON.
#[derive(Debug, Error)]
pub enum EventError {
    /// Envelope JSON is invalid
    #[error("invalid event json: {0}")]
    Json(#[from] serde_json::Error),

    /// Content of a recognized type is malformed
    #[error(transparent)]
    Content(#[from] ContentError),
}

/// A room event as delivered by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Sending user
    pub sender: UserId,
    /// Event type
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Server timestamp in milliseconds
    pub origin_server_ts: u64,
    /// Event identifier
    pub event_id: EventId,
    /// Room the event belongs to
    pub room_id: RoomId,
    /// Event content
    pub content: Content,
    /// Server-added metadata, not covered by any signature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unsigned: Option<Value>,
}

impl Event {
    /// Parse an event and build its typed content view.
    ///
    /// Unsupported content types are accepted with raw content only.
    pub fn from_json(json: &str) -> Result<Self, EventError> {
        let mut event: Self = serde_json::from_str(json)?;
        match event.content.parse_raw(&event.event_type) {
            Err(e) if !e.is_unsupported() => Err(e.into()),
            _ => Ok(event),
        }
    }
}

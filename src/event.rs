//! Event data model and wire encoding.
//!
//! Events cross the broker as UTF-8 JSON text:
//! `{"event_type": "...", "payload": {...}}`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Maximum length of an event type name, matching the store schema.
pub const MAX_EVENT_TYPE_LEN: usize = 64;

/// Structured payload carried by every event.
pub type Payload = Map<String, Value>;

/// An event accepted for ingestion but not yet persisted.
///
/// Has no identity until the pipeline stores it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomingEvent {
    pub event_type: String,
    #[serde(default)]
    pub payload: Payload,
}

impl IncomingEvent {
    pub fn new(event_type: impl Into<String>, payload: Payload) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
        }
    }
}

/// A persisted event. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub id: Uuid,
    pub event_type: String,
    pub payload: Payload,
    pub created_at: DateTime<Utc>,
}

/// Shared handle to a persisted event, used for fan-out.
pub type SharedEvent = Arc<StoredEvent>;

/// Errors raised while decoding a raw broker message.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Message is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("Message is not a valid event: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Message has an empty event_type")]
    EmptyEventType,
}

/// Encode an event to its canonical wire form.
pub fn encode(event: &IncomingEvent) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(event)
}

/// Decode a raw broker message into an event.
pub fn decode(raw: &[u8]) -> Result<IncomingEvent, DecodeError> {
    let text = std::str::from_utf8(raw)?;
    let event: IncomingEvent = serde_json::from_str(text)?;
    if event.event_type.is_empty() {
        return Err(DecodeError::EmptyEventType);
    }
    Ok(event)
}

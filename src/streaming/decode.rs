//! Frame decoding
//!
//! The streaming API sends JSON text frames of the form
//! `{"stream": [...], "event": "update", "payload": "<json encoded entity>"}`.
//! Some servers inline the payload as a JSON value instead of a string, and
//! `type` is accepted in place of `event`.

use serde::Deserialize;
use serde_json::Value;

use crate::streaming::error::DecodeError;
use crate::streaming::transport::Frame;
use crate::streaming::types::{DomainEvent, EventKind};

#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(alias = "type")]
    event: Option<String>,
    #[serde(default)]
    payload: Option<Value>,
}

/// Outcome of decoding one well-formed frame
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Event(DomainEvent),
    /// Valid frame for an event this client does not handle (e.g. `filters_changed`)
    Ignored(String),
}

/// Decode a frame as received from the transport. Binary frames must hold
/// UTF-8 text; anything else is rejected rather than repaired.
pub fn decode(frame: &Frame) -> Result<Decoded, DecodeError> {
    match frame {
        Frame::Text(text) => decode_frame(text),
        Frame::Binary(bytes) => decode_frame(std::str::from_utf8(bytes)?),
    }
}

pub fn decode_frame(text: &str) -> Result<Decoded, DecodeError> {
    if text.trim().is_empty() {
        return Ok(Decoded::Ignored("keepalive".to_string()));
    }

    let frame: RawFrame = serde_json::from_str(text)?;
    let name = match frame.event {
        Some(name) if !name.trim().is_empty() => name,
        _ => return Err(DecodeError::MissingEvent),
    };

    let Some(kind) = EventKind::from_event_name(&name) else {
        return Ok(Decoded::Ignored(name));
    };

    let payload = match kind {
        EventKind::Update | EventKind::Notification => entity_payload(frame.payload),
        EventKind::Delete => deleted_id(frame.payload),
    }
    .ok_or(DecodeError::InvalidPayload { event: name })?;

    Ok(Decoded::Event(DomainEvent::new(kind, payload)))
}

fn entity_payload(payload: Option<Value>) -> Option<Value> {
    let value = match payload? {
        Value::String(encoded) => serde_json::from_str(&encoded).ok()?,
        other => other,
    };
    value.is_object().then_some(value)
}

fn deleted_id(payload: Option<Value>) -> Option<Value> {
    match payload? {
        Value::String(id) if !id.is_empty() => Some(Value::String(id)),
        Value::Number(id) => Some(Value::String(id.to_string())),
        _ => None,
    }
}

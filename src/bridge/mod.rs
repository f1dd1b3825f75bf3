//! Event Dispatch Bridge
//!
//! Relays manager callbacks to the presentation layer. Each (slot, kind) pair
//! has its own named topic, e.g. `update-start-user-streaming`.

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::streaming::error::StreamingError;
use crate::streaming::manager::StreamSink;
use crate::streaming::types::Slot;

/// Kind half of a topic name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicKind {
    Update,
    Notification,
    Delete,
    Error,
}

impl TopicKind {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Update => "update",
            Self::Notification => "notification",
            Self::Delete => "delete",
            Self::Error => "error",
        }
    }
}

pub fn topic(slot: Slot, kind: TopicKind) -> String {
    format!("{}-start-{}-streaming", kind.as_str(), slot.as_str())
}

/// Error body sent on the error topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub kind: String,
    pub message: String,
}

impl From<&StreamingError> for ErrorPayload {
    fn from(error: &StreamingError) -> Self {
        Self {
            kind: error.kind().to_string(),
            message: error.to_string(),
        }
    }
}

/// Something that can publish a JSON payload under a topic name
pub trait TopicEmitter: Send + Sync {
    fn emit_topic(&self, topic: &str, payload: Value) -> Result<(), String>;
}

#[cfg(feature = "desktop")]
impl TopicEmitter for tauri::AppHandle {
    fn emit_topic(&self, topic: &str, payload: Value) -> Result<(), String> {
        use tauri::Emitter;
        self.emit(topic, payload).map_err(|e| e.to_string())
    }
}

/// `StreamSink` that publishes every callback on its topic
pub struct DispatchBridge<E> {
    emitter: E,
}

impl<E: TopicEmitter> DispatchBridge<E> {
    pub fn new(emitter: E) -> Self {
        Self { emitter }
    }

    fn publish(&self, slot: Slot, kind: TopicKind, payload: Value) {
        let topic = topic(slot, kind);
        if let Err(e) = self.emitter.emit_topic(&topic, payload) {
            log::error!("Failed to emit {}: {}", topic, e);
        }
    }
}

impl<E: TopicEmitter> StreamSink for DispatchBridge<E> {
    fn on_update(&self, slot: Slot, status: Value) {
        self.publish(slot, TopicKind::Update, status);
    }

    fn on_notification(&self, slot: Slot, notification: Value) {
        self.publish(slot, TopicKind::Notification, notification);
    }

    fn on_delete(&self, slot: Slot, status_id: String) {
        self.publish(slot, TopicKind::Delete, Value::String(status_id));
    }

    fn on_error(&self, slot: Slot, error: &StreamingError) {
        match serde_json::to_value(ErrorPayload::from(error)) {
            Ok(payload) => self.publish(slot, TopicKind::Error, payload),
            Err(e) => log::error!("Failed to serialize {} stream error: {}", slot, e),
        }
    }
}

/// Tagged value produced by `ChannelBridge`
#[derive(Debug, Clone, PartialEq)]
pub enum StreamMessage {
    Update { slot: Slot, status: Value },
    Notification { slot: Slot, notification: Value },
    Delete { slot: Slot, status_id: String },
    Error { slot: Slot, error: StreamingError },
}

impl StreamMessage {
    pub fn slot(&self) -> Slot {
        match self {
            Self::Update { slot, .. }
            | Self::Notification { slot, .. }
            | Self::Delete { slot, .. }
            | Self::Error { slot, .. } => *slot,
        }
    }
}

/// `StreamSink` that turns callbacks into `StreamMessage`s on a channel,
/// for hosts without a Tauri window
pub struct ChannelBridge {
    tx: mpsc::UnboundedSender<StreamMessage>,
}

impl ChannelBridge {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StreamMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, message: StreamMessage) {
        if self.tx.send(message).is_err() {
            log::debug!("Stream message receiver dropped");
        }
    }
}

impl StreamSink for ChannelBridge {
    fn on_update(&self, slot: Slot, status: Value) {
        self.send(StreamMessage::Update { slot, status });
    }

    fn on_notification(&self, slot: Slot, notification: Value) {
        self.send(StreamMessage::Notification { slot, notification });
    }

    fn on_delete(&self, slot: Slot, status_id: String) {
        self.send(StreamMessage::Delete { slot, status_id });
    }

    fn on_error(&self, slot: Slot, error: &StreamingError) {
        self.send(StreamMessage::Error {
            slot,
            error: error.clone(),
        });
    }
}

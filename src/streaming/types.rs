//! Streaming Types
//!
//! Shared types for the streaming layer (slots, accounts, endpoints, events)

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Logical streaming channel. Each slot holds at most one live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Slot {
    User,
    Local,
    Public,
}

impl Slot {
    pub const ALL: [Slot; 3] = [Slot::User, Slot::Local, Slot::Public];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Local => "local",
            Self::Public => "public",
        }
    }

    pub fn endpoint(&self) -> StreamEndpoint {
        match self {
            Self::User => StreamEndpoint::User,
            Self::Local => StreamEndpoint::PublicLocal,
            Self::Public => StreamEndpoint::Public,
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            Self::User => 0,
            Self::Local => 1,
            Self::Public => 2,
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Account record as handed over by the host.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    #[serde(alias = "_id")]
    pub id: String,
    pub domain: String,
    #[serde(default)]
    pub access_token: String,
}

impl Account {
    pub fn new(
        id: impl Into<String>,
        domain: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            domain: domain.into(),
            access_token: access_token.into(),
        }
    }
}

// Manual impl keeps the bearer token out of logs.
impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("domain", &self.domain)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

/// Resolved server endpoint and bearer token for one account
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub domain: String,
    pub access_token: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("domain", &self.domain)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

/// Server-side streaming channel a connection subscribes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamEndpoint {
    /// Home timeline and notifications of the authenticated account
    User,
    /// Local timeline of the server
    PublicLocal,
    /// Federated timeline
    Public,
}

impl StreamEndpoint {
    pub fn path(&self) -> &'static str {
        match self {
            Self::User => "/streaming/user",
            Self::PublicLocal => "/streaming/public/local",
            Self::Public => "/streaming/public",
        }
    }

    /// Value of the `stream` query parameter on the WebSocket API
    pub fn stream_name(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::PublicLocal => "public:local",
            Self::Public => "public",
        }
    }

    /// Whether events of `kind` are delivered for this channel
    pub fn accepts(&self, kind: EventKind) -> bool {
        match kind {
            EventKind::Update | EventKind::Delete => true,
            EventKind::Notification => matches!(self, Self::User),
        }
    }
}

impl fmt::Display for StreamEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Update,
    Notification,
    Delete,
}

impl EventKind {
    pub fn from_event_name(name: &str) -> Option<Self> {
        match name {
            "update" => Some(Self::Update),
            "notification" => Some(Self::Notification),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Update => "update",
            Self::Notification => "notification",
            Self::Delete => "delete",
        }
    }
}

/// Decoded unit of streamed data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    pub kind: EventKind,
    /// Status or notification entity; the deleted status id for `Delete`
    pub payload: Value,
}

impl DomainEvent {
    pub fn new(kind: EventKind, payload: Value) -> Self {
        Self { kind, payload }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionState {
    Connecting,
    Open,
    /// Terminal: the connection was stopped or the transport ended
    Closed,
}

/// Snapshot of one active slot
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotStatus {
    pub slot: Slot,
    pub account_id: String,
    pub state: ConnectionState,
    pub dropped_frames: u64,
}

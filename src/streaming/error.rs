//! Error types for the streaming layer

use thiserror::Error;

/// Failure of the account credential lookup
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CredentialError {
    #[error("account not found: {0}")]
    NotFound(String),
    #[error("stored credentials for account {0} are empty")]
    Empty(String),
    #[error("account store unavailable: {0}")]
    Store(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StreamingError {
    #[error(transparent)]
    Credential(#[from] CredentialError),
    #[error("invalid streaming endpoint for {domain}: {message}")]
    InvalidEndpoint { domain: String, message: String },
    #[error("failed to open stream {endpoint}: {message}")]
    TransportEstablish { endpoint: String, message: String },
    #[error("stream {endpoint} dropped: {message}")]
    TransportRuntime { endpoint: String, message: String },
}

impl StreamingError {
    /// Stable tag sent to the frontend alongside the message
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Credential(CredentialError::NotFound(_)) => "notFound",
            Self::Credential(CredentialError::Empty(_)) => "empty",
            Self::Credential(CredentialError::Store(_)) => "store",
            Self::InvalidEndpoint { .. } => "invalidEndpoint",
            Self::TransportEstablish { .. } => "transportEstablish",
            Self::TransportRuntime { .. } => "transportRuntime",
        }
    }
}

impl From<StreamingError> for String {
    fn from(err: StreamingError) -> Self {
        err.to_string()
    }
}

/// Transport-level failure reported by a `Connector` or `FrameSource`
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct TransportError(pub String);

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self(err.to_string())
    }
}

/// A frame that could not be turned into an event. Never surfaced to sinks.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("frame is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),
    #[error("frame is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("frame has no event name")]
    MissingEvent,
    #[error("{event} frame has an unusable payload")]
    InvalidPayload { event: String },
}

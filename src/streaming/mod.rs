//! Streaming Layer
//!
//! Long-lived WebSocket streams for the user, local and public timelines,
//! with one active connection per slot.

pub mod config;
pub mod connection;
pub mod decode;
pub mod error;
pub mod manager;
pub mod transport;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use config::StreamingConfig;
pub use connection::{StreamConnection, StreamListener};
pub use error::{CredentialError, StreamingError};
pub use manager::{StreamSessionManager, StreamSink};
pub use transport::{ConnectRequest, Connector, Frame, FrameSource, WebSocketConnector};
pub use types::*;

use std::sync::Arc;

use crate::accounts::CredentialResolver;

/// Create a streaming manager over real WebSockets, configured from the environment
pub fn create_manager(resolver: Arc<dyn CredentialResolver>) -> StreamSessionManager {
    create_manager_with_config(StreamingConfig::from_env(), resolver)
}

/// Create a streaming manager over real WebSockets with an explicit configuration
pub fn create_manager_with_config(
    config: StreamingConfig,
    resolver: Arc<dyn CredentialResolver>,
) -> StreamSessionManager {
    StreamSessionManager::new(config, resolver, Arc::new(WebSocketConnector::new()))
}

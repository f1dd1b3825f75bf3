//! Streaming configuration
//!
//! Scheme, API path and failure policy for the streaming layer, plus the
//! WebSocket URL for each endpoint.

use url::Url;

use crate::streaming::error::StreamingError;
use crate::streaming::types::StreamEndpoint;

const INSECURE_ENV: &str = "WHALEBIRD_STREAMING_INSECURE";
const PATH_ENV: &str = "WHALEBIRD_STREAMING_PATH";
const DEFAULT_STREAMING_PATH: &str = "/api/v1/streaming";

#[derive(Clone, Debug)]
pub struct StreamingConfig {
    /// Use `wss://`; plain `ws://` is only meant for local servers and tests
    pub secure: bool,
    /// Path of the WebSocket streaming API on the server
    pub streaming_path: String,
    /// Stop the slot's running stream when a replacement start cannot resolve credentials
    pub stop_previous_on_credential_error: bool,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            secure: true,
            streaming_path: DEFAULT_STREAMING_PATH.to_string(),
            stop_previous_on_credential_error: false,
        }
    }
}

impl StreamingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default configuration with overrides from the environment
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(value) = std::env::var(INSECURE_ENV) {
            config.secure = !flag_enabled(&value);
        }
        if let Ok(path) = std::env::var(PATH_ENV) {
            if !path.trim().is_empty() {
                config.streaming_path = path.trim().to_string();
            }
        }
        config
    }

    pub fn with_insecure_transport(mut self) -> Self {
        self.secure = false;
        self
    }

    pub fn with_streaming_path(mut self, path: impl Into<String>) -> Self {
        self.streaming_path = path.into();
        self
    }

    pub fn with_stop_previous_on_credential_error(mut self, enabled: bool) -> Self {
        self.stop_previous_on_credential_error = enabled;
        self
    }

    /// Build the WebSocket URL for `endpoint` on the server at `domain`.
    ///
    /// `domain` is normally a bare hostname, but a scheme prefix or trailing
    /// slash left over from user input is tolerated.
    pub fn stream_url(&self, domain: &str, endpoint: StreamEndpoint) -> Result<Url, StreamingError> {
        let invalid = |message: String| StreamingError::InvalidEndpoint {
            domain: domain.to_string(),
            message,
        };

        let host = strip_scheme(domain.trim()).trim_end_matches('/');
        if host.is_empty() {
            return Err(invalid("empty domain".to_string()));
        }

        let scheme = if self.secure { "wss" } else { "ws" };
        let mut url =
            Url::parse(&format!("{}://{}", scheme, host)).map_err(|e| invalid(e.to_string()))?;
        if url.host_str().is_none() {
            return Err(invalid("missing host".to_string()));
        }

        url.set_path(&self.streaming_path);
        url.query_pairs_mut()
            .clear()
            .append_pair("stream", endpoint.stream_name());
        Ok(url)
    }
}

fn strip_scheme(domain: &str) -> &str {
    ["https://", "http://", "wss://", "ws://"]
        .iter()
        .find_map(|prefix| domain.strip_prefix(prefix))
        .unwrap_or(domain)
}

fn flag_enabled(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

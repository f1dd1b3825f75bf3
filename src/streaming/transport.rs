//! WebSocket transport
//!
//! `Connector` opens one physical stream and hands back a `FrameSource` that
//! yields data frames. The production implementation uses tokio-tungstenite;
//! tests plug in an in-memory connector.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::streaming::error::TransportError;

/// Everything needed to open one stream
#[derive(Clone)]
pub struct ConnectRequest {
    pub url: Url,
    pub access_token: String,
}

impl std::fmt::Debug for ConnectRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectRequest")
            .field("url", &self.url.as_str())
            .finish_non_exhaustive()
    }
}

/// One data frame as received. Binary frames are passed through untouched so
/// that bytes which are not UTF-8 can be rejected by the decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

impl From<&str> for Frame {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, request: &ConnectRequest) -> Result<Box<dyn FrameSource>, TransportError>;
}

#[async_trait]
pub trait FrameSource: Send {
    /// Next data frame. `None` once the remote has closed the stream.
    async fn next_frame(&mut self) -> Option<Result<Frame, TransportError>>;

    /// Request closure. Does not wait for the remote acknowledgement.
    async fn close(&mut self);
}

/// Connector for the Mastodon WebSocket streaming API
#[derive(Debug, Default, Clone)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, request: &ConnectRequest) -> Result<Box<dyn FrameSource>, TransportError> {
        let mut handshake = request.url.as_str().into_client_request()?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", request.access_token))
            .map_err(|_| TransportError::new("access token is not a valid header value"))?;
        handshake.headers_mut().insert("Authorization", bearer);

        let (socket, response) = connect_async(handshake).await?;
        log::debug!(
            "WebSocket handshake with {} completed: {}",
            request.url.host_str().unwrap_or_default(),
            response.status()
        );

        Ok(Box::new(WebSocketFrameSource { socket }))
    }
}

struct WebSocketFrameSource {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl FrameSource for WebSocketFrameSource {
    async fn next_frame(&mut self) -> Option<Result<Frame, TransportError>> {
        loop {
            match self.socket.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(Frame::Text(text))),
                Ok(Message::Binary(bytes)) => return Some(Ok(Frame::Binary(bytes))),
                Ok(Message::Close(frame)) => {
                    log::debug!("Remote closed stream: {:?}", frame);
                    return None;
                }
                // Pongs for incoming pings are queued by tungstenite itself
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => continue,
                Err(e) => return Some(Err(e.into())),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.socket.close(None).await {
            log::debug!("Error while closing WebSocket: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::config::StreamingConfig;
    use crate::streaming::types::StreamEndpoint;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_hdr_async;
    use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

    #[tokio::test]
    async fn test_websocket_connector_sends_bearer_and_reads_frames() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let mut seen_auth = None;
            let mut seen_query = None;
            let mut socket = accept_hdr_async(stream, |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                seen_auth = req
                    .headers()
                    .get("Authorization")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                seen_query = req.uri().query().map(str::to_string);
                Ok(resp)
            })
            .await
            .expect("handshake");

            socket
                .send(Message::Text(r#"{"event":"update","payload":"{\"id\":\"1\"}"}"#.to_string()))
                .await
                .expect("send");
            socket.close(None).await.expect("close");
            (seen_auth, seen_query)
        });

        let config = StreamingConfig::new().with_insecure_transport();
        let request = ConnectRequest {
            url: config
                .stream_url(&addr.to_string(), StreamEndpoint::User)
                .expect("url"),
            access_token: "tok1".to_string(),
        };

        let mut source = WebSocketConnector::new()
            .connect(&request)
            .await
            .expect("connect");

        let frame = source.next_frame().await.expect("frame").expect("ok frame");
        assert_eq!(
            frame,
            Frame::Text(r#"{"event":"update","payload":"{\"id\":\"1\"}"}"#.to_string())
        );
        assert!(source.next_frame().await.is_none());

        let (auth, query) = server.await.expect("server task");
        assert_eq!(auth.as_deref(), Some("Bearer tok1"));
        assert_eq!(query.as_deref(), Some("stream=user"));
    }

    #[tokio::test]
    async fn test_websocket_connector_reports_refused_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        drop(listener);

        let config = StreamingConfig::new().with_insecure_transport();
        let request = ConnectRequest {
            url: config
                .stream_url(&addr.to_string(), StreamEndpoint::Public)
                .expect("url"),
            access_token: "tok".to_string(),
        };

        let result = WebSocketConnector::new().connect(&request).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_websocket_binary_frame_bytes_are_not_rewritten() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let mut bytes = br#"{"event":"update","payload":{"id":"1","content":"a"#.to_vec();
        bytes.push(0xFF);
        bytes.extend_from_slice(br#""}}"#);
        let sent = bytes.clone();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let mut socket = tokio_tungstenite::accept_async(stream)
                .await
                .expect("handshake");
            socket.send(Message::Binary(sent)).await.expect("send");
            socket.close(None).await.expect("close");
        });

        let config = StreamingConfig::new().with_insecure_transport();
        let request = ConnectRequest {
            url: config
                .stream_url(&addr.to_string(), StreamEndpoint::Public)
                .expect("url"),
            access_token: "tok".to_string(),
        };
        let mut source = WebSocketConnector::new()
            .connect(&request)
            .await
            .expect("connect");

        let frame = source.next_frame().await.expect("frame").expect("ok frame");
        assert_eq!(frame, Frame::Binary(bytes));
        server.await.expect("server task");
    }
}

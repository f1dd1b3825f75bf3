//! Stream Connection
//!
//! One physical stream to one endpoint. The connection owns an I/O task that
//! establishes the transport, decodes frames and hands events to a
//! `StreamListener`. A connection is never reused: once closed, callers open a
//! fresh one.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

use crate::streaming::decode::{decode, Decoded};
use crate::streaming::error::StreamingError;
use crate::streaming::transport::{ConnectRequest, Connector, Frame, FrameSource};
use crate::streaming::types::{ConnectionState, DomainEvent, StreamEndpoint};

/// Upper bound for sending the close frame after `stop`
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Receives what a connection produces. Callbacks run on the connection's
/// I/O task, one at a time, in transport order.
pub trait StreamListener: Send + Sync {
    fn on_event(&self, event: DomainEvent);

    /// Called at most once, after which the connection delivers nothing more
    fn on_error(&self, error: StreamingError);
}

#[derive(Default)]
struct Shared {
    stopped: AtomicBool,
    shutdown: Notify,
    dropped_frames: AtomicU64,
}

impl Shared {
    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

pub struct StreamConnection {
    endpoint: StreamEndpoint,
    shared: Arc<Shared>,
    state: watch::Receiver<ConnectionState>,
    _task: JoinHandle<()>,
}

impl StreamConnection {
    /// Start connecting to `endpoint`. Returns immediately in the
    /// `Connecting` state; establishment failures reach `listener.on_error`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn open(
        connector: Arc<dyn Connector>,
        endpoint: StreamEndpoint,
        request: ConnectRequest,
        listener: Arc<dyn StreamListener>,
    ) -> Self {
        let shared = Arc::new(Shared::default());
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);

        log::info!("Opening stream {} at {}", endpoint, redacted_url(&request));
        let task = tokio::spawn(run_connection(
            connector,
            endpoint,
            request,
            listener,
            Arc::clone(&shared),
            state_tx,
        ));

        Self {
            endpoint,
            shared,
            state: state_rx,
            _task: task,
        }
    }

    /// Close the stream. Idempotent and non-blocking: nothing is delivered
    /// after this returns, and the close frame is sent in the background.
    pub fn stop(&self) {
        if self.shared.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        log::info!("Stopping stream {}", self.endpoint);
        self.shared.shutdown.notify_one();
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.is_stopped()
    }

    pub fn endpoint(&self) -> StreamEndpoint {
        self.endpoint
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Wait until the connection reaches `target` or closes, returning the state reached
    pub async fn wait_for_state(&self, target: ConnectionState) -> ConnectionState {
        let mut state = self.state.clone();
        state
            .wait_for(|current| *current == target || *current == ConnectionState::Closed)
            .await
            .map(|current| *current)
            .unwrap_or(ConnectionState::Closed)
    }

    /// Number of malformed frames dropped so far
    pub fn dropped_frames(&self) -> u64 {
        self.shared.dropped_frames.load(Ordering::Relaxed)
    }
}

impl Drop for StreamConnection {
    fn drop(&mut self) {
        self.stop();
    }
}

fn redacted_url(request: &ConnectRequest) -> String {
    let mut url = request.url.clone();
    url.set_query(None);
    url.to_string()
}

async fn run_connection(
    connector: Arc<dyn Connector>,
    endpoint: StreamEndpoint,
    request: ConnectRequest,
    listener: Arc<dyn StreamListener>,
    shared: Arc<Shared>,
    state: watch::Sender<ConnectionState>,
) {
    let connected = tokio::select! {
        biased;
        _ = shared.shutdown.notified() => {
            log::debug!("Stream {} stopped while connecting", endpoint);
            let _ = state.send(ConnectionState::Closed);
            return;
        }
        result = connector.connect(&request) => result,
    };

    let mut source = match connected {
        Ok(source) => source,
        Err(e) => {
            log::error!("Failed to open stream {}: {}", endpoint, e);
            let _ = state.send(ConnectionState::Closed);
            if !shared.is_stopped() {
                listener.on_error(StreamingError::TransportEstablish {
                    endpoint: endpoint.to_string(),
                    message: e.to_string(),
                });
            }
            return;
        }
    };

    let _ = state.send(ConnectionState::Open);
    log::info!("Stream {} open", endpoint);

    let failure = loop {
        tokio::select! {
            biased;
            _ = shared.shutdown.notified() => {
                close_source(&mut *source, endpoint).await;
                break None;
            }
            frame = source.next_frame() => match frame {
                Some(Ok(frame)) => handle_frame(&frame, endpoint, &shared, listener.as_ref()),
                Some(Err(e)) => break Some(e.to_string()),
                None => break Some("closed by remote".to_string()),
            }
        }
    };

    let _ = state.send(ConnectionState::Closed);
    match failure {
        Some(message) if !shared.is_stopped() => {
            log::error!("Stream {} dropped: {}", endpoint, message);
            listener.on_error(StreamingError::TransportRuntime {
                endpoint: endpoint.to_string(),
                message,
            });
        }
        _ => log::info!("Stream {} closed", endpoint),
    }
}

async fn close_source(source: &mut dyn FrameSource, endpoint: StreamEndpoint) {
    if tokio::time::timeout(CLOSE_TIMEOUT, source.close())
        .await
        .is_err()
    {
        log::warn!("Timed out sending close frame on {}", endpoint);
    }
}

fn handle_frame(frame: &Frame, endpoint: StreamEndpoint, shared: &Shared, listener: &dyn StreamListener) {
    match decode(frame) {
        Ok(Decoded::Event(event)) => {
            if !endpoint.accepts(event.kind) {
                log::debug!("Ignoring {} event on {}", event.kind.as_str(), endpoint);
                return;
            }
            if shared.is_stopped() {
                return;
            }
            log::debug!("Received {} event on {}", event.kind.as_str(), endpoint);
            listener.on_event(event);
        }
        Ok(Decoded::Ignored(name)) => {
            log::debug!("Ignoring unhandled {} frame on {}", name, endpoint);
        }
        Err(e) => {
            let dropped = shared.dropped_frames.fetch_add(1, Ordering::Relaxed) + 1;
            log::warn!(
                "Dropped malformed frame on {} ({} so far): {}",
                endpoint,
                dropped,
                e
            );
        }
    }
}

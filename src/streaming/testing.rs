//! In-memory transport for connection and manager tests

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

use crate::streaming::connection::StreamListener;
use crate::streaming::error::{StreamingError, TransportError};
use crate::streaming::transport::{ConnectRequest, Connector, Frame, FrameSource};
use crate::streaming::types::DomainEvent;

pub const WAIT: Duration = Duration::from_secs(2);

/// What the next `connect` call does
pub enum Behaviour {
    Accept,
    Fail(String),
    /// Never completes establishment
    Hang,
}

/// Server side of one mock connection
pub struct MockRemote {
    pub request: ConnectRequest,
    frames: mpsc::UnboundedSender<Result<Frame, TransportError>>,
}

impl MockRemote {
    /// Push a text frame; returns false once the client side has gone away
    pub fn send(&self, text: &str) -> bool {
        self.frames.send(Ok(Frame::from(text))).is_ok()
    }

    pub fn send_binary(&self, bytes: Vec<u8>) -> bool {
        self.frames.send(Ok(Frame::Binary(bytes))).is_ok()
    }

    pub fn fail(&self, message: &str) -> bool {
        self.frames.send(Err(TransportError::new(message))).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.frames.is_closed()
    }

    pub async fn wait_closed(&self) {
        tokio::time::timeout(WAIT, self.frames.closed())
            .await
            .expect("client never closed the connection");
    }
}

pub struct MockConnector {
    behaviours: std::sync::Mutex<VecDeque<Behaviour>>,
    requests: std::sync::Mutex<Vec<ConnectRequest>>,
    remotes_tx: mpsc::UnboundedSender<MockRemote>,
    remotes_rx: Mutex<mpsc::UnboundedReceiver<MockRemote>>,
}

impl MockConnector {
    pub fn new() -> Arc<Self> {
        let (remotes_tx, remotes_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            behaviours: std::sync::Mutex::new(VecDeque::new()),
            requests: std::sync::Mutex::new(Vec::new()),
            remotes_tx,
            remotes_rx: Mutex::new(remotes_rx),
        })
    }

    pub fn push_behaviour(&self, behaviour: Behaviour) {
        self.behaviours.lock().unwrap().push_back(behaviour);
    }

    pub fn connect_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub async fn next_remote(&self) -> MockRemote {
        let mut remotes = self.remotes_rx.lock().await;
        tokio::time::timeout(WAIT, remotes.recv())
            .await
            .expect("no connection was accepted")
            .expect("connector dropped")
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, request: &ConnectRequest) -> Result<Box<dyn FrameSource>, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        let behaviour = self
            .behaviours
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Behaviour::Accept);

        match behaviour {
            Behaviour::Accept => {
                let (frames_tx, frames_rx) = mpsc::unbounded_channel();
                let _ = self.remotes_tx.send(MockRemote {
                    request: request.clone(),
                    frames: frames_tx,
                });
                Ok(Box::new(MockFrameSource { frames: frames_rx }))
            }
            Behaviour::Fail(message) => Err(TransportError::new(message)),
            Behaviour::Hang => std::future::pending().await,
        }
    }
}

struct MockFrameSource {
    frames: mpsc::UnboundedReceiver<Result<Frame, TransportError>>,
}

#[async_trait]
impl FrameSource for MockFrameSource {
    async fn next_frame(&mut self) -> Option<Result<Frame, TransportError>> {
        self.frames.recv().await
    }

    async fn close(&mut self) {
        self.frames.close();
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Heard {
    Event(DomainEvent),
    Error(StreamingError),
}

/// Listener forwarding everything into a channel
pub struct ChannelListener(pub mpsc::UnboundedSender<Heard>);

impl ChannelListener {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Heard>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self(tx)), rx)
    }
}

impl StreamListener for ChannelListener {
    fn on_event(&self, event: DomainEvent) {
        let _ = self.0.send(Heard::Event(event));
    }

    fn on_error(&self, error: StreamingError) {
        let _ = self.0.send(Heard::Error(error));
    }
}

pub async fn recv<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for a message")
        .expect("channel closed")
}

/// Give in-flight tasks a moment, then assert nothing arrived
pub async fn assert_silent<T: std::fmt::Debug>(rx: &mut mpsc::UnboundedReceiver<T>) {
    tokio::time::sleep(Duration::from_millis(50)).await;
    if let Ok(message) = rx.try_recv() {
        panic!("unexpected message: {:?}", message);
    }
}

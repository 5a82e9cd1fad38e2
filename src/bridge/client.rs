// src/bridge/client.rs

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use tokio::sync::mpsc;

/// Identity of a connected client for the lifetime of its connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub u64);

impl ClientId {
    /// Process-unique id for a new connection.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        ClientId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// A connected live-reload client.
///
/// `send` must not block; a failed send is reported to the bridge, which logs
/// it and moves on to the next client.
pub trait Client: Send + Sync + fmt::Debug {
    fn id(&self) -> ClientId;
    fn send(&self, frame: &str) -> Result<()>;
}

/// Client backed by an unbounded channel; the receiving half is drained by
/// the transport (e.g. a websocket writer task).
#[derive(Debug, Clone)]
pub struct ChannelClient {
    id: ClientId,
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelClient {
    pub fn new(id: ClientId) -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { id, tx }, rx)
    }
}

impl Client for ChannelClient {
    fn id(&self) -> ClientId {
        self.id
    }

    fn send(&self, frame: &str) -> Result<()> {
        self.tx
            .send(frame.to_string())
            .ok()
            .with_context(|| format!("{} connection closed", self.id))
    }
}

// src/bridge/mod.rs

//! Notification bridge between the build coordinator and live-reload clients.
//!
//! Broadcasts are queued until the first client ever connects; that
//! connection flushes the queue in order and switches the bridge to live
//! delivery for the rest of the process. Later joiners only get the most
//! recent compile status replayed to them.
//!
//! - [`message`] defines the wire envelope and known message kinds.
//! - [`client`] defines the `Client` trait and the channel-backed client.
//! - [`socket`] exposes the bridge as a websocket endpoint.

pub mod client;
pub mod message;
pub mod socket;

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::paths::PathNormalizer;
use crate::types::{now_millis, Timestamp};

pub use client::{ChannelClient, Client, ClientId};
pub use message::{BridgeMessage, EnvelopeError};

/// Default cap on frames held before the first connection.
pub const DEFAULT_PENDING_LIMIT: usize = 1024;

pub type MessageHandler = Box<dyn FnMut(&Map<String, Value>) + Send>;

/// Token returned by [`NotificationBridge::on`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// What happened to a broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// No client has connected yet; the frame waits in the pending queue.
    Queued,
    /// Sent to the connected clients.
    Sent { delivered: usize, failed: usize },
}

/// One-shot latch: `Queueing` until the first connection, `Live` afterwards.
#[derive(Debug)]
enum Delivery {
    Queueing { pending: VecDeque<String> },
    Live,
}

#[derive(Debug, Clone)]
struct LastStatus {
    timestamp: Timestamp,
    frame: String,
}

pub struct NotificationBridge {
    normalizer: PathNormalizer,
    delivery: Delivery,
    clients: Vec<Arc<dyn Client>>,
    pending_limit: usize,
    last_status: Option<LastStatus>,
    handlers: HashMap<String, Vec<(HandlerId, MessageHandler)>>,
    next_handler: u64,
}

impl fmt::Debug for NotificationBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationBridge")
            .field("delivery", &self.delivery)
            .field("clients", &self.clients.len())
            .field("pending_limit", &self.pending_limit)
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl NotificationBridge {
    pub fn new(normalizer: PathNormalizer) -> Self {
        Self {
            normalizer,
            delivery: Delivery::Queueing {
                pending: VecDeque::new(),
            },
            clients: Vec::new(),
            pending_limit: DEFAULT_PENDING_LIMIT,
            last_status: None,
            handlers: HashMap::new(),
            next_handler: 0,
        }
    }

    /// Cap the pre-connection queue. Values below 1 are treated as 1.
    pub fn with_pending_limit(mut self, limit: usize) -> Self {
        self.pending_limit = limit.max(1);
        self
    }

    pub fn has_connected(&self) -> bool {
        matches!(self.delivery, Delivery::Live)
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn pending_len(&self) -> usize {
        match &self.delivery {
            Delivery::Queueing { pending } => pending.len(),
            Delivery::Live => 0,
        }
    }

    /// Frame currently held for replay to late joiners.
    pub fn last_status(&self) -> Option<&str> {
        self.last_status.as_ref().map(|s| s.frame.as_str())
    }

    /// Broadcast `kind` with `payload`, stamped with the current time.
    ///
    /// A non-object payload is carried under a `data` field.
    pub fn broadcast(&mut self, kind: &str, payload: Value) -> Dispatch {
        self.broadcast_at(kind, payload, now_millis())
    }

    pub fn broadcast_at(&mut self, kind: &str, payload: Value, timestamp: Timestamp) -> Dispatch {
        let payload = match payload {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("data".to_string(), other);
                map
            }
        };

        let mut message = BridgeMessage::at(kind, payload, timestamp);
        message.format_for(&self.normalizer);
        let frame = message.to_frame();

        if message.is_status() {
            self.remember_status(timestamp, &frame);
        }

        debug!(kind, frame = %frame, "bridge message");

        match &mut self.delivery {
            Delivery::Queueing { pending } => {
                if pending.len() >= self.pending_limit {
                    pending.pop_front();
                    warn!(
                        limit = self.pending_limit,
                        "bridge queue full; dropping oldest pending message"
                    );
                }
                pending.push_back(frame);
                Dispatch::Queued
            }
            Delivery::Live => {
                let (delivered, failed) = send_to_all(&self.clients, &frame);
                Dispatch::Sent { delivered, failed }
            }
        }
    }

    // Later timestamp wins; equal timestamps favour the later broadcast.
    fn remember_status(&mut self, timestamp: Timestamp, frame: &str) {
        let newer = self
            .last_status
            .as_ref()
            .is_none_or(|current| timestamp >= current.timestamp);

        if newer {
            self.last_status = Some(LastStatus {
                timestamp,
                frame: frame.to_string(),
            });
        }
    }

    /// Register a newly connected client.
    ///
    /// The first connection ever flushes the pending queue to every member in
    /// enqueue order. The last status message is then replayed to this
    /// client alone, unless the flush already delivered it.
    pub fn connect(&mut self, client: Arc<dyn Client>) {
        let id = client.id();
        self.clients.push(Arc::clone(&client));
        info!(client = %id, clients = self.clients.len(), "bridge client connected");

        let flushed = match std::mem::replace(&mut self.delivery, Delivery::Live) {
            Delivery::Queueing { pending } => {
                info!(pending = pending.len(), "first bridge client; flushing queue");
                for frame in &pending {
                    send_to_all(&self.clients, frame);
                }
                pending
            }
            Delivery::Live => VecDeque::new(),
        };

        if let Some(status) = &self.last_status {
            if !flushed.contains(&status.frame) {
                debug!(client = %id, "replaying last status");
                if let Err(err) = client.send(&status.frame) {
                    warn!(client = %id, error = %err, "failed to replay last status");
                }
            }
        }
    }

    /// Drop a client. Delivery stays live even if no client remains.
    pub fn disconnect(&mut self, id: ClientId) -> bool {
        let before = self.clients.len();
        self.clients.retain(|c| c.id() != id);
        let removed = self.clients.len() != before;
        if removed {
            info!(client = %id, clients = self.clients.len(), "bridge client disconnected");
        }
        removed
    }

    /// Register a handler for inbound messages tagged `kind`.
    pub fn on(&mut self, kind: impl Into<String>, handler: MessageHandler) -> HandlerId {
        let id = HandlerId(self.next_handler);
        self.next_handler += 1;
        self.handlers.entry(kind.into()).or_default().push((id, handler));
        id
    }

    pub fn off(&mut self, id: HandlerId) -> bool {
        let mut removed = false;
        for handlers in self.handlers.values_mut() {
            let before = handlers.len();
            handlers.retain(|(hid, _)| *hid != id);
            removed |= handlers.len() != before;
        }
        self.handlers.retain(|_, handlers| !handlers.is_empty());
        removed
    }

    /// Parse and dispatch one inbound frame. Malformed frames are logged and
    /// dropped. Returns how many handlers ran.
    pub fn handle_client_message(&mut self, raw: &str) -> usize {
        let message = match BridgeMessage::parse(raw) {
            Ok(message) => message,
            Err(err) => {
                warn!(error = %err, "dropping malformed client message");
                return 0;
            }
        };

        let Some(handlers) = self.handlers.get_mut(&message.kind) else {
            debug!(kind = %message.kind, "no handler for client message");
            return 0;
        };

        for (_, handler) in handlers.iter_mut() {
            handler(&message.payload);
        }
        handlers.len()
    }
}

fn send_to_all(clients: &[Arc<dyn Client>], frame: &str) -> (usize, usize) {
    let mut delivered = 0;
    let mut failed = 0;
    for client in clients {
        match client.send(frame) {
            Ok(()) => delivered += 1,
            Err(err) => {
                failed += 1;
                warn!(client = %client.id(), error = %err, "failed to deliver bridge message");
            }
        }
    }
    (delivered, failed)
}

use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use buildrelay::bridge::{Client, ClientId};
use serde_json::Value;

/// Bridge client that keeps every frame it receives.
#[derive(Debug, Clone)]
pub struct RecordingClient {
    id: ClientId,
    frames: Arc<Mutex<Vec<String>>>,
}

impl RecordingClient {
    pub fn new(id: u64) -> Self {
        Self {
            id: ClientId(id),
            frames: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn frames(&self) -> Vec<String> {
        self.frames.lock().unwrap().clone()
    }

    /// Parsed frames.
    pub fn messages(&self) -> Vec<Value> {
        self.frames()
            .iter()
            .map(|f| serde_json::from_str(f).expect("frame is valid JSON"))
            .collect()
    }

    /// The `type` tag of every frame, in arrival order.
    pub fn kinds(&self) -> Vec<String> {
        self.messages()
            .iter()
            .map(|m| m["type"].as_str().unwrap_or_default().to_string())
            .collect()
    }
}

impl Client for RecordingClient {
    fn id(&self) -> ClientId {
        self.id
    }

    fn send(&self, frame: &str) -> Result<()> {
        self.frames.lock().unwrap().push(frame.to_string());
        Ok(())
    }
}

/// Bridge client whose every send fails.
#[derive(Debug, Clone)]
pub struct FailingClient {
    id: ClientId,
}

impl FailingClient {
    pub fn new(id: u64) -> Self {
        Self { id: ClientId(id) }
    }
}

impl Client for FailingClient {
    fn id(&self) -> ClientId {
        self.id
    }

    fn send(&self, _frame: &str) -> Result<()> {
        bail!("connection reset")
    }
}

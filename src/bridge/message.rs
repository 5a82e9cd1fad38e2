// src/bridge/message.rs

//! Wire envelope for bridge messages.
//!
//! Both directions use one JSON object per frame:
//! `{ "type": string, "timestamp": number, ...payload-fields }`.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::paths::PathNormalizer;
use crate::types::{now_millis, Timestamp};

pub const COMPILE_ERROR: &str = "compile:error";
pub const COMPILE_SUCCESS: &str = "compile:success";
pub const SCRIPT_ADD: &str = "script:add";
pub const PACKAGE_INSTALL: &str = "package:install";
pub const PACKAGE_ERROR: &str = "package:error";
pub const PACKAGE_INSTALLED: &str = "package:installed";
pub const PACKAGES_RELOAD: &str = "packages:reload";
pub const VIEW_LOCATIONS: &str = "view:locations";

/// Inbound: a client-side log line.
pub const CLIENT_LOG: &str = "client:log";

const TYPE_KEY: &str = "type";
const LEGACY_TYPE_KEY: &str = "_type";
const TIMESTAMP_KEY: &str = "timestamp";

/// Malformed inbound frame.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("envelope must be a JSON object")]
    NotAnObject,

    #[error("envelope has no string `type` field")]
    MissingType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BridgeMessage {
    pub kind: String,
    pub timestamp: Timestamp,
    pub payload: Map<String, Value>,
}

impl BridgeMessage {
    pub fn at(kind: impl Into<String>, payload: Map<String, Value>, timestamp: Timestamp) -> Self {
        Self {
            kind: kind.into(),
            timestamp,
            payload,
        }
    }

    /// Success-or-error class messages are candidates for the replay slot.
    pub fn is_status(&self) -> bool {
        is_status_kind(&self.kind)
    }

    /// Apply per-type formatting before the message goes on the wire.
    ///
    /// `compile:error` has its `error.file` rewritten relative to the
    /// project base directory.
    pub fn format_for(&mut self, normalizer: &PathNormalizer) {
        if self.kind != COMPILE_ERROR {
            return;
        }

        if let Some(Value::Object(error)) = self.payload.get_mut("error") {
            if let Some(Value::String(file)) = error.get_mut("file") {
                *file = normalizer.display_relative(file);
            }
        }
    }

    /// Serialize to a single text frame. Payload fields named `type` or
    /// `timestamp` are overridden by the envelope.
    pub fn to_frame(&self) -> String {
        let mut obj = Map::with_capacity(self.payload.len() + 2);
        obj.insert(TYPE_KEY.to_string(), Value::String(self.kind.clone()));
        obj.insert(TIMESTAMP_KEY.to_string(), Value::from(self.timestamp));
        for (key, value) in &self.payload {
            if key != TYPE_KEY && key != TIMESTAMP_KEY {
                obj.insert(key.clone(), value.clone());
            }
        }
        Value::Object(obj).to_string()
    }

    /// Parse an inbound frame. The legacy `_type` tag is accepted as well.
    pub fn parse(raw: &str) -> Result<Self, EnvelopeError> {
        let value: Value = serde_json::from_str(raw)?;
        let Value::Object(mut obj) = value else {
            return Err(EnvelopeError::NotAnObject);
        };

        let kind = match obj.remove(TYPE_KEY).or_else(|| obj.remove(LEGACY_TYPE_KEY)) {
            Some(Value::String(kind)) => kind,
            _ => return Err(EnvelopeError::MissingType),
        };

        let timestamp = obj
            .remove(TIMESTAMP_KEY)
            .and_then(|v| v.as_u64())
            .unwrap_or_else(now_millis);

        Ok(Self {
            kind,
            timestamp,
            payload: obj,
        })
    }
}

pub fn is_status_kind(kind: &str) -> bool {
    kind == COMPILE_ERROR || kind == COMPILE_SUCCESS
}

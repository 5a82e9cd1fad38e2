// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::bridge::DEFAULT_PENDING_LIMIT;
use crate::cache::STATE_FILE_PATH;

/// Configuration as read from a TOML file, before validation.
///
/// ```toml
/// [project]
/// root = "."
/// strip_prefixes = [".build/out/"]
///
/// [watch]
/// include = ["**/*.js"]
/// exclude = ["node_modules/**"]
///
/// [build]
/// cmd = "babel {file} --out-file .buildrelay/out/{name}"
///
/// [timing]
/// rescan_debounce_ms = 400
///
/// [bridge]
/// port = 6283
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub project: ProjectSection,
    #[serde(default)]
    pub watch: WatchSection,
    #[serde(default)]
    pub build: BuildSection,
    #[serde(default)]
    pub timing: TimingSection,
    #[serde(default)]
    pub bridge: BridgeSection,
}

/// Validated configuration. Obtain one through `TryFrom<RawConfigFile>`.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigFile {
    pub project: ProjectSection,
    pub watch: WatchSection,
    pub build: BuildSection,
    pub timing: TimingSection,
    pub bridge: BridgeSection,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            project: raw.project,
            watch: raw.watch,
            build: raw.build,
            timing: raw.timing,
            bridge: raw.bridge,
        }
    }
}

/// `[project]` section.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProjectSection {
    /// Base directory every canonical name is relative to. A relative value
    /// is resolved against the directory holding the config file.
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Leading segments removed from canonical names (first match wins).
    #[serde(default)]
    pub strip_prefixes: Vec<String>,

    /// Where the cache snapshot is persisted, relative to `root`.
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_state_file() -> PathBuf {
    PathBuf::from(STATE_FILE_PATH)
}

impl Default for ProjectSection {
    fn default() -> Self {
        Self {
            root: default_root(),
            strip_prefixes: Vec::new(),
            state_file: default_state_file(),
        }
    }
}

/// `[watch]` section.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WatchSection {
    #[serde(default = "default_include")]
    pub include: Vec<String>,
    #[serde(default = "default_exclude")]
    pub exclude: Vec<String>,
}

fn default_include() -> Vec<String> {
    vec!["**/*.js".to_string()]
}

fn default_exclude() -> Vec<String> {
    vec!["node_modules/**".to_string(), ".buildrelay/**".to_string()]
}

impl Default for WatchSection {
    fn default() -> Self {
        Self {
            include: default_include(),
            exclude: default_exclude(),
        }
    }
}

/// `[build]` section.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BuildSection {
    /// Shell command run per file; `{file}` is the absolute path and
    /// `{name}` the canonical name. Without one every build succeeds.
    #[serde(default)]
    pub cmd: Option<String>,
}

/// `[timing]` section, all values in milliseconds.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimingSection {
    #[serde(default = "default_rescan_debounce_ms")]
    pub rescan_debounce_ms: u64,
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    #[serde(default = "default_scan_timeout_ms")]
    pub scan_timeout_ms: u64,
}

fn default_rescan_debounce_ms() -> u64 {
    400
}

fn default_settle_ms() -> u64 {
    450
}

fn default_scan_timeout_ms() -> u64 {
    5000
}

impl Default for TimingSection {
    fn default() -> Self {
        Self {
            rescan_debounce_ms: default_rescan_debounce_ms(),
            settle_ms: default_settle_ms(),
            scan_timeout_ms: default_scan_timeout_ms(),
        }
    }
}

impl TimingSection {
    pub fn rescan_debounce(&self) -> Duration {
        Duration::from_millis(self.rescan_debounce_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_millis(self.scan_timeout_ms)
    }
}

/// `[bridge]` section.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BridgeSection {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Frames kept before the first client connects.
    #[serde(default = "default_pending_limit")]
    pub pending_limit: usize,
}

fn default_enabled() -> bool {
    true
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    6283
}

fn default_pending_limit() -> usize {
    DEFAULT_PENDING_LIMIT
}

impl Default for BridgeSection {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            host: default_host(),
            port: default_port(),
            pending_limit: default_pending_limit(),
        }
    }
}

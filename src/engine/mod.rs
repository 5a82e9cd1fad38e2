// src/engine/mod.rs

//! Build coordinator.
//!
//! This module ties together:
//! - the file state cache
//! - the notification bridge
//! - the first-build gate
//! - the main runtime event loop that reacts to:
//!   - file-change events from the watcher
//!   - rescan results
//!   - build completions
//!   - client connections and inbound messages
//!   - shutdown signals
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`]. Only the core touches the cache and the
//! bridge, which makes it the single writer for both.

use std::path::PathBuf;
use std::sync::Arc;

use crate::bridge::{Client, ClientId};
use crate::cache::CompileError;
use crate::rescan::{ScanFailure, ScanResult};
use crate::types::{FileEventKind, FileName, Timestamp};

/// Monotonic id of a dispatched build.
pub type JobId = u64;

/// Outcome of one build as reported by the build backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    Success,
    Failed(CompileError),
}

/// One file to build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildJob {
    pub job: JobId,
    pub name: FileName,
    pub path: PathBuf,
    pub content_hash: Option<String>,
    pub started_at: Timestamp,
}

/// Runtime options used by both the core and the async shell.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeOptions {
    /// If true, exit once the first build has settled (used for `--once`).
    pub exit_after_first_build: bool,
}

/// Events flowing into the runtime from watchers, scanners, builders and
/// the bridge transport.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// A watched file was added, changed or removed.
    FileChanged {
        path: PathBuf,
        kind: FileEventKind,
        content_hash: Option<String>,
    },
    /// The startup scan has reported every file it found.
    InitialScanComplete { files: usize },
    /// A debounced rescan finished.
    FileScanned { name: FileName, result: ScanResult },
    /// A debounced rescan could not produce a result.
    ScanFailed {
        name: FileName,
        path: PathBuf,
        failure: ScanFailure,
    },
    /// The build backend finished a job.
    BuildFinished {
        name: FileName,
        job: JobId,
        outcome: BuildOutcome,
    },
    /// The first-build settle timer fired.
    SettleElapsed,
    ClientConnected { client: Arc<dyn Client> },
    ClientMessage { client: ClientId, raw: String },
    ClientDisconnected { client: ClientId },
    /// Graceful shutdown requested (e.g. Ctrl-C).
    ShutdownRequested,
}

pub mod core;
pub mod event_handlers;
pub mod gate;
pub mod runtime;

pub use core::CoreRuntime;
pub use event_handlers::{CoreCommand, CoreStep};
pub use gate::{BuildGate, GatePhase};
pub use runtime::{Runtime, RuntimeTiming};

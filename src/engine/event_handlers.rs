// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde_json::json;
use tracing::{debug, info, warn};

use crate::bridge::message::{COMPILE_ERROR, COMPILE_SUCCESS, SCRIPT_ADD, VIEW_LOCATIONS};
use crate::bridge::NotificationBridge;
use crate::cache::{CacheStore, CompileError};
use crate::engine::gate::BuildGate;
use crate::engine::{BuildJob, BuildOutcome, JobId, RuntimeOptions};
use crate::paths::CanonicalName;
use crate::rescan::{ScanFailure, ScanResult};
use crate::types::{now_millis, FileEventKind, FileName, Timestamp};

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreCommand {
    /// (Re)arm the debounced dependency scan for a file.
    ScheduleRescan { name: FileName, path: PathBuf },
    /// Drop any pending scan for a file.
    CancelRescan { name: FileName },
    /// Send these jobs to the build backend.
    DispatchBuilds(Vec<BuildJob>),
    /// (Re)start the first-build settle timer.
    ArmSettleTimer,
    /// Write the current cache generation to the snapshot store.
    PersistSnapshot,
    /// Request that the process exits (used for `--once`).
    RequestExit,
}

/// Decision returned by the core after handling a single `RuntimeEvent`.
#[derive(Debug, Clone)]
pub struct CoreStep {
    /// Commands the IO shell should execute, in order.
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

impl CoreStep {
    pub fn with(commands: Vec<CoreCommand>) -> Self {
        Self {
            commands,
            keep_running: true,
        }
    }

    pub fn idle() -> Self {
        Self::with(Vec::new())
    }
}

#[derive(Debug, Clone)]
struct InFlight {
    job: JobId,
    content_hash: Option<String>,
    started_at: Timestamp,
}

/// Latest dispatched build per file.
///
/// Only the most recent job for a file may update the cache; completions
/// for older jobs are stale.
#[derive(Debug, Default)]
pub struct BuildTracker {
    next_job: JobId,
    in_flight: HashMap<FileName, InFlight>,
}

impl BuildTracker {
    fn start(&mut self, name: &str, path: &Path, content_hash: Option<String>) -> BuildJob {
        self.next_job += 1;
        let started_at = now_millis();
        self.in_flight.insert(
            name.to_string(),
            InFlight {
                job: self.next_job,
                content_hash: content_hash.clone(),
                started_at,
            },
        );

        BuildJob {
            job: self.next_job,
            name: name.to_string(),
            path: path.to_path_buf(),
            content_hash,
            started_at,
        }
    }

    /// Take the in-flight entry if `job` is the latest for `name`.
    fn finish(&mut self, name: &str, job: JobId) -> Option<InFlight> {
        match self.in_flight.get(name) {
            Some(current) if current.job == job => self.in_flight.remove(name),
            _ => None,
        }
    }

    fn forget(&mut self, name: &str) -> bool {
        self.in_flight.remove(name).is_some()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_idle(&self) -> bool {
        self.in_flight.is_empty()
    }
}

/// Handle an add/change/unlink event for one file.
///
/// During the initial batch, an added file whose content hash matches the
/// previous generation's error-free record takes that record back without
/// being rebuilt.
pub fn handle_file_changed(
    cache: &mut CacheStore,
    bridge: &mut NotificationBridge,
    gate: &BuildGate,
    builds: &mut BuildTracker,
    path: PathBuf,
    kind: FileEventKind,
    content_hash: Option<String>,
) -> CoreStep {
    let name = cache.name(&path);
    if name.is_empty() {
        debug!(?path, "ignoring event for empty file name");
        return CoreStep::idle();
    }

    gate.begin_building();
    let views_before = cache.view_locations();
    let mut commands = Vec::new();

    match kind {
        FileEventKind::Unlink => {
            cache.remove(&path);
            if builds.forget(&name) {
                debug!(file = %name, "dropping in-flight build for removed file");
            }
            commands.push(CoreCommand::CancelRescan { name });

            // A build dropped here never re-arms the timer on completion.
            if !gate.is_complete() {
                commands.push(CoreCommand::ArmSettleTimer);
            }
        }
        FileEventKind::Add | FileEventKind::Change => {
            if kind == FileEventKind::Add
                && !gate.is_complete()
                && unchanged_since_last_run(cache, &path, content_hash.as_deref())
            {
                cache.restore_previous(&path);
                info!(file = %name, "unchanged since last run; reusing previous record");
            } else {
                cache.add(&path);
                let job = builds.start(&name, &path, content_hash);
                debug!(file = %name, job = job.job, kind = kind.as_str(), "dispatching build");
                commands.push(CoreCommand::ScheduleRescan {
                    name,
                    path: path.clone(),
                });
                commands.push(CoreCommand::DispatchBuilds(vec![job]));
            }

            if !gate.is_complete() {
                commands.push(CoreCommand::ArmSettleTimer);
            }
        }
    }

    broadcast_views_if_changed(cache, bridge, &views_before);
    CoreStep::with(commands)
}

fn unchanged_since_last_run(cache: &CacheStore, path: &Path, content_hash: Option<&str>) -> bool {
    let Some(hash) = content_hash else {
        return false;
    };
    cache.get_previous(path).is_some_and(|previous| {
        previous.last_error.is_none() && previous.content_hash.as_deref() == Some(hash)
    })
}

/// The startup scan finished reporting files. An empty project has nothing
/// to wait for, so the settle timer starts right away.
pub fn handle_initial_scan_complete(gate: &BuildGate, files: usize) -> CoreStep {
    info!(files, "initial scan complete");
    if files == 0 && !gate.is_complete() {
        gate.begin_building();
        return CoreStep::with(vec![CoreCommand::ArmSettleTimer]);
    }
    CoreStep::idle()
}

/// Write a rescan result into the cache. Results for files that were removed
/// in the meantime are dropped.
pub fn handle_file_scanned(
    cache: &mut CacheStore,
    bridge: &mut NotificationBridge,
    name: FileName,
    result: ScanResult,
) -> CoreStep {
    if !cache.contains(CanonicalName(&name)) {
        debug!(file = %name, "scan result for untracked file; ignoring");
        return CoreStep::idle();
    }

    let views_before = cache.view_locations();

    cache.set_file_imports(CanonicalName(&name), result.imports);
    if let Some(views) = result.views {
        if let Err(err) = cache.set_views(CanonicalName(&name), views) {
            warn!(file = %name, error = %err, "failed to update views");
        }
    }
    if let Some(is_internal) = result.is_internal {
        cache.set_is_internal(CanonicalName(&name), is_internal);
    }

    broadcast_views_if_changed(cache, bridge, &views_before);
    CoreStep::idle()
}

/// A scan that timed out is a build error for the file; an unreadable file
/// is only logged (the watcher reports its removal separately).
pub fn handle_scan_failed(
    cache: &mut CacheStore,
    bridge: &mut NotificationBridge,
    name: FileName,
    path: PathBuf,
    failure: ScanFailure,
) -> CoreStep {
    match failure {
        ScanFailure::Unreadable(reason) => {
            warn!(file = %name, %reason, "rescan skipped; file unreadable");
        }
        ScanFailure::TimedOut(_) => {
            warn!(file = %name, "rescan timed out");
            if cache.contains(CanonicalName(&name)) {
                let error = CompileError {
                    message: failure.to_string(),
                    stack: None,
                    file: path.to_string_lossy().into_owned(),
                    timestamp: now_millis(),
                };
                cache.add_error(CanonicalName(&name), error.clone());
                bridge.broadcast(COMPILE_ERROR, json!({ "error": error }));
            }
        }
    }
    CoreStep::idle()
}

/// Handle a build completion.
///
/// Before the first build completes, successes are silent and only restart
/// the settle timer. Afterwards every success is announced with
/// `script:add` followed by `compile:success`. Errors are always broadcast.
pub fn handle_build_finished(
    cache: &mut CacheStore,
    bridge: &mut NotificationBridge,
    gate: &BuildGate,
    builds: &mut BuildTracker,
    name: FileName,
    job: JobId,
    outcome: BuildOutcome,
) -> CoreStep {
    let Some(finished) = builds.finish(&name, job) else {
        debug!(file = %name, job, "ignoring stale build result");
        return CoreStep::idle();
    };

    let mut commands = Vec::new();

    match outcome {
        BuildOutcome::Success => {
            cache.mark_built(CanonicalName(&name), now_millis());
            cache.set_content_hash(CanonicalName(&name), finished.content_hash);
            info!(file = %name, job, "build succeeded");

            if gate.is_complete() {
                let script = json!({ "name": name, "compiledAt": finished.started_at });
                bridge.broadcast(SCRIPT_ADD, script.clone());
                bridge.broadcast(COMPILE_SUCCESS, script);
            }
        }
        BuildOutcome::Failed(error) => {
            warn!(file = %name, job, message = %error.message, "build failed");
            cache.add_error(CanonicalName(&name), error.clone());
            bridge.broadcast(COMPILE_ERROR, json!({ "error": error }));
        }
    }

    if !gate.is_complete() {
        commands.push(CoreCommand::ArmSettleTimer);
    }

    CoreStep::with(commands)
}

/// The settle timer fired. The gate completes only when no build of the
/// initial batch is still running; otherwise the next completion re-arms
/// the timer.
pub fn handle_settle_elapsed(
    gate: &BuildGate,
    builds: &BuildTracker,
    options: &RuntimeOptions,
) -> CoreStep {
    if gate.is_complete() {
        return CoreStep::idle();
    }

    if !builds.is_idle() {
        debug!(in_flight = builds.in_flight(), "settle elapsed with builds in flight");
        return CoreStep::idle();
    }

    gate.complete();

    let mut commands = vec![CoreCommand::PersistSnapshot];
    let mut keep_running = true;
    if options.exit_after_first_build {
        commands.push(CoreCommand::RequestExit);
        keep_running = false;
    }

    CoreStep {
        commands,
        keep_running,
    }
}

fn broadcast_views_if_changed(
    cache: &CacheStore,
    bridge: &mut NotificationBridge,
    before: &BTreeMap<String, FileName>,
) {
    let after = cache.view_locations();
    if &after != before {
        debug!(views = after.len(), "view locations changed");
        bridge.broadcast(VIEW_LOCATIONS, json!({ "views": after }));
    }
}

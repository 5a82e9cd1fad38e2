// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! This module contains a synchronous, deterministic "core runtime" that
//! consumes [`RuntimeEvent`]s and produces:
//! - an updated cache / bridge / gate state
//! - a list of "commands" describing what the IO shell should do next
//!
//! The async/IO-heavy shell (`engine::runtime::Runtime`) is responsible for:
//! - reading events from channels
//! - arming rescan and settle timers
//! - sending `BuildJob`s to the build backend
//! - handling Ctrl+C / shutdown
//!
//! The core is intended to be unit tested without the shell: feed it events,
//! inspect the commands and the cache.

use tracing::{debug, info, warn};

use crate::bridge::NotificationBridge;
use crate::cache::{CacheEvent, CacheEventKind, CacheStore};
use crate::engine::event_handlers::{
    handle_build_finished, handle_file_changed, handle_file_scanned,
    handle_initial_scan_complete, handle_scan_failed, handle_settle_elapsed, BuildTracker,
    CoreCommand, CoreStep,
};
use crate::engine::gate::BuildGate;
use crate::engine::{RuntimeEvent, RuntimeOptions};

/// Pure core runtime state.
///
/// This owns:
/// - the file state cache
/// - the notification bridge
/// - the per-file build tracker
/// - a handle to the first-build gate
///
/// It has no channels and does not spawn anything.
#[derive(Debug)]
pub struct CoreRuntime {
    cache: CacheStore,
    bridge: NotificationBridge,
    gate: BuildGate,
    builds: BuildTracker,
    options: RuntimeOptions,
}

impl CoreRuntime {
    pub fn new(
        mut cache: CacheStore,
        bridge: NotificationBridge,
        gate: BuildGate,
        options: RuntimeOptions,
    ) -> Self {
        cache.subscribe(
            CacheEventKind::FileDeleted,
            Box::new(|event: &CacheEvent<'_>| {
                if let CacheEvent::FileDeleted { name, record, .. } = event {
                    info!(file = %name, views = record.views.len(), "file deleted");
                }
            }),
        );
        cache.subscribe(
            CacheEventKind::ViewDeleted,
            Box::new(|event: &CacheEvent<'_>| {
                if let CacheEvent::ViewDeleted { file, view } = event {
                    info!(file = %file, view = %view, "view deleted");
                }
            }),
        );

        Self {
            cache,
            bridge,
            gate,
            builds: BuildTracker::default(),
            options,
        }
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut CacheStore {
        &mut self.cache
    }

    pub fn bridge(&self) -> &NotificationBridge {
        &self.bridge
    }

    pub fn bridge_mut(&mut self) -> &mut NotificationBridge {
        &mut self.bridge
    }

    pub fn gate(&self) -> &BuildGate {
        &self.gate
    }

    /// Builds dispatched and not yet reported back.
    pub fn builds_in_flight(&self) -> usize {
        self.builds.in_flight()
    }

    /// Persist the current generation; failures are logged, not fatal.
    pub fn persist(&mut self) {
        if let Err(err) = self.cache.serialize() {
            warn!(error = %err, "failed to persist cache snapshot");
        }
    }

    /// Handle a single runtime event, updating core state and returning the
    /// resulting commands for the IO shell.
    pub fn step(&mut self, event: RuntimeEvent) -> CoreStep {
        match event {
            RuntimeEvent::FileChanged {
                path,
                kind,
                content_hash,
            } => handle_file_changed(
                &mut self.cache,
                &mut self.bridge,
                &self.gate,
                &mut self.builds,
                path,
                kind,
                content_hash,
            ),
            RuntimeEvent::InitialScanComplete { files } => {
                handle_initial_scan_complete(&self.gate, files)
            }
            RuntimeEvent::FileScanned { name, result } => {
                handle_file_scanned(&mut self.cache, &mut self.bridge, name, result)
            }
            RuntimeEvent::ScanFailed {
                name,
                path,
                failure,
            } => handle_scan_failed(&mut self.cache, &mut self.bridge, name, path, failure),
            RuntimeEvent::BuildFinished { name, job, outcome } => handle_build_finished(
                &mut self.cache,
                &mut self.bridge,
                &self.gate,
                &mut self.builds,
                name,
                job,
                outcome,
            ),
            RuntimeEvent::SettleElapsed => {
                handle_settle_elapsed(&self.gate, &self.builds, &self.options)
            }
            RuntimeEvent::ClientConnected { client } => {
                self.bridge.connect(client);
                CoreStep::idle()
            }
            RuntimeEvent::ClientMessage { client, raw } => {
                let handled = self.bridge.handle_client_message(&raw);
                debug!(client = %client, handled, "client message dispatched");
                CoreStep::idle()
            }
            RuntimeEvent::ClientDisconnected { client } => {
                self.bridge.disconnect(client);
                CoreStep::idle()
            }
            RuntimeEvent::ShutdownRequested => CoreStep {
                commands: vec![CoreCommand::PersistSnapshot],
                keep_running: false,
            },
        }
    }
}

// src/engine/runtime.rs

use std::fmt;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::errors::Result;
use crate::exec::BuildBackend;
use crate::rescan::{Debouncer, Rescanner};

use super::core::CoreRuntime;
use super::{BuildJob, CoreCommand, RuntimeEvent};

/// Timers owned by the IO shell.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeTiming {
    /// Quiet period after the last event of the initial batch before the
    /// first build counts as complete.
    pub settle: Duration,
}

impl Default for RuntimeTiming {
    fn default() -> Self {
        Self {
            settle: Duration::from_millis(450),
        }
    }
}

/// Drives the build coordinator in response to `RuntimeEvent`s, and
/// delegates builds to a `BuildBackend`.
///
/// This is a pure IO shell around `CoreRuntime`, which contains all the
/// runtime semantics. This struct handles async IO: reading events from
/// channels, arming timers and dispatching builds.
pub struct Runtime<B: BuildBackend> {
    core: CoreRuntime,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    event_tx: mpsc::Sender<RuntimeEvent>,
    rescanner: Rescanner,
    backend: B,
    settle_timer: Debouncer<()>,
    timing: RuntimeTiming,
}

impl<B: BuildBackend> fmt::Debug for Runtime<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .field("rescanner", &self.rescanner)
            .field("timing", &self.timing)
            .finish_non_exhaustive()
    }
}

impl<B: BuildBackend> Runtime<B> {
    /// `event_tx` must feed `event_rx`; timers post back through it.
    pub fn new(
        core: CoreRuntime,
        event_rx: mpsc::Receiver<RuntimeEvent>,
        event_tx: mpsc::Sender<RuntimeEvent>,
        rescanner: Rescanner,
        backend: B,
        timing: RuntimeTiming,
    ) -> Self {
        Self {
            core,
            event_rx,
            event_tx,
            rescanner,
            backend,
            settle_timer: Debouncer::new(),
            timing,
        }
    }

    /// Main event loop.
    ///
    /// - Consumes `RuntimeEvent`s from `event_rx`.
    /// - Feeds them into the core runtime.
    /// - Executes commands returned by the core (timers, builds, exit).
    ///
    /// Returns the core so callers can inspect the final cache state.
    pub async fn run(mut self) -> Result<CoreRuntime> {
        info!("buildrelay runtime started");

        loop {
            let event = match self.event_rx.recv().await {
                Some(e) => e,
                None => {
                    info!("runtime event channel closed; exiting");
                    break;
                }
            };

            debug!(?event, "runtime received event");

            let step = self.core.step(event);

            for command in step.commands {
                self.execute_command(command).await?;
            }

            if !step.keep_running {
                info!("core requested exit; stopping runtime");
                break;
            }
        }

        info!("runtime exiting");
        Ok(self.core)
    }

    /// Execute a single command from the core.
    async fn execute_command(&mut self, command: CoreCommand) -> Result<()> {
        match command {
            CoreCommand::ScheduleRescan { name, path } => {
                self.rescanner.schedule(name, path);
            }
            CoreCommand::CancelRescan { name } => {
                self.rescanner.cancel(&name);
            }
            CoreCommand::DispatchBuilds(jobs) => {
                self.dispatch(jobs).await?;
            }
            CoreCommand::ArmSettleTimer => {
                let tx = self.event_tx.clone();
                self.settle_timer.arm((), self.timing.settle, async move {
                    let _ = tx.send(RuntimeEvent::SettleElapsed).await;
                });
            }
            CoreCommand::PersistSnapshot => {
                self.core.persist();
            }
            CoreCommand::RequestExit => {
                // The core already returns keep_running=false alongside this.
                info!("core issued RequestExit command");
            }
        }
        Ok(())
    }

    async fn dispatch(&mut self, jobs: Vec<BuildJob>) -> Result<()> {
        if jobs.is_empty() {
            return Ok(());
        }

        let names: Vec<_> = jobs.iter().map(|j| j.name.as_str()).collect();
        let ids: Vec<_> = jobs.iter().map(|j| j.job).collect();
        debug!(?names, ?ids, "dispatching builds");

        self.backend.dispatch_builds(jobs).await
    }
}

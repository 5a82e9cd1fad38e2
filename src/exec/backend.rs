// src/exec/backend.rs

//! Pluggable build backend abstraction.
//!
//! The runtime talks to a `BuildBackend` instead of a raw mpsc sender.
//! This makes it easy to swap in a fake builder in tests while keeping the
//! production implementation in [`executor_loop`](super::executor_loop).
//!
//! - `CommandBackend` runs the configured shell command per file.
//! - Tests can provide their own `BuildBackend` that, for example, records
//!   which jobs were dispatched and directly emits `BuildFinished` events.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;

use crate::engine::{BuildJob, RuntimeEvent};
use crate::errors::{Error, Result};

use super::executor_loop::spawn_builder;

/// Trait abstracting how build jobs are executed.
pub trait BuildBackend: Send {
    /// Dispatch the given jobs. Completion is reported asynchronously as
    /// `RuntimeEvent::BuildFinished`.
    fn dispatch_builds(
        &mut self,
        jobs: Vec<BuildJob>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Build backend used in production.
///
/// Wraps the builder loop from [`spawn_builder`]; `dispatch_builds` forwards
/// jobs to it over an mpsc channel.
pub struct CommandBackend {
    tx: mpsc::Sender<BuildJob>,
}

impl CommandBackend {
    /// `cmd` is the `[build].cmd` template; `None` makes every build succeed
    /// immediately.
    ///
    /// This spawns the background builder loop immediately.
    pub fn new(cmd: Option<String>, runtime_tx: mpsc::Sender<RuntimeEvent>) -> Self {
        let tx = spawn_builder(cmd, runtime_tx);
        Self { tx }
    }
}

impl BuildBackend for CommandBackend {
    fn dispatch_builds(
        &mut self,
        jobs: Vec<BuildJob>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.tx.clone();

        Box::pin(async move {
            for job in jobs {
                tx.send(job).await.map_err(Error::from)?;
            }
            Ok(())
        })
    }
}

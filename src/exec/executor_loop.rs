// src/exec/executor_loop.rs

//! Builder loop that manages running build processes.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::engine::{BuildJob, RuntimeEvent};
use crate::exec::build_runner::run_build;
use crate::types::FileName;

/// Internal handle for a currently-running build.
///
/// - `cancel` stops the process when a newer job for the same file arrives.
/// - `handle` is the Tokio task that is actually running the command.
struct ActiveBuild {
    job: u64,
    cancel: Option<oneshot::Sender<()>>,
    handle: tokio::task::JoinHandle<()>,
}

/// Spawn the background builder loop.
///
/// Each job runs in its own Tokio task, and **per file there is never more
/// than one build running at the same time**: a job for a file whose
/// previous build is still running cancels (kills) that build first. The
/// cancelled build reports nothing.
pub fn spawn_builder(
    cmd: Option<String>,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
) -> mpsc::Sender<BuildJob> {
    let (tx, mut rx) = mpsc::channel::<BuildJob>(32);
    let cmd: Option<Arc<str>> = cmd.map(Arc::from);

    tokio::spawn(async move {
        info!("builder loop started");

        let mut active: HashMap<FileName, ActiveBuild> = HashMap::new();

        while let Some(job) = rx.recv().await {
            active.retain(|_, build| !build.handle.is_finished());
            handle_job(job, cmd.clone(), &mut active, &runtime_tx);
        }

        info!("builder loop finished (channel closed)");
    });

    tx
}

fn handle_job(
    job: BuildJob,
    cmd: Option<Arc<str>>,
    active: &mut HashMap<FileName, ActiveBuild>,
    runtime_tx: &mpsc::Sender<RuntimeEvent>,
) {
    let name = job.name.clone();

    if let Some(existing) = active.get_mut(&name) {
        cancel_existing_build(&job, existing);
    }

    let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
    let rt_tx = runtime_tx.clone();
    let id = job.job;
    let spawn_name = name.clone();

    let handle = tokio::spawn(async move {
        run_build(job, cmd, rt_tx, cancel_rx).await;
        debug!(file = %spawn_name, job = id, "build runner future finished");
    });

    active.insert(
        name,
        ActiveBuild {
            job: id,
            cancel: Some(cancel_tx),
            handle,
        },
    );
}

fn cancel_existing_build(job: &BuildJob, existing: &mut ActiveBuild) {
    info!(
        file = %job.name,
        job = job.job,
        previous = existing.job,
        "newer build requested; cancelling running build"
    );

    if let Some(cancel) = existing.cancel.take() {
        if cancel.send(()).is_err() {
            debug!(
                file = %job.name,
                previous = existing.job,
                "previous build already finished while cancelling"
            );
        }
    }
}

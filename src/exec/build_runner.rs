// src/exec/build_runner.rs

//! Individual build process runner.

use std::process::Stdio;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::cache::CompileError;
use crate::engine::{BuildJob, BuildOutcome, RuntimeEvent};
use crate::types::now_millis;

/// Substitute `{file}` (absolute path) and `{name}` (canonical name).
pub fn render_command(template: &str, job: &BuildJob) -> String {
    template
        .replace("{file}", &job.path.to_string_lossy())
        .replace("{name}", &job.name)
}

/// Run one build and report `BuildFinished`.
///
/// - With no command configured the build succeeds immediately.
/// - If the cancel channel fires, the child is killed and **no**
///   `BuildFinished` is sent for that job.
/// - A process that cannot be spawned counts as a failed build.
pub async fn run_build(
    job: BuildJob,
    cmd: Option<Arc<str>>,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    cancel_rx: oneshot::Receiver<()>,
) {
    let name = job.name.clone();
    let id = job.job;

    let outcome = match cmd {
        None => Some(BuildOutcome::Success),
        Some(template) => match run_build_inner(&job, &template, cancel_rx).await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(file = %name, job = id, error = %err, "build execution error");
                Some(BuildOutcome::Failed(CompileError {
                    message: format!("{err:#}"),
                    stack: None,
                    file: job.path.to_string_lossy().into_owned(),
                    timestamp: now_millis(),
                }))
            }
        },
    };

    let Some(outcome) = outcome else {
        return;
    };

    if runtime_tx
        .send(RuntimeEvent::BuildFinished {
            name,
            job: id,
            outcome,
        })
        .await
        .is_err()
    {
        debug!(job = id, "runtime gone before build result could be delivered");
    }
}

/// `Ok(None)` means the build was cancelled.
async fn run_build_inner(
    job: &BuildJob,
    template: &str,
    mut cancel_rx: oneshot::Receiver<()>,
) -> Result<Option<BuildOutcome>> {
    let command_line = render_command(template, job);
    info!(file = %job.name, job = job.job, cmd = %command_line, "starting build");

    let mut cmd = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(&command_line);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(&command_line);
        c
    };

    cmd.stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning build for '{}'", job.name))?;

    // Drain stderr concurrently so a chatty build cannot block on a full pipe.
    let stderr_task = child.stderr.take().map(|mut stderr| {
        tokio::spawn(async move {
            let mut buf = String::new();
            let _ = stderr.read_to_string(&mut buf).await;
            buf
        })
    });

    tokio::select! {
        status_res = child.wait() => {
            let status = status_res
                .with_context(|| format!("waiting for build of '{}'", job.name))?;

            let stderr = match stderr_task {
                Some(task) => task.await.unwrap_or_default(),
                None => String::new(),
            };

            info!(
                file = %job.name,
                job = job.job,
                exit_code = status.code().unwrap_or(-1),
                success = status.success(),
                "build process exited"
            );

            if status.success() {
                return Ok(Some(BuildOutcome::Success));
            }

            let message = stderr
                .lines()
                .find(|line| !line.trim().is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| format!("build exited with status {}", status.code().unwrap_or(-1)));
            let stack = (!stderr.trim().is_empty()).then(|| stderr.trim_end().to_string());

            Ok(Some(BuildOutcome::Failed(CompileError {
                message,
                stack,
                file: job.path.to_string_lossy().into_owned(),
                timestamp: now_millis(),
            })))
        }

        cancel = &mut cancel_rx => {
            match cancel {
                Ok(()) => {
                    info!(file = %job.name, job = job.job, "build cancelled; killing process");
                    if let Err(e) = child.kill().await {
                        warn!(file = %job.name, job = job.job, error = %e, "failed to kill build process");
                    }
                }
                Err(_) => {
                    debug!(file = %job.name, job = job.job, "cancel channel closed; dropping build");
                }
            }
            Ok(None)
        }
    }
}

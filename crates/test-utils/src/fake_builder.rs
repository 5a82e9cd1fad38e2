use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use buildrelay::cache::CompileError;
use buildrelay::engine::{BuildJob, BuildOutcome, RuntimeEvent};
use buildrelay::errors::Result;
use buildrelay::exec::BuildBackend;
use tokio::sync::mpsc;

/// A fake build backend that:
/// - records every dispatched job
/// - immediately reports `BuildFinished`, `Success` unless a failure was
///   scripted for that file with [`FakeBuilder::fail_next`].
#[derive(Clone)]
pub struct FakeBuilder {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    dispatched: Arc<Mutex<Vec<BuildJob>>>,
    failures: Arc<Mutex<HashMap<String, VecDeque<String>>>>,
}

impl FakeBuilder {
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>) -> Self {
        Self {
            runtime_tx,
            dispatched: Arc::new(Mutex::new(Vec::new())),
            failures: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Make the next build of `name` fail with `message`.
    pub fn fail_next(&self, name: &str, message: &str) {
        self.failures
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_default()
            .push_back(message.to_string());
    }

    pub fn dispatched(&self) -> Vec<BuildJob> {
        self.dispatched.lock().unwrap().clone()
    }

    pub fn dispatched_names(&self) -> Vec<String> {
        self.dispatched().into_iter().map(|j| j.name).collect()
    }
}

impl BuildBackend for FakeBuilder {
    fn dispatch_builds(
        &mut self,
        jobs: Vec<BuildJob>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.runtime_tx.clone();
        let dispatched = Arc::clone(&self.dispatched);
        let failures = Arc::clone(&self.failures);

        Box::pin(async move {
            for job in jobs {
                dispatched.lock().unwrap().push(job.clone());

                let failure = failures
                    .lock()
                    .unwrap()
                    .get_mut(&job.name)
                    .and_then(|queue| queue.pop_front());

                let outcome = match failure {
                    Some(message) => BuildOutcome::Failed(CompileError {
                        message,
                        stack: None,
                        file: job.path.to_string_lossy().into_owned(),
                        timestamp: job.started_at + 1,
                    }),
                    None => BuildOutcome::Success,
                };

                // Completion is reported from a separate task, like a real
                // build would, so the runtime never waits on its own channel.
                let tx = tx.clone();
                tokio::spawn(async move {
                    let _ = tx
                        .send(RuntimeEvent::BuildFinished {
                            name: job.name,
                            job: job.job,
                            outcome,
                        })
                        .await;
                });
            }
            Ok(())
        })
    }
}

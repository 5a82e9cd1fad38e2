// src/rescan/mod.rs

//! Debounced dependency rescans.
//!
//! Each content change arms a per-file timer. When a file has been quiet for
//! the debounce window, its current contents are read and handed to the
//! [`SourceScanner`]; the result goes back to the coordinator as a
//! [`RuntimeEvent::FileScanned`], which performs the actual cache write.
//! Scans never block compiling the file.

pub mod debounce;
pub mod scanner;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::engine::RuntimeEvent;
use crate::fs::FileSystem;
use crate::types::FileName;

pub use debounce::Debouncer;
pub use scanner::{RegexScanner, ScanResult, SourceScanner};

/// Why a scheduled scan produced no result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanFailure {
    /// The file could not be read when the timer fired.
    Unreadable(String),
    /// The scanner did not finish within the configured bound.
    TimedOut(Duration),
}

impl fmt::Display for ScanFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanFailure::Unreadable(reason) => write!(f, "file unreadable: {reason}"),
            ScanFailure::TimedOut(after) => {
                write!(f, "import scan did not finish within {}ms", after.as_millis())
            }
        }
    }
}

/// Timing knobs for the rescanner.
#[derive(Debug, Clone, Copy)]
pub struct RescanTiming {
    /// Quiet period after the last change before a file is scanned.
    pub debounce: Duration,
    /// Upper bound for a single scan.
    pub scan_timeout: Duration,
}

impl Default for RescanTiming {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(400),
            scan_timeout: Duration::from_secs(5),
        }
    }
}

pub struct Rescanner {
    timers: Debouncer<FileName>,
    timing: RescanTiming,
    scanner: Arc<dyn SourceScanner>,
    fs: Arc<dyn FileSystem>,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
}

impl fmt::Debug for Rescanner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rescanner")
            .field("timers", &self.timers)
            .field("timing", &self.timing)
            .field("scanner", &self.scanner)
            .finish_non_exhaustive()
    }
}

impl Rescanner {
    pub fn new(
        scanner: Arc<dyn SourceScanner>,
        fs: Arc<dyn FileSystem>,
        runtime_tx: mpsc::Sender<RuntimeEvent>,
        timing: RescanTiming,
    ) -> Self {
        Self {
            timers: Debouncer::new(),
            timing,
            scanner,
            fs,
            runtime_tx,
        }
    }

    /// (Re)arm the scan for `name`; the file at `path` is read when the
    /// timer fires, so the last edit within the window wins.
    pub fn schedule(&mut self, name: FileName, path: PathBuf) {
        debug!(file = %name, delay_ms = self.timing.debounce.as_millis() as u64, "arming rescan");

        let scanner = Arc::clone(&self.scanner);
        let fs = Arc::clone(&self.fs);
        let tx = self.runtime_tx.clone();
        let timeout = self.timing.scan_timeout;
        let key = name.clone();

        self.timers.arm(key, self.timing.debounce, async move {
            let event = match scan_file(scanner, fs, &name, path.clone(), timeout).await {
                Ok(result) => RuntimeEvent::FileScanned { name, result },
                Err(failure) => RuntimeEvent::ScanFailed {
                    name,
                    path,
                    failure,
                },
            };

            if let Err(err) = tx.send(event).await {
                debug!("runtime gone before scan result could be delivered: {err}");
            }
        });
    }

    /// Drop a pending scan (e.g. the file was deleted).
    pub fn cancel(&mut self, name: &str) -> bool {
        let cancelled = self.timers.cancel(&name.to_string());
        if cancelled {
            debug!(file = %name, "cancelled pending rescan");
        }
        cancelled
    }

    pub fn pending(&self) -> usize {
        self.timers.pending()
    }
}

async fn scan_file(
    scanner: Arc<dyn SourceScanner>,
    fs: Arc<dyn FileSystem>,
    name: &str,
    path: PathBuf,
    timeout: Duration,
) -> Result<ScanResult, ScanFailure> {
    let scan_name = name.to_string();
    let work = tokio::task::spawn_blocking(move || {
        let source = fs
            .read_to_string(&path)
            .map_err(|e| ScanFailure::Unreadable(format!("{e:#}")))?;
        Ok(scanner.scan(&scan_name, &source))
    });

    match tokio::time::timeout(timeout, work).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) => {
            warn!(file = %name, error = %join_err, "scan task failed");
            Err(ScanFailure::Unreadable(join_err.to_string()))
        }
        Err(_) => Err(ScanFailure::TimedOut(timeout)),
    }
}

// src/watch/watcher.rs

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::engine::RuntimeEvent;
use crate::fs::FileSystem;
use crate::types::FileEventKind;
use crate::watch::event_handler::{hash_in_background, process_file_change};
use crate::watch::patterns::{collect_matching_files, WatchPatterns};

/// Keeps the `notify` watcher alive; file watching stops when it is dropped.
pub struct WatcherHandle {
    _watcher: RecommendedWatcher,
    root: PathBuf,
}

impl std::fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherHandle")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

/// Watch `root` recursively and forward matching changes to the runtime as
/// `RuntimeEvent::FileChanged`.
pub fn spawn_watcher(
    root: impl Into<PathBuf>,
    patterns: WatchPatterns,
    fs: Arc<dyn FileSystem>,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
) -> Result<WatcherHandle> {
    let root = root.into();

    // notify calls back on its own thread.
    let (raw_tx, raw_rx) = mpsc::unbounded_channel::<Event>();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) if matches!(event.kind, EventKind::Access(_)) => {}
        Ok(event) => {
            let _ = raw_tx.send(event);
        }
        Err(err) => warn!(error = %err, "file watch error"),
    })
    .context("creating file watcher")?;

    watcher
        .watch(&root, RecursiveMode::Recursive)
        .with_context(|| format!("watching {:?}", root))?;
    info!(root = ?root, "file watcher started");

    tokio::spawn(forward_events(raw_rx, root.clone(), patterns, fs, runtime_tx));

    Ok(WatcherHandle {
        _watcher: watcher,
        root,
    })
}

async fn forward_events(
    mut raw_rx: mpsc::UnboundedReceiver<Event>,
    root: PathBuf,
    patterns: WatchPatterns,
    fs: Arc<dyn FileSystem>,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
) {
    while let Some(Event { kind, paths, .. }) = raw_rx.recv().await {
        for path in paths {
            let open =
                process_file_change(Arc::clone(&fs), &root, path, &kind, &patterns, &runtime_tx)
                    .await;
            if !open {
                debug!("runtime gone; watcher loop exiting");
                return;
            }
        }
    }
}

/// Report every matching file under `root` as added, then send
/// `RuntimeEvent::InitialScanComplete` with the number of files found.
pub async fn seed_initial_files(
    root: &Path,
    patterns: &WatchPatterns,
    fs: Arc<dyn FileSystem>,
    runtime_tx: &mpsc::Sender<RuntimeEvent>,
) -> Result<usize> {
    let files = tokio::task::spawn_blocking({
        let fs = Arc::clone(&fs);
        let root = root.to_path_buf();
        let patterns = patterns.clone();
        move || collect_matching_files(fs.as_ref(), &root, &patterns)
    })
    .await
    .context("initial scan task")??;

    let count = files.len();
    info!(files = count, "initial scan");

    for path in files {
        let content_hash = hash_in_background(Arc::clone(&fs), path.clone()).await;
        runtime_tx
            .send(RuntimeEvent::FileChanged {
                path,
                kind: FileEventKind::Add,
                content_hash,
            })
            .await
            .context("runtime closed during initial scan")?;
    }

    runtime_tx
        .send(RuntimeEvent::InitialScanComplete { files: count })
        .await
        .context("runtime closed during initial scan")?;

    Ok(count)
}

// src/watch/event_handler.rs

//! Event processing logic for file system changes.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::event::ModifyKind;
use notify::EventKind;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::engine::RuntimeEvent;
use crate::fs::FileSystem;
use crate::paths::relative_str;
use crate::types::FileEventKind;
use crate::watch::hash::compute_file_hash;
use crate::watch::patterns::WatchPatterns;

/// Map a `notify` event kind onto add/change/unlink for one path.
///
/// Renames are reported per path, so the outcome depends on whether the
/// path still exists. Access and unclassified events are ignored.
pub fn classify(fs: &dyn FileSystem, kind: &EventKind, path: &Path) -> Option<FileEventKind> {
    match kind {
        EventKind::Create(_) => Some(FileEventKind::Add),
        EventKind::Modify(ModifyKind::Name(_)) => {
            if fs.is_file(path) {
                Some(FileEventKind::Add)
            } else {
                Some(FileEventKind::Unlink)
            }
        }
        EventKind::Modify(_) => Some(FileEventKind::Change),
        EventKind::Remove(_) => Some(FileEventKind::Unlink),
        _ => None,
    }
}

/// Process a single changed path and forward it to the runtime.
///
/// This function:
/// 1. Relativizes the path against the root and applies the watch patterns
/// 2. Classifies the change
/// 3. Hashes the file contents for adds and changes
/// 4. Sends `RuntimeEvent::FileChanged`
///
/// Returns false once the runtime channel is closed.
pub async fn process_file_change(
    fs: Arc<dyn FileSystem>,
    root: &Path,
    path: PathBuf,
    kind: &EventKind,
    patterns: &WatchPatterns,
    runtime_tx: &mpsc::Sender<RuntimeEvent>,
) -> bool {
    let Some(rel) = relative_str(root, &path) else {
        warn!("could not relativize path {:?} against root {:?}", path, root);
        return true;
    };

    if !patterns.matches(&rel) {
        return true;
    }

    let Some(file_kind) = classify(fs.as_ref(), kind, &path) else {
        return true;
    };

    if file_kind != FileEventKind::Unlink && !fs.is_file(&path) {
        debug!(rel = %rel, "path is not a regular file; ignoring");
        return true;
    }

    let content_hash = match file_kind {
        FileEventKind::Unlink => None,
        FileEventKind::Add | FileEventKind::Change => hash_in_background(fs, path.clone()).await,
    };

    debug!(rel = %rel, kind = file_kind.as_str(), "watch match -> file changed");

    if let Err(err) = runtime_tx
        .send(RuntimeEvent::FileChanged {
            path,
            kind: file_kind,
            content_hash,
        })
        .await
    {
        warn!("failed to send RuntimeEvent::FileChanged: {err}");
        return false;
    }

    true
}

/// Hash off the async threads; a failure yields `None` and the file is
/// simply rebuilt.
pub async fn hash_in_background(fs: Arc<dyn FileSystem>, path: PathBuf) -> Option<String> {
    let result = tokio::task::spawn_blocking(move || {
        let hash = compute_file_hash(fs.as_ref(), &path);
        (path, hash)
    })
    .await;

    match result {
        Ok((_, Ok(hash))) => Some(hash),
        Ok((path, Err(err))) => {
            warn!(file = ?path, error = %err, "failed to hash file");
            None
        }
        Err(err) => {
            warn!(error = %err, "hash task failed");
            None
        }
    }
}

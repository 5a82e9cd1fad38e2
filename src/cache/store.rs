// src/cache/store.rs

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::cache::observers::{CacheEvent, CacheEventKind, CacheHandler, Observers, SubscriptionId};
use crate::cache::record::{CacheGeneration, CompileError, FileRecord};
use crate::cache::snapshot::SnapshotStore;
use crate::errors::{BuildRelayError, Result};
use crate::paths::{FileKey, PathNormalizer};
use crate::types::{now_millis, FileName, Timestamp};

/// Per-file compilation state across rebuild cycles.
///
/// Holds two generations: `current` (being built by this process) and
/// `previous` (what the last run persisted). `previous` is read-only; it
/// answers "did this file exist before" and lets an unchanged file take its
/// old record back verbatim.
///
/// Methods accept paths, which are keyed through the [`PathNormalizer`], or a
/// [`CanonicalName`](crate::paths::CanonicalName) for a name that is already
/// canonical.
pub struct CacheStore {
    normalizer: PathNormalizer,
    current: CacheGeneration,
    previous: CacheGeneration,
    observers: Observers,
    snapshots: Box<dyn SnapshotStore>,
}

impl fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheStore")
            .field("base_dir", &self.normalizer.base_dir())
            .field("current", &self.current.len())
            .field("previous", &self.previous.len())
            .field("observers", &self.observers)
            .finish_non_exhaustive()
    }
}

impl CacheStore {
    /// Create an empty cache. Call [`CacheStore::init`] to pick up the
    /// previously persisted generation.
    pub fn new(normalizer: PathNormalizer, snapshots: Box<dyn SnapshotStore>) -> Self {
        Self {
            normalizer,
            current: CacheGeneration::default(),
            previous: CacheGeneration::default(),
            observers: Observers::default(),
            snapshots,
        }
    }

    /// Start a fresh current generation and load the previous one, unless
    /// `reset` asks to ignore it. Load failures fall back to an empty
    /// previous generation.
    pub fn init(&mut self, reset: bool) {
        self.current = CacheGeneration::default();

        if reset {
            info!("cache reset requested; ignoring persisted generation");
            self.previous = CacheGeneration::default();
            return;
        }

        self.previous = match self.snapshots.load() {
            Ok(Some(generation)) => {
                info!(files = generation.len(), "loaded previous cache generation");
                generation
            }
            Ok(None) => {
                debug!("no previous cache generation persisted");
                CacheGeneration::default()
            }
            Err(err) => {
                warn!(error = %err, "failed to load cache snapshot; starting from empty");
                CacheGeneration::default()
            }
        };
    }

    /// Drop both generations.
    pub fn reset(&mut self) {
        self.current = CacheGeneration::default();
        self.previous = CacheGeneration::default();
        debug!("cache reset");
    }

    /// Persist the current generation.
    pub fn serialize(&mut self) -> Result<()> {
        debug!(files = self.current.len(), "serializing cache");
        self.snapshots.save(&self.current)?;
        Ok(())
    }

    pub fn base_dir(&self) -> &Path {
        self.normalizer.base_dir()
    }

    pub fn normalizer(&self) -> &PathNormalizer {
        &self.normalizer
    }

    /// Canonical name for `path`.
    pub fn name(&self, path: impl AsRef<Path>) -> FileName {
        self.normalizer.name(path)
    }

    fn key(&self, file: impl FileKey) -> FileName {
        file.file_name(&self.normalizer)
    }

    pub fn subscribe(&mut self, kind: CacheEventKind, handler: CacheHandler) -> SubscriptionId {
        self.observers.subscribe(kind, handler)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }

    /// Create the record if absent and stamp `added_at`.
    ///
    /// Returns `None` for an empty path.
    pub fn add(&mut self, file: impl FileKey) -> Option<&mut FileRecord> {
        let name = self.key(file);
        if name.is_empty() {
            return None;
        }

        let now = now_millis();
        let record = self
            .current
            .files
            .entry(name.clone())
            .or_insert_with(|| FileRecord::new(name, now));
        record.added_at = now;
        Some(record)
    }

    pub fn get(&self, file: impl FileKey) -> Option<&FileRecord> {
        self.current.files.get(&self.key(file))
    }

    pub fn get_previous(&self, file: impl FileKey) -> Option<&FileRecord> {
        self.previous.files.get(&self.key(file))
    }

    pub fn contains(&self, file: impl FileKey) -> bool {
        self.get(file).is_some()
    }

    pub fn files(&self) -> &BTreeMap<FileName, FileRecord> {
        &self.current.files
    }

    pub fn len(&self) -> usize {
        self.current.len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }

    /// Copy the previous generation's record over the current one.
    ///
    /// Returns false (and leaves the current record alone) when the previous
    /// generation has no such file.
    pub fn restore_previous(&mut self, file: impl FileKey) -> bool {
        let name = self.key(file);
        match self.previous.files.get(&name) {
            Some(record) => {
                debug!(file = %name, "restoring record from previous generation");
                self.current.files.insert(name, record.clone());
                true
            }
            None => false,
        }
    }

    /// Delete the record, notify `FileDeleted` observers with it, then
    /// `ViewDeleted` observers for each of its views.
    pub fn remove(&mut self, path: impl AsRef<Path>) -> Option<FileRecord> {
        let path = path.as_ref();
        let name = self.name(path);
        let removed = self.current.files.remove(&name)?;

        info!(file = %name, "removed file from cache");
        self.observers.emit(&CacheEvent::FileDeleted {
            name: &name,
            path,
            record: &removed,
        });
        for view in &removed.views {
            self.observers.emit(&CacheEvent::ViewDeleted { file: &name, view });
        }

        Some(removed)
    }

    /// Replace the file's view list, notifying `ViewDeleted` observers for
    /// every view that disappears.
    ///
    /// The file must already be tracked.
    pub fn set_views(&mut self, file: impl FileKey, views: Vec<String>) -> Result<()> {
        let name = self.key(file);
        let record = self
            .current
            .files
            .get_mut(&name)
            .ok_or_else(|| BuildRelayError::UnknownFile(name.clone()))?;

        let mut unique: Vec<String> = Vec::with_capacity(views.len());
        for view in views {
            if !unique.contains(&view) {
                unique.push(view);
            }
        }

        for view in record.views.iter().filter(|v| !unique.contains(v)) {
            debug!(file = %name, view = %view, "view deleted");
            self.observers.emit(&CacheEvent::ViewDeleted {
                file: &name,
                view,
            });
        }

        debug!(file = %name, views = ?unique, "set views");
        record.views = unique;
        Ok(())
    }

    pub fn views(&self, file: impl FileKey) -> Option<&[String]> {
        self.get(file).map(|r| r.views.as_slice())
    }

    /// Map of view name to the file declaring it.
    ///
    /// When two files declare the same view, the name that sorts last wins.
    pub fn view_locations(&self) -> BTreeMap<String, FileName> {
        let mut locations = BTreeMap::new();
        for (name, record) in &self.current.files {
            for view in &record.views {
                locations.insert(view.clone(), name.clone());
            }
        }
        locations
    }

    pub fn is_internal(&self, file: impl FileKey) -> bool {
        self.get(file).is_some_and(|r| r.is_internal)
    }

    /// Set the internal flag; `InternalChanged` observers fire only on an
    /// actual flip. No-op for untracked files.
    ///
    /// Returns whether the value changed.
    pub fn set_is_internal(&mut self, file: impl FileKey, value: bool) -> bool {
        let name = self.key(file);
        let Some(record) = self.current.files.get_mut(&name) else {
            return false;
        };

        if record.is_internal == value {
            return false;
        }

        record.is_internal = value;
        debug!(file = %name, is_internal = value, "internal flag changed");
        self.observers.emit(&CacheEvent::InternalChanged {
            name: &name,
            is_internal: value,
        });
        true
    }

    /// Names of every file flagged internal.
    pub fn internal_files(&self) -> Vec<FileName> {
        self.current
            .files
            .values()
            .filter(|r| r.is_internal)
            .map(|r| r.name.clone())
            .collect()
    }

    /// Replace the file's import sets from a raw specifier list, creating the
    /// record if needed.
    pub fn set_file_imports<I, S>(&mut self, file: impl FileKey, imports: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let Some(record) = self.add(file) else {
            return;
        };
        record.set_imports(imports);
        debug!(
            file = %record.name,
            internal = ?record.internal_imports,
            external = ?record.external_imports,
            "set file imports"
        );
    }

    /// External (package) imports of one file, or of every file when `path`
    /// is `None`.
    pub fn get_externals(&self, path: Option<&Path>) -> BTreeSet<String> {
        self.collect_imports(path, |r| &r.external_imports)
    }

    /// Internal (project-relative) imports of one file, or of every file.
    pub fn get_internals(&self, path: Option<&Path>) -> BTreeSet<String> {
        self.collect_imports(path, |r| &r.internal_imports)
    }

    /// Internal and external imports together.
    pub fn get_imports(&self, path: Option<&Path>) -> BTreeSet<String> {
        let mut all = self.get_internals(path);
        all.extend(self.get_externals(path));
        all
    }

    fn collect_imports<F>(&self, path: Option<&Path>, select: F) -> BTreeSet<String>
    where
        F: Fn(&FileRecord) -> &BTreeSet<String>,
    {
        match path {
            Some(path) => self.get(path).map(|r| select(r).clone()).unwrap_or_default(),
            None => self
                .current
                .files
                .values()
                .flat_map(|r| select(r).iter().cloned())
                .collect(),
        }
    }

    /// Record a failed compile, creating the record if needed.
    pub fn add_error(&mut self, file: impl FileKey, error: CompileError) {
        let Some(record) = self.add(file) else {
            return;
        };
        debug!(file = %record.name, message = %error.message, "recording compile error");
        record.last_error = Some(error);
    }

    pub fn remove_error(&mut self, file: impl FileKey) {
        let name = self.key(file);
        if let Some(record) = self.current.files.get_mut(&name) {
            record.last_error = None;
        }
    }

    /// Most recent error across all files, by timestamp.
    pub fn last_error(&self) -> Option<&CompileError> {
        self.current
            .files
            .values()
            .filter_map(|r| r.last_error.as_ref())
            .fold(None, |latest: Option<&CompileError>, err| match latest {
                Some(l) if l.timestamp >= err.timestamp => Some(l),
                _ => Some(err),
            })
    }

    /// Successful compile: stamp `written_at` and clear any stored error.
    pub fn mark_built(&mut self, file: impl FileKey, at: Timestamp) {
        let name = self.key(file);
        if let Some(record) = self.current.files.get_mut(&name) {
            debug!(file = %name, written_at = at, "marking file built");
            record.written_at = Some(at);
            record.last_error = None;
        }
    }

    pub fn set_content_hash(&mut self, file: impl FileKey, hash: Option<String>) {
        let name = self.key(file);
        if let Some(record) = self.current.files.get_mut(&name) {
            record.content_hash = hash;
        }
    }
}

use std::path::PathBuf;

use buildrelay::cache::{CacheStore, MemorySnapshotStore};
use buildrelay::config::{ConfigFile, RawConfigFile};
use buildrelay::paths::PathNormalizer;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigBuilder {
    config: RawConfigFile,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.project.root = root.into();
        self
    }

    pub fn strip_prefix(mut self, prefix: &str) -> Self {
        self.config.project.strip_prefixes.push(prefix.to_string());
        self
    }

    pub fn include(mut self, patterns: &[&str]) -> Self {
        self.config.watch.include = patterns.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn exclude(mut self, pattern: &str) -> Self {
        self.config.watch.exclude.push(pattern.to_string());
        self
    }

    pub fn build_cmd(mut self, cmd: &str) -> Self {
        self.config.build.cmd = Some(cmd.to_string());
        self
    }

    pub fn settle_ms(mut self, ms: u64) -> Self {
        self.config.timing.settle_ms = ms;
        self
    }

    pub fn rescan_debounce_ms(mut self, ms: u64) -> Self {
        self.config.timing.rescan_debounce_ms = ms;
        self
    }

    pub fn scan_timeout_ms(mut self, ms: u64) -> Self {
        self.config.timing.scan_timeout_ms = ms;
        self
    }

    pub fn pending_limit(mut self, limit: usize) -> Self {
        self.config.bridge.pending_limit = limit;
        self
    }

    pub fn bridge_enabled(mut self, enabled: bool) -> Self {
        self.config.bridge.enabled = enabled;
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Fresh cache rooted at `base_dir`, persisting to memory.
///
/// The returned store shares its slot with the cache, so tests can inspect
/// what was persisted or seed a "previous run".
pub fn memory_cache(base_dir: impl Into<PathBuf>) -> (CacheStore, MemorySnapshotStore) {
    let snapshots = MemorySnapshotStore::new();
    let mut cache = CacheStore::new(
        PathNormalizer::new(base_dir.into()),
        Box::new(snapshots.clone()),
    );
    cache.init(false);
    (cache, snapshots)
}

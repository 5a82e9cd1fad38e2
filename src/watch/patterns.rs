// src/watch/patterns.rs

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::fs::{EntryKind, FileSystem};
use crate::paths::relative_str;

/// Compiled include/exclude globs from `[watch]`.
///
/// Patterns are relative to the project root; [`WatchPatterns::matches`]
/// takes root-relative paths with forward slashes (e.g. `"src/app.js"`).
#[derive(Clone)]
pub struct WatchPatterns {
    include: GlobSet,
    exclude: Option<GlobSet>,
}

impl fmt::Debug for WatchPatterns {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchPatterns")
            .field("include", &self.include.len())
            .field("exclude", &self.exclude.as_ref().map_or(0, GlobSet::len))
            .finish()
    }
}

impl WatchPatterns {
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self> {
        let include = build_globset(include).context("building include globset")?;
        let exclude = if exclude.is_empty() {
            None
        } else {
            Some(build_globset(exclude).context("building exclude globset")?)
        };
        Ok(Self { include, exclude })
    }

    pub fn matches(&self, rel_path: &str) -> bool {
        if !self.include.is_match(rel_path) {
            return false;
        }
        if let Some(exclude) = &self.exclude {
            if exclude.is_match(rel_path) {
                return false;
            }
        }
        true
    }
}

/// Build a GlobSet from simple string patterns.
pub fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = Glob::new(pat).with_context(|| format!("invalid glob pattern: {pat}"))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}

/// Collect all files under `root` matching `patterns`, sorted by path.
///
/// Excluded directories are still descended into; exclusion is decided per
/// file.
pub fn collect_matching_files(
    fs: &dyn FileSystem,
    root: &Path,
    patterns: &WatchPatterns,
) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        for entry in fs.read_dir(&dir)? {
            match entry.kind {
                EntryKind::Dir => stack.push(entry.path),
                EntryKind::File => {
                    if relative_str(root, &entry.path).is_some_and(|rel| patterns.matches(&rel)) {
                        files.push(entry.path);
                    }
                }
                EntryKind::Other => {}
            }
        }
    }

    files.sort();
    Ok(files)
}

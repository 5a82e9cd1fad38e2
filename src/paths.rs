// src/paths.rs

//! Canonical file naming.
//!
//! Every other component keys files by the name produced here: the path
//! relative to the project base directory, with forward slashes, no leading
//! `./`, and any configured internal prefix (e.g. an output directory)
//! removed.

use std::path::{Path, PathBuf};

use crate::types::FileName;

/// Convert a path into a string relative to `root`, with forward slashes.
///
/// - First we try a direct `strip_prefix(root)`.
/// - If that fails (e.g. due to symlinks or different absolute prefixes),
///   we canonicalize both paths and try again.
/// - Only if both attempts fail do we give up.
///
/// Returns `None` if the path cannot be reasonably related to `root`.
pub fn relative_str(root: &Path, path: &Path) -> Option<String> {
    if let Ok(rel) = path.strip_prefix(root) {
        return Some(slashes(rel));
    }

    // macOS reports some event paths through /private/var/...; canonicalizing
    // both sides makes them comparable again.
    if let (Ok(root_canon), Ok(path_canon)) = (root.canonicalize(), path.canonicalize()) {
        if let Ok(rel) = path_canon.strip_prefix(&root_canon) {
            return Some(slashes(rel));
        }
    }

    None
}

fn slashes(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Maps file paths to canonical project-relative names.
#[derive(Debug, Clone)]
pub struct PathNormalizer {
    base_dir: PathBuf,
    strip_prefixes: Vec<String>,
}

impl PathNormalizer {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            strip_prefixes: Vec::new(),
        }
    }

    /// Leading segments (e.g. `".build/out/"`) removed from every name.
    pub fn with_strip_prefixes(mut self, prefixes: Vec<String>) -> Self {
        self.strip_prefixes = prefixes
            .into_iter()
            .map(|p| p.replace('\\', "/"))
            .filter(|p| !p.is_empty())
            .collect();
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Canonical name for `path`.
    ///
    /// Relative paths are taken to be relative to the base directory already.
    /// Absolute paths outside the base directory keep their full form.
    pub fn name(&self, path: impl AsRef<Path>) -> FileName {
        let path = path.as_ref();

        let rel = if path.is_absolute() {
            relative_str(&self.base_dir, path).unwrap_or_else(|| slashes(path))
        } else {
            slashes(path)
        };

        let mut name = rel.as_str();
        while let Some(rest) = name.strip_prefix("./") {
            name = rest;
        }

        for prefix in &self.strip_prefixes {
            if let Some(rest) = name.strip_prefix(prefix.as_str()) {
                name = rest;
                break;
            }
        }

        name.to_string()
    }

    /// Path relative to the base directory for display purposes; falls back
    /// to the input unchanged. Unlike [`PathNormalizer::name`], no prefixes
    /// are stripped.
    pub fn display_relative(&self, path: &str) -> String {
        let candidate = Path::new(path);
        if candidate.is_absolute() {
            relative_str(&self.base_dir, candidate).unwrap_or_else(|| path.to_string())
        } else {
            path.to_string()
        }
    }
}

/// Anything the cache can look a file up by.
///
/// Paths go through [`PathNormalizer::name`]. A name that is already
/// canonical must be wrapped in [`CanonicalName`]: normalizing it a second
/// time would strip a configured prefix again.
pub trait FileKey {
    fn file_name(&self, normalizer: &PathNormalizer) -> FileName;
}

impl<P: AsRef<Path> + ?Sized> FileKey for P {
    fn file_name(&self, normalizer: &PathNormalizer) -> FileName {
        normalizer.name(self)
    }
}

/// A name produced by [`PathNormalizer::name`], used as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanonicalName<'a>(pub &'a str);

impl FileKey for CanonicalName<'_> {
    fn file_name(&self, _normalizer: &PathNormalizer) -> FileName {
        self.0.to_string()
    }
}

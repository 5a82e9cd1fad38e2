// src/rescan/scanner.rs

//! Source scanning collaborator.

use std::fmt::Debug;

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// What a scan of one file's source produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    /// Import specifiers in source order, relative and bare intermixed.
    pub imports: Vec<String>,
    /// Declared views, when the scanner understands view declarations.
    pub views: Option<Vec<String>>,
    /// Whether the file is an internal unit, when the scanner can tell.
    pub is_internal: Option<bool>,
}

/// Extracts dependency information from a file's source.
///
/// Only [`SourceScanner::extract_imports`] is required; partitioning the
/// result into internal and external imports is the cache's job.
pub trait SourceScanner: Send + Sync + Debug {
    fn extract_imports(&self, path: &str, source: &str) -> Vec<String>;

    fn extract_views(&self, _path: &str, _source: &str) -> Option<Vec<String>> {
        None
    }

    fn detect_internal(&self, _path: &str, _source: &str) -> Option<bool> {
        None
    }

    fn scan(&self, path: &str, source: &str) -> ScanResult {
        ScanResult {
            imports: self.extract_imports(path, source),
            views: self.extract_views(path, source),
            is_internal: self.detect_internal(path, source),
        }
    }
}

/// Line-oriented scanner for JavaScript-like sources.
///
/// Recognizes:
/// - `import x from 'pkg'`, `import 'pkg'`, `export { x } from 'pkg'`
/// - `require('pkg')`
/// - `view Name {` at the start of a line
/// - a top-level `export` marking the file internal
#[derive(Debug, Clone)]
pub struct RegexScanner {
    module_re: Regex,
    require_re: Regex,
    view_re: Regex,
    export_re: Regex,
}

impl RegexScanner {
    pub fn new() -> Result<Self> {
        Ok(Self {
            module_re: Regex::new(
                r#"(?m)^\s*(?:import|export)\s+(?:[^'";]*?\s+from\s+)?['"]([^'"]+)['"]"#,
            )
            .context("compiling import pattern")?,
            require_re: Regex::new(r#"\brequire\(\s*['"]([^'"]+)['"]\s*\)"#)
                .context("compiling require pattern")?,
            view_re: Regex::new(r"(?m)^view\s+([.A-Za-z_0-9]*)\s*\{")
                .context("compiling view pattern")?,
            export_re: Regex::new(r"(?m)^export\s").context("compiling export pattern")?,
        })
    }
}

impl SourceScanner for RegexScanner {
    fn extract_imports(&self, _path: &str, source: &str) -> Vec<String> {
        let mut found: Vec<(usize, String)> = self
            .module_re
            .captures_iter(source)
            .chain(self.require_re.captures_iter(source))
            .filter_map(|caps| caps.get(1))
            .map(|m| (m.start(), m.as_str().to_string()))
            .collect();

        found.sort_by_key(|(offset, _)| *offset);
        found.into_iter().map(|(_, specifier)| specifier).collect()
    }

    fn extract_views(&self, _path: &str, source: &str) -> Option<Vec<String>> {
        let views = self
            .view_re
            .captures_iter(source)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .filter(|name| !name.is_empty())
            .collect();
        Some(views)
    }

    fn detect_internal(&self, _path: &str, source: &str) -> Option<bool> {
        Some(self.export_re.is_match(source))
    }
}

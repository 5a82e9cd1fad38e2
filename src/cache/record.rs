// src/cache/record.rs

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::types::{FileName, Timestamp};

/// Structured descriptor of a failed compile, as handed over by the build
/// pipeline. `file` is the path the pipeline reported (usually absolute).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    pub file: String,
    pub timestamp: Timestamp,
}

/// Bookkeeping for a single watched file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub name: FileName,
    pub added_at: Timestamp,
    /// Set by a successful compile only.
    #[serde(default)]
    pub written_at: Option<Timestamp>,
    #[serde(default)]
    pub is_internal: bool,
    /// Views declared by the file, in declaration order, without duplicates.
    #[serde(default)]
    pub views: Vec<String>,
    #[serde(default)]
    pub external_imports: BTreeSet<String>,
    #[serde(default)]
    pub internal_imports: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<CompileError>,
    /// blake3 of the source that last compiled successfully.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
}

impl FileRecord {
    pub fn new(name: impl Into<FileName>, added_at: Timestamp) -> Self {
        Self {
            name: name.into(),
            added_at,
            written_at: None,
            is_internal: false,
            views: Vec::new(),
            external_imports: BTreeSet::new(),
            internal_imports: BTreeSet::new(),
            last_error: None,
            content_hash: None,
        }
    }

    /// Replace both import sets from one raw specifier list.
    ///
    /// A specifier starting with `.` is internal, anything else is external.
    pub fn set_imports<I, S>(&mut self, imports: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (internal, external): (BTreeSet<String>, BTreeSet<String>) = imports
            .into_iter()
            .map(Into::into)
            .filter(|s: &String| !s.is_empty())
            .partition(|s| is_internal_specifier(s));

        self.internal_imports = internal;
        self.external_imports = external;
    }
}

/// Leading-`.` heuristic: `./a`, `../b` and `.hidden` are project-relative.
pub fn is_internal_specifier(specifier: &str) -> bool {
    specifier.starts_with('.')
}

/// One full set of file records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheGeneration {
    #[serde(default)]
    pub files: BTreeMap<FileName, FileRecord>,
}

impl CacheGeneration {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }
}

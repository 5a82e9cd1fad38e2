// src/watch/hash.rs

use std::path::Path;

use anyhow::{Context, Result};

use crate::fs::FileSystem;

/// Hex blake3 digest of a file, used to spot files that did not change
/// between runs.
pub fn compute_file_hash(fs: &dyn FileSystem, path: &Path) -> Result<String> {
    let reader = fs
        .open_read(path)
        .with_context(|| format!("opening {:?} for hashing", path))?;
    let mut hasher = blake3::Hasher::new();
    hasher
        .update_reader(reader)
        .with_context(|| format!("hashing {:?}", path))?;
    Ok(hasher.finalize().to_hex().to_string())
}

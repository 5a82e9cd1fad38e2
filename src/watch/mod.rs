// src/watch/mod.rs

//! File watching and change detection.
//!
//! This module is responsible for:
//! - Compiling the `[watch]` include/exclude glob patterns.
//! - The initial scan that reports every existing file as added.
//! - Wiring up a cross-platform filesystem watcher (`notify`).
//! - Content hashing, so unchanged files can reuse their previous record.
//!
//! It only turns filesystem changes into `RuntimeEvent::FileChanged`; what
//! happens next is the coordinator's business.

pub mod event_handler;
pub mod hash;
pub mod patterns;
pub mod watcher;

pub use hash::compute_file_hash;
pub use patterns::{collect_matching_files, WatchPatterns};
pub use watcher::{seed_initial_files, spawn_watcher, WatcherHandle};

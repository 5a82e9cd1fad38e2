// src/cache/mod.rs

//! File state cache.
//!
//! - [`record`] defines `FileRecord`, `CompileError` and `CacheGeneration`.
//! - [`observers`] is the subscribe/unsubscribe registry for cache events.
//! - [`snapshot`] persists generations (JSON state file or memory).
//! - [`store`] is the `CacheStore` itself.

pub mod observers;
pub mod record;
pub mod snapshot;
pub mod store;

pub use observers::{CacheEvent, CacheEventKind, CacheHandler, SubscriptionId};
pub use record::{is_internal_specifier, CacheGeneration, CompileError, FileRecord};
pub use snapshot::{FileSnapshotStore, MemorySnapshotStore, SnapshotStore, STATE_FILE_PATH};
pub use store::CacheStore;

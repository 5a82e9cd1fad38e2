// src/cache/observers.rs

//! Observer registry for cache events.

use std::fmt;
use std::path::Path;

use crate::cache::record::FileRecord;

/// Which cache event a handler listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheEventKind {
    FileDeleted,
    ViewDeleted,
    InternalChanged,
}

/// Event passed to cache observers.
///
/// Borrowed data stays valid for the duration of the callback even when the
/// record has already left the cache.
#[derive(Debug, Clone, Copy)]
pub enum CacheEvent<'a> {
    FileDeleted {
        name: &'a str,
        path: &'a Path,
        record: &'a FileRecord,
    },
    ViewDeleted {
        file: &'a str,
        view: &'a str,
    },
    InternalChanged {
        name: &'a str,
        is_internal: bool,
    },
}

impl CacheEvent<'_> {
    pub fn kind(&self) -> CacheEventKind {
        match self {
            CacheEvent::FileDeleted { .. } => CacheEventKind::FileDeleted,
            CacheEvent::ViewDeleted { .. } => CacheEventKind::ViewDeleted,
            CacheEvent::InternalChanged { .. } => CacheEventKind::InternalChanged,
        }
    }
}

pub type CacheHandler = Box<dyn FnMut(&CacheEvent<'_>) + Send>;

/// Token returned by `subscribe`, used to unsubscribe later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
pub struct Observers {
    next_id: u64,
    handlers: Vec<(SubscriptionId, CacheEventKind, CacheHandler)>,
}

impl fmt::Debug for Observers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observers")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

impl Observers {
    pub fn subscribe(&mut self, kind: CacheEventKind, handler: CacheHandler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.handlers.push((id, kind, handler));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|(sid, _, _)| *sid != id);
        self.handlers.len() != before
    }

    /// Call every handler registered for the event's kind, in subscription
    /// order.
    pub fn emit(&mut self, event: &CacheEvent<'_>) {
        let kind = event.kind();
        for (_, handler_kind, handler) in self.handlers.iter_mut() {
            if *handler_kind == kind {
                handler(event);
            }
        }
    }
}

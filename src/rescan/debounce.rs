// src/rescan/debounce.rs

//! Keyed, cancellable timers.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::time::Duration;

use tokio::task::JoinHandle;

/// One cancellable timer per key.
///
/// Arming a key aborts whatever was previously scheduled for it, so only the
/// most recent scheduling survives. Different keys run independently.
pub struct Debouncer<K> {
    timers: HashMap<K, JoinHandle<()>>,
}

impl<K> fmt::Debug for Debouncer<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Debouncer")
            .field("timers", &self.timers.len())
            .finish()
    }
}

impl<K> Default for Debouncer<K> {
    fn default() -> Self {
        Self {
            timers: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash> Debouncer<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `action` after `delay`, replacing any timer armed for `key`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn arm<F>(&mut self, key: K, delay: Duration, action: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.timers.retain(|_, handle| !handle.is_finished());

        if let Some(previous) = self.timers.remove(&key) {
            previous.abort();
        }

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            action.await;
        });
        self.timers.insert(key, handle);
    }

    /// Abort the timer for `key`. Returns true if one was still pending.
    pub fn cancel(&mut self, key: &K) -> bool {
        match self.timers.remove(key) {
            Some(handle) => {
                let pending = !handle.is_finished();
                handle.abort();
                pending
            }
            None => false,
        }
    }

    /// Number of timers that have not fired (or finished firing) yet.
    pub fn pending(&self) -> usize {
        self.timers.values().filter(|h| !h.is_finished()).count()
    }
}

impl<K> Drop for Debouncer<K> {
    fn drop(&mut self) {
        for (_, handle) in self.timers.drain() {
            handle.abort();
        }
    }
}

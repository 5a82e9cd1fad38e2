// src/engine/gate.rs

//! First-build gate.
//!
//! A one-shot latch: `NotBuilt -> Building -> FirstBuildComplete`. Waiters
//! registered before completion are released together when the initial batch
//! settles; waiters registered afterwards resolve immediately. Nothing ever
//! moves the gate back.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use tracing::{debug, info};

/// Observable phase of the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatePhase {
    NotBuilt,
    Building,
    FirstBuildComplete,
}

#[derive(Debug)]
enum GateState {
    NotBuilt { waiters: Vec<oneshot::Sender<()>> },
    Building { waiters: Vec<oneshot::Sender<()>> },
    FirstBuildComplete,
}

/// Cloneable handle to the shared gate.
#[derive(Debug, Clone)]
pub struct BuildGate {
    state: Arc<Mutex<GateState>>,
}

impl Default for BuildGate {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(GateState::NotBuilt {
                waiters: Vec::new(),
            })),
        }
    }
}

impl BuildGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn phase(&self) -> GatePhase {
        match &*self.lock() {
            GateState::NotBuilt { .. } => GatePhase::NotBuilt,
            GateState::Building { .. } => GatePhase::Building,
            GateState::FirstBuildComplete => GatePhase::FirstBuildComplete,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.phase() == GatePhase::FirstBuildComplete
    }

    /// Number of registered, not yet released waiters.
    pub fn waiting(&self) -> usize {
        match &*self.lock() {
            GateState::NotBuilt { waiters } | GateState::Building { waiters } => waiters.len(),
            GateState::FirstBuildComplete => 0,
        }
    }

    /// `NotBuilt -> Building`. No effect in any other phase.
    pub fn begin_building(&self) {
        let mut state = self.lock();
        if let GateState::NotBuilt { waiters } = &mut *state {
            debug!("build gate: initial batch started");
            let waiters = std::mem::take(waiters);
            *state = GateState::Building { waiters };
        }
    }

    /// Move to `FirstBuildComplete`, releasing every waiter.
    ///
    /// Returns how many waiters were released; 0 when already complete.
    pub fn complete(&self) -> usize {
        let waiters = {
            let mut state = self.lock();
            match std::mem::replace(&mut *state, GateState::FirstBuildComplete) {
                GateState::NotBuilt { waiters } | GateState::Building { waiters } => waiters,
                GateState::FirstBuildComplete => return 0,
            }
        };

        let released = waiters
            .into_iter()
            .filter_map(|waiter| waiter.send(()).ok())
            .count();
        info!(released, "first build complete");
        released
    }

    /// Resolve once the first build has completed.
    ///
    /// Registration happens when this is called, not when the future is
    /// first polled. The output is `false` only if every gate handle was
    /// dropped before completion.
    pub fn after_first_build(&self) -> impl Future<Output = bool> + Send + use<> {
        let rx = match &mut *self.lock() {
            GateState::NotBuilt { waiters } | GateState::Building { waiters } => {
                let (tx, rx) = oneshot::channel();
                waiters.push(tx);
                Some(rx)
            }
            GateState::FirstBuildComplete => None,
        };

        async move {
            match rx {
                Some(rx) => rx.await.is_ok(),
                None => true,
            }
        }
    }
}

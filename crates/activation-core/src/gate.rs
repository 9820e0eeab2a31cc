//! One-shot readiness gate ("registration complete").
//!
//! Requests that arrive before the gate opens are parked and released in
//! arrival order when it does. Once open, the gate stays open.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

#[derive(Default)]
struct GateState {
    open: bool,
    waiters: VecDeque<oneshot::Sender<()>>,
}

#[derive(Default)]
pub struct ReadinessGate {
    state: Mutex<GateState>,
}

impl std::fmt::Debug for ReadinessGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("ReadinessGate")
            .field("open", &state.open)
            .field("queued", &state.waiters.len())
            .finish()
    }
}

impl ReadinessGate {
    /// A closed gate.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_open(&self) -> bool {
        self.lock().open
    }

    /// Number of requests parked behind the gate.
    pub fn queued(&self) -> usize {
        self.lock().waiters.len()
    }

    /// Open the gate and release parked requests, oldest first.
    /// Returns how many were released; opening twice releases nothing.
    pub fn open(&self) -> usize {
        let waiters = {
            let mut state = self.lock();
            if state.open {
                return 0;
            }
            state.open = true;
            std::mem::take(&mut state.waiters)
        };

        let released = waiters.len();
        for waiter in waiters {
            // The requester may have gone away; nothing to release then
            let _ = waiter.send(());
        }
        if released > 0 {
            tracing::debug!("Readiness gate opened, released {} queued requests", released);
        }
        released
    }

    /// Resolve once the gate is open.
    pub async fn wait(&self) {
        let rx = {
            let mut state = self.lock();
            if state.open {
                return;
            }
            let (tx, rx) = oneshot::channel();
            state.waiters.push_back(tx);
            rx
        };
        // A dropped sender means the gate itself went away; stop waiting
        let _ = rx.await;
    }
}

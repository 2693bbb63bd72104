//! Readiness gate: single-resolution startup synchronization.
//!
//! The gate starts `Pending` and moves exactly once to a terminal state:
//! `Ready`, `Failed`, `TimedOut`, or `Disposed` when the client is torn
//! down first. The first resolution wins; later attempts are no-ops.

use std::time::Duration;

use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Pending,
    Ready,
    Failed(String),
    TimedOut,
    /// The client was disposed before the engine answered.
    Disposed,
}

impl Readiness {
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

#[derive(Debug)]
pub struct ReadinessGate {
    state: watch::Sender<Readiness>,
}

impl ReadinessGate {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: watch::Sender::new(Readiness::Pending),
        }
    }

    /// Resolve the gate. Returns `true` if this call performed the transition.
    fn resolve(&self, outcome: Readiness) -> bool {
        self.state.send_if_modified(|state| {
            if state.is_pending() {
                *state = outcome;
                true
            } else {
                false
            }
        })
    }

    pub fn mark_ready(&self) -> bool {
        self.resolve(Readiness::Ready)
    }

    pub fn fail(&self, reason: impl Into<String>) -> bool {
        self.resolve(Readiness::Failed(reason.into()))
    }

    pub fn time_out(&self) -> bool {
        self.resolve(Readiness::TimedOut)
    }

    pub fn close(&self) -> bool {
        self.resolve(Readiness::Disposed)
    }

    #[must_use]
    pub fn state(&self) -> Readiness {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(*self.state.borrow(), Readiness::Ready)
    }

    /// Wait for the gate to resolve, resolving it as `TimedOut` once
    /// `timeout` elapses. Returns the terminal state.
    pub async fn wait(&self, timeout: Duration) -> Readiness {
        let mut rx = self.state.subscribe();
        let timed_out = tokio::time::timeout(timeout, rx.wait_for(|s| !s.is_pending()))
            .await
            .is_err();
        if timed_out {
            self.time_out();
        }
        self.state()
    }
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::new()
    }
}

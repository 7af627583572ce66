// src/probe/gate.rs
// Single-shot resolution for the probe and teardown of everything it started.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::oneshot;
use tokio::task::AbortHandle;

use super::{CallbackResult, ProbeError, ProbeOutcome, ProbeState, TestEventOutcome};

/// Shared cancellation flag the polling loops check on every tick.
#[derive(Debug, Clone, Default)]
pub(crate) struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// What ended the probe.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Resolution {
    Callback(CallbackResult),
    Timeout,
}

pub(crate) fn lock_state(state: &Mutex<ProbeState>) -> MutexGuard<'_, ProbeState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Resolves the probe exactly once; every later `resolve` is a no-op.
pub(crate) struct ResolutionGate {
    state: Arc<Mutex<ProbeState>>,
    sender: Mutex<Option<oneshot::Sender<ProbeOutcome>>>,
    tasks: Mutex<Vec<AbortHandle>>,
    token: CancellationToken,
}

impl ResolutionGate {
    pub(crate) fn new(
        state: Arc<Mutex<ProbeState>>,
    ) -> (Arc<Self>, oneshot::Receiver<ProbeOutcome>) {
        let (sender, receiver) = oneshot::channel();
        let gate = Arc::new(Self {
            state,
            sender: Mutex::new(Some(sender)),
            tasks: Mutex::new(Vec::new()),
            token: CancellationToken::new(),
        });
        (gate, receiver)
    }

    pub(crate) fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Registers a task to abort on resolution. A task registered after the
    /// gate was torn down is aborted right away.
    pub(crate) fn track_task(&self, handle: AbortHandle) {
        if self.token.is_cancelled() {
            handle.abort();
            return;
        }
        self.tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(handle);
    }

    /// Cancels every loop and timer without resolving.
    pub(crate) fn teardown(&self) {
        self.token.cancel();
        let tasks = std::mem::take(
            &mut *self
                .tasks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        );
        for task in tasks {
            task.abort();
        }
    }

    /// Tears everything down and, if nobody resolved first, delivers the
    /// outcome. Returns whether this call was the one that resolved.
    pub(crate) fn resolve(&self, resolution: Resolution) -> bool {
        self.teardown();
        let Some(sender) = self
            .sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
        else {
            return false;
        };
        // The receiver may already be gone if the caller stopped waiting.
        let _ = sender.send(self.outcome_for(resolution));
        true
    }

    #[cfg(test)]
    pub(crate) fn is_resolved(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_none()
    }

    /// Current state with `resolution` applied.
    pub(crate) fn outcome_for(&self, resolution: Resolution) -> ProbeOutcome {
        let mut state = lock_state(&self.state).clone();
        let error = match resolution {
            Resolution::Callback(result) => {
                state.test_event = TestEventOutcome {
                    callback_result: Some(result),
                };
                None
            }
            Resolution::Timeout => Some(ProbeError::Timeout),
        };
        ProbeOutcome { state, error }
    }
}

/// Tears the gate down if the probe future is dropped before it resolves.
pub(crate) struct TeardownOnDrop(pub(crate) Arc<ResolutionGate>);

impl Drop for TeardownOnDrop {
    fn drop(&mut self) {
        self.0.teardown();
    }
}

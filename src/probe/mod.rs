// src/probe/mod.rs
// Tracker probe: independent polling loops for presence, initialization and a
// synthetic test event, raced against a timeout.

use std::ops::ControlFlow;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::boundaries::{PageWindow, TrackOptions, TrackerCallbackResult};

mod gate;

use gate::{lock_state, CancellationToken, Resolution, ResolutionGate, TeardownOnDrop};

/// Reserved event name used for the synthetic test event and to find its request.
pub const TEST_EVENT_NAME: &str = "verification-agent-test";

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

const MISSING_CALLBACK_RESULT: &str = "undefined or null";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProbeError {
    #[error("Test Qusto function timeout exceeded")]
    Timeout,
}

/// What the tracker reported to the test event's callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum CallbackResult {
    Status { status: u16 },
    Error { error: String },
    /// The tracker called back without a result.
    Missing(String),
}

impl CallbackResult {
    pub fn from_tracker(result: Option<TrackerCallbackResult>) -> Self {
        match result {
            Some(TrackerCallbackResult::Status(status)) => CallbackResult::Status { status },
            Some(TrackerCallbackResult::Error(error)) => CallbackResult::Error { error },
            None => CallbackResult::Missing(MISSING_CALLBACK_RESULT.to_string()),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            CallbackResult::Status { status } => Some(*status),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestEventOutcome {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_result: Option<CallbackResult>,
}

/// Signals observed by the polling loops.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbeState {
    pub tracker_on_window: bool,
    pub tracker_initialized: bool,
    pub version: Option<Value>,
    pub variant: Option<Value>,
    pub test_event: TestEventOutcome,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProbeOutcome {
    pub state: ProbeState,
    /// Set only when the timeout resolved the probe.
    pub error: Option<ProbeError>,
}

pub struct TrackerProbe {
    window: Arc<dyn PageWindow>,
    timeout: Duration,
    poll_interval: Duration,
}

impl TrackerProbe {
    pub fn new(window: Arc<dyn PageWindow>, timeout: Duration) -> Self {
        Self {
            window,
            timeout,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval.max(Duration::from_millis(1));
        self
    }

    /// Runs until the test event calls back or the timeout fires, whichever
    /// comes first. Always returns; partial observations are kept on timeout.
    pub async fn run(self) -> ProbeOutcome {
        let window = self.window;
        let state = Arc::new(Mutex::new(ProbeState {
            tracker_on_window: window.tracker_present(),
            tracker_initialized: window.tracker_initialized(),
            version: window.tracker_version(),
            variant: window.tracker_variant(),
            test_event: TestEventOutcome::default(),
        }));
        let (gate, outcome) = ResolutionGate::new(state.clone());
        let _teardown = TeardownOnDrop(gate.clone());

        let timer = {
            let gate = gate.clone();
            let timeout = self.timeout;
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                if gate.resolve(Resolution::Timeout) {
                    tracing::debug!("tracker probe resolved by timeout after {timeout:?}");
                }
            })
        };
        gate.track_task(timer.abort_handle());

        let presence = {
            let (state, window) = (state.clone(), window.clone());
            spawn_poll(self.poll_interval, gate.token(), move || {
                let mut state = lock_state(&state);
                if state.tracker_on_window {
                    return ControlFlow::Break(());
                }
                state.tracker_on_window = window.tracker_present();
                ControlFlow::Continue(())
            })
        };
        gate.track_task(presence.abort_handle());

        let initialization = {
            let (state, window) = (state.clone(), window.clone());
            spawn_poll(self.poll_interval, gate.token(), move || {
                if lock_state(&state).tracker_initialized {
                    let version = window.tracker_version();
                    let variant = window.tracker_variant();
                    let mut state = lock_state(&state);
                    state.version = version;
                    state.variant = variant;
                    return ControlFlow::Break(());
                }
                let initialized = window.tracker_initialized();
                lock_state(&state).tracker_initialized = initialized;
                ControlFlow::Continue(())
            })
        };
        gate.track_task(initialization.abort_handle());

        let test_event = {
            let (state, window, gate) = (state.clone(), window.clone(), gate.clone());
            let token = gate.token();
            spawn_poll(self.poll_interval, token, move || {
                let ready = {
                    let state = lock_state(&state);
                    state.tracker_on_window && state.tracker_initialized
                };
                if !ready {
                    return ControlFlow::Continue(());
                }
                // The callback may run synchronously inside `track`; no lock is held here.
                let gate = gate.clone();
                window.track(
                    TEST_EVENT_NAME,
                    TrackOptions::with_callback(move |result| {
                        if gate.resolve(Resolution::Callback(CallbackResult::from_tracker(result))) {
                            tracing::debug!("tracker probe resolved by test event callback");
                        }
                    }),
                );
                ControlFlow::Break(())
            })
        };
        gate.track_task(test_event.abort_handle());

        match outcome.await {
            Ok(outcome) => outcome,
            Err(_) => gate.outcome_for(Resolution::Timeout),
        }
    }
}

/// Runs `step` every `period`, first one period after start, until it breaks
/// or `token` is cancelled.
fn spawn_poll<F>(period: Duration, token: CancellationToken, mut step: F) -> JoinHandle<()>
where
    F: FnMut() -> ControlFlow<()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if token.is_cancelled() || step().is_break() {
                break;
            }
        }
    })
}

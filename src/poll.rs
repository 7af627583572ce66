// src/poll.rs
// Throttled re-checking and the simpler "is the tracker up yet" probe built on it.

use std::time::Duration;

use tokio::time::Instant;

use crate::boundaries::PageWindow;

pub const DEFAULT_WAIT_FOR_TRACKER_TIMEOUT: Duration = Duration::from_millis(5000);
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    Pass,
    Fail,
    Continue,
}

/// Passed to every check run. `timed_out` is set on the last run so the check
/// can give a final answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CheckContext {
    pub timed_out: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottledCheckOptions {
    pub timeout: Duration,
    pub interval: Duration,
}

impl Default for ThrottledCheckOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_WAIT_FOR_TRACKER_TIMEOUT,
            interval: DEFAULT_CHECK_INTERVAL,
        }
    }
}

/// Re-runs `check` every `interval` until it passes or fails. A check that
/// still answers `Continue` after the timeout counts as a failure.
pub async fn run_throttled_check<F>(mut check: F, options: ThrottledCheckOptions) -> bool
where
    F: FnMut(CheckContext) -> CheckOutcome,
{
    let started = Instant::now();
    let interval = options.interval.max(Duration::from_millis(1));
    loop {
        let timed_out = started.elapsed() >= options.timeout;
        match check(CheckContext { timed_out }) {
            CheckOutcome::Pass => return true,
            CheckOutcome::Fail => return false,
            CheckOutcome::Continue if timed_out => return false,
            CheckOutcome::Continue => {}
        }
        let remaining = options.timeout.saturating_sub(started.elapsed());
        tokio::time::sleep(interval.min(remaining.max(Duration::from_millis(1)))).await;
    }
}

/// Resolves `true` as soon as the tracker reports itself initialized, `false`
/// if it has not by `timeout`.
pub async fn wait_for_tracker_function(window: &dyn PageWindow, timeout: Duration) -> bool {
    let ready = run_throttled_check(
        |context| {
            if window.tracker_initialized() {
                CheckOutcome::Pass
            } else if context.timed_out {
                CheckOutcome::Fail
            } else {
                CheckOutcome::Continue
            }
        },
        ThrottledCheckOptions {
            timeout,
            interval: DEFAULT_CHECK_INTERVAL,
        },
    )
    .await;
    tracing::debug!(ready, "waited for tracker function");
    ready
}

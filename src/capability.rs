// src/capability.rs
// Process-wide marker telling the tracker that an automated visitor is the verification agent.
//
// The tracker skips tracking for webdriver-driven browsers unless this marker
// is set. It is set once per run and never cleared, so cooperating pages can
// see that the probe has been present.

use crate::boundaries::PageWindow;

/// Global marker the tracker consults before its webdriver check.
pub const AUTOMATION_BYPASS_MARKER: &str = "__plausible";

pub fn force_ignore_webdriver_condition(window: &dyn PageWindow) {
    if window.marker(AUTOMATION_BYPASS_MARKER) != Some(true) {
        tracing::debug!("setting {AUTOMATION_BYPASS_MARKER} for this page");
    }
    window.set_marker(AUTOMATION_BYPASS_MARKER, true);
}

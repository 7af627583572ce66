// src/lib.rs
// Entry point for the Qusto installation verifier

use thiserror::Error;

pub mod boundaries; // Page seams (window, document, consent, CSP) and in-memory pages
mod capability;     // Automation bypass marker
pub mod config;     // Defaults, env overrides and harness arguments
pub mod consent;    // Consent outcome coordination
pub mod csp;        // Content-Security-Policy host checks
pub mod dom;        // Minimal selector engine over element snapshots
mod logging;        // [VERIFICATION] debug lines
pub mod network;    // Network primitive, event interception, body normalization
pub mod poll;       // Throttled checks and the simple tracker wait
pub mod probe;      // Tracker probe state machine
pub mod verifier;   // Orchestration into one diagnostics record
#[cfg(test)]
mod test_support;

pub use boundaries::memory::{
    InMemoryTracker, InMemoryWindow, ScriptedReply, ScriptedTransport, TrackerDelivery,
};
pub use boundaries::{
    ConsentCallbacks, ConsentEngine, CspChecker, DirectiveCspChecker, ElementSnapshot,
    NoConsentEngine, PageDocument, PageWindow, TrackCallback, TrackOptions,
    TrackerCallbackResult,
};
pub use capability::AUTOMATION_BYPASS_MARKER;
pub use config::{ConfigError, HeaderMap, VerificationOptions, VerifierArgs};
pub use consent::{ConsentCoordinator, ConsentResult};
pub use dom::{SelectorError, StaticDocument};
pub use network::{
    FetchError, FetchFuture, FetchRequest, FetchResponse, FetchTransport, InterceptedBody,
    InterceptedEvent, NetworkPrimitive,
};
pub use poll::{run_throttled_check, wait_for_tracker_function};
pub use probe::{CallbackResult, ProbeError, TEST_EVENT_NAME};
pub use verifier::{DiagnosticsRecord, PageContext, VerificationResult};

/// Failures of the JSON harness entry. Both happen before or after a run,
/// never during one.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to serialize verification result: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Verifies the tracker installation on `page` with `options`.
pub async fn verify_qusto_installation(
    page: &PageContext,
    options: &VerificationOptions,
) -> VerificationResult {
    verifier::verify_installation(page, options).await
}

/// Harness entry: takes the camelCase argument object as JSON, merges it over
/// the defaults and any `QUSTO_VERIFY_*` environment overrides, and returns the
/// serialized `{"data": {...}}` result.
pub async fn verify_qusto_installation_json(
    page: &PageContext,
    args_json: &str,
) -> Result<String, HarnessError> {
    let args = VerifierArgs::from_json(args_json)?;
    let options = VerificationOptions::from_env()?.merged_with(args);
    let result = verifier::verify_installation(page, &options).await;
    Ok(serde_json::to_string(&result)?)
}

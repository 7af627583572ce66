use std::sync::Arc;

use super::contracts::{ConsentCallbacks, ConsentEngine, CspChecker};
use crate::config::HeaderMap;
use crate::consent::ConsentResult;

/// Consent engine for pages where no consent adapter is wired in. It never
/// calls back, so the record shows the engine as not started.
pub struct NoConsentEngine;

impl ConsentEngine for NoConsentEngine {
    fn initialize(&self, _debug: bool, _callbacks: Arc<dyn ConsentCallbacks>) -> ConsentResult {
        ConsentResult::not_started()
    }
}

/// Directive-based CSP checker; see `crate::csp`.
pub struct DirectiveCspChecker;

impl CspChecker for DirectiveCspChecker {
    fn is_disallowed(&self, response_headers: &HeaderMap, host_to_check: &str) -> bool {
        crate::csp::check_disallowed_by_csp(response_headers, host_to_check)
    }
}

pub(crate) const DEFAULT_CONSENT_ENGINE: NoConsentEngine = NoConsentEngine;
pub(crate) const DEFAULT_CSP_CHECKER: DirectiveCspChecker = DirectiveCspChecker;

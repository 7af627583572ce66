// src/verifier/mod.rs
// Runs one installation verification and assembles the diagnostics record.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::boundaries::{
    ConsentEngine, CspChecker, PageDocument, PageWindow, DEFAULT_CONSENT_ENGINE,
    DEFAULT_CSP_CHECKER,
};
use crate::capability::force_ignore_webdriver_condition;
use crate::config::VerificationOptions;
use crate::consent::{ConsentCoordinator, ConsentResult};
use crate::logging::VerificationLog;
use crate::network::{
    start_recording_event_fetch_calls, InterceptedBody, InterceptedError, InterceptedEvent,
    InterceptedRequest, InterceptedResponse, LegacyCompatBody, NetworkPrimitive,
};
use crate::probe::{CallbackResult, TrackerProbe, TEST_EVENT_NAME};

/// Legacy snippets declare their site on the tag itself.
pub const LEGACY_SNIPPET_SELECTOR: &str = "script[data-domain][src]";

/// Callback statuses that prove the test event was delivered.
const DELIVERED_STATUSES: [u16; 2] = [200, 202];

/// Everything the verifier reads from or does to the page under test.
#[derive(Clone)]
pub struct PageContext {
    pub window: Arc<dyn PageWindow>,
    pub document: Arc<dyn PageDocument>,
    pub network: Arc<NetworkPrimitive>,
    pub consent_engine: Arc<dyn ConsentEngine>,
    pub csp_checker: Arc<dyn CspChecker>,
}

impl PageContext {
    pub fn new(
        window: Arc<dyn PageWindow>,
        document: Arc<dyn PageDocument>,
        network: Arc<NetworkPrimitive>,
    ) -> Self {
        Self {
            window,
            document,
            network,
            consent_engine: Arc::new(DEFAULT_CONSENT_ENGINE),
            csp_checker: Arc::new(DEFAULT_CSP_CHECKER),
        }
    }

    pub fn with_consent_engine(mut self, engine: Arc<dyn ConsentEngine>) -> Self {
        self.consent_engine = engine;
        self
    }

    pub fn with_csp_checker(mut self, checker: Arc<dyn CspChecker>) -> Self {
        self.csp_checker = checker;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestEventDiagnostics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_result: Option<CallbackResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracker_function_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normalized_body: Option<InterceptedBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<InterceptedError>,
}

/// Result of one verification run.
///
/// A reconstructed legacy test event reports `domain: null` when the snippet's
/// `data-domain` is empty or starts with a blank entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsRecord {
    pub disallowed_by_csp: bool,
    pub tracker_is_in_html: bool,
    pub tracker_is_on_window: bool,
    pub tracker_is_initialized: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracker_version: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracker_variant: Option<Value>,
    pub test_event: TestEventDiagnostics,
    pub cookies_consent_result: ConsentResult,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationData {
    pub completed: bool,
    #[serde(flatten)]
    pub diagnostics: DiagnosticsRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationResult {
    pub data: VerificationData,
}

/// Verifies the tracker installation on `page`. Never fails: every problem
/// found on the page degrades a field of the record instead.
pub async fn verify_installation(
    page: &PageContext,
    options: &VerificationOptions,
) -> VerificationResult {
    let log = VerificationLog::new(options.debug);

    let disallowed_by_csp = page
        .csp_checker
        .is_disallowed(&options.response_headers, &options.csp_host_to_check);
    let tracker_is_in_html = page
        .document
        .query_selector(&options.tracker_script_selector)
        .is_some();

    force_ignore_webdriver_condition(page.window.as_ref());
    let recorder = start_recording_event_fetch_calls(&page.network);

    let consent = ConsentCoordinator::new();
    let initial = page
        .consent_engine
        .initialize(options.debug, consent.clone());
    consent.seed(initial);

    let probe = TrackerProbe::new(page.window.clone(), options.timeout)
        .with_poll_interval(options.poll_interval)
        .run()
        .await;
    let cookies_consent_result = consent.seal();

    if let Some(error) = &probe.error {
        log.line(format_args!(
            "There was an error testing the tracker function: {error}"
        ));
    }

    recorder.stop_recording();

    let mut test_event = recorder.get_intercepted_fetch(TEST_EVENT_NAME);
    if test_event.is_none() {
        log.line("No test event request was among intercepted requests");
    }

    let callback_result = probe.state.test_event.callback_result.clone();
    let delivered_status = callback_result
        .as_ref()
        .and_then(CallbackResult::status)
        .filter(|status| DELIVERED_STATUSES.contains(status));
    if let (None, Some(status)) = (&test_event, delivered_status) {
        log.line(
            "The callback result indicates a successful request, assuming legacy compat installation",
        );
        test_event = legacy_compat_event(page.document.as_ref(), status);
    }

    let diagnostics = DiagnosticsRecord {
        disallowed_by_csp,
        tracker_is_in_html,
        tracker_is_on_window: probe.state.tracker_on_window,
        tracker_is_initialized: probe.state.tracker_initialized,
        tracker_version: probe.state.version,
        tracker_variant: probe.state.variant,
        test_event: TestEventDiagnostics {
            callback_result,
            tracker_function_error: probe.error.map(|error| error.to_string()),
            request_url: test_event
                .as_ref()
                .and_then(|event| event.request.url.clone()),
            normalized_body: test_event
                .as_ref()
                .map(|event| event.request.normalized_body.clone()),
            response_status: test_event
                .as_ref()
                .and_then(|event| event.response.as_ref())
                .map(|response| response.status),
            error: test_event.and_then(|event| event.error),
        },
        cookies_consent_result,
    };

    log.record("diagnostics", &diagnostics);

    VerificationResult {
        data: VerificationData {
            completed: true,
            diagnostics,
        },
    }
}

/// Stand-in test event for installations whose delivery bypasses the network
/// primitive. Uses the first legacy snippet; with several snippets for
/// different sites the attribution is ambiguous and stays that way.
fn legacy_compat_event(document: &dyn PageDocument, status: u16) -> Option<InterceptedEvent> {
    let snippet = document.query_selector(LEGACY_SNIPPET_SELECTOR)?;
    // Legacy snippets may list several domains separated by commas.
    let domain = snippet
        .attribute("data-domain")
        .and_then(|domains| domains.split(',').next())
        .map(str::trim)
        .filter(|domain| !domain.is_empty())
        .map(str::to_string);

    Some(InterceptedEvent {
        request: InterceptedRequest {
            url: None,
            normalized_body: InterceptedBody::LegacyCompat(LegacyCompatBody {
                legacy_compat_installation: true,
                domain,
            }),
        },
        response: Some(InterceptedResponse { status, body: None }),
        error: None,
    })
}

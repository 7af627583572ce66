// src/network/interceptor.rs
// Records tracked-event calls that pass through the network primitive without changing them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;

use super::{
    normalize_event_body, FetchFuture, FetchRequest, FetchTransport, NetworkPrimitive,
    NormalizedEventBody,
};

/// Body recorded for an intercepted event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum InterceptedBody {
    Tracked(NormalizedEventBody),
    LegacyCompat(LegacyCompatBody),
}

impl InterceptedBody {
    pub fn domain(&self) -> Option<&str> {
        match self {
            InterceptedBody::Tracked(body) => Some(body.domain.as_str()),
            InterceptedBody::LegacyCompat(body) => body.domain.as_deref(),
        }
    }
}

/// Stand-in body for installations whose event delivery bypasses the primitive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LegacyCompatBody {
    #[serde(rename = "__legacyCompatInstallation")]
    pub legacy_compat_installation: bool,
    pub domain: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InterceptedRequest {
    pub url: Option<String>,
    pub normalized_body: InterceptedBody,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterceptedResponse {
    pub status: u16,
    pub body: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterceptedError {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InterceptedEvent {
    pub request: InterceptedRequest,
    pub response: Option<InterceptedResponse>,
    pub error: Option<InterceptedError>,
}

impl InterceptedEvent {
    fn requested(url: String, body: NormalizedEventBody) -> Self {
        Self {
            request: InterceptedRequest {
                url: Some(url),
                normalized_body: InterceptedBody::Tracked(body),
            },
            response: None,
            error: None,
        }
    }
}

type Interceptions = Arc<Mutex<HashMap<String, InterceptedEvent>>>;

fn with_interceptions<T>(
    interceptions: &Interceptions,
    f: impl FnOnce(&mut HashMap<String, InterceptedEvent>) -> T,
) -> T {
    let mut map = interceptions
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    f(&mut map)
}

struct RecordingTransport {
    inner: Arc<dyn FetchTransport>,
    interceptions: Interceptions,
}

impl FetchTransport for RecordingTransport {
    fn fetch(&self, request: FetchRequest) -> FetchFuture {
        let identifier = normalize_event_body(&request).map(|body| {
            let name = body.name.clone();
            let event = InterceptedEvent::requested(request.url.clone(), body);
            with_interceptions(&self.interceptions, |map| map.insert(name.clone(), event));
            name
        });

        let pending = self.inner.fetch(request);
        let Some(identifier) = identifier else {
            return pending;
        };

        let interceptions = self.interceptions.clone();
        Box::pin(async move {
            match pending.await {
                Ok(response) => {
                    let observed = response.clone();
                    with_interceptions(&interceptions, |map| {
                        if let Some(event) = map.get_mut(&identifier) {
                            event.response = Some(InterceptedResponse {
                                status: observed.status,
                                body: Some(observed.text()),
                            });
                        }
                    });
                    Ok(response)
                }
                Err(error) => {
                    with_interceptions(&interceptions, |map| {
                        if let Some(event) = map.get_mut(&identifier) {
                            event.error = Some(InterceptedError {
                                message: error.message(),
                            });
                        }
                    });
                    Err(error)
                }
            }
        })
    }
}

/// Handle for one recording session over the network primitive.
///
/// The original transport is restored by `stop_recording` or, failing that,
/// when the recorder is dropped.
pub struct EventFetchRecorder {
    network: Arc<NetworkPrimitive>,
    original: Mutex<Option<Arc<dyn FetchTransport>>>,
    interceptions: Interceptions,
}

/// Wraps the network primitive so tracked-event calls are recorded by event name.
pub fn start_recording_event_fetch_calls(network: &Arc<NetworkPrimitive>) -> EventFetchRecorder {
    let interceptions: Interceptions = Arc::new(Mutex::new(HashMap::new()));
    let original = network.current();
    let recording = RecordingTransport {
        inner: original.clone(),
        interceptions: interceptions.clone(),
    };
    network.replace(Arc::new(recording));
    tracing::debug!("event fetch recording installed");

    EventFetchRecorder {
        network: network.clone(),
        original: Mutex::new(Some(original)),
        interceptions,
    }
}

impl EventFetchRecorder {
    pub fn get_intercepted_fetch(&self, name: &str) -> Option<InterceptedEvent> {
        with_interceptions(&self.interceptions, |map| map.get(name).cloned())
    }

    pub fn is_recording(&self) -> bool {
        self.original
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_some()
    }

    /// Puts the original transport back. Later calls are a no-op.
    pub fn stop_recording(&self) {
        let original = self
            .original
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(original) = original {
            self.network.replace(original);
            tracing::debug!("event fetch recording stopped");
        }
    }
}

impl Drop for EventFetchRecorder {
    fn drop(&mut self) {
        self.stop_recording();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{FetchError, FetchResponse};
    use crate::test_support::{ScriptedReply, ScriptedTransport};

    const EVENT_URL: &str = "https://analytics.qusto.io/api/event";

    fn network_with(transport: Arc<ScriptedTransport>) -> Arc<NetworkPrimitive> {
        Arc::new(NetworkPrimitive::new(transport))
    }

    fn event_request(name: &str) -> FetchRequest {
        FetchRequest::post(EVENT_URL, format!(r#"{{"n":"{name}","d":"example.com"}}"#))
    }

    #[tokio::test]
    async fn records_tracked_event_with_response() {
        let transport = Arc::new(ScriptedTransport::replying(ScriptedReply::status(202, "ok")));
        let network = network_with(transport.clone());
        let recorder = start_recording_event_fetch_calls(&network);

        let response = network.fetch(event_request("signup")).await.unwrap();
        assert_eq!(response, FetchResponse::new(202, "ok"));

        let event = recorder.get_intercepted_fetch("signup").unwrap();
        assert_eq!(event.request.url.as_deref(), Some(EVENT_URL));
        assert_eq!(event.request.normalized_body.domain(), Some("example.com"));
        assert_eq!(
            event.response,
            Some(InterceptedResponse {
                status: 202,
                body: Some("ok".to_string())
            })
        );
        assert_eq!(event.error, None);
    }

    #[tokio::test]
    async fn untracked_calls_pass_through_unrecorded() {
        let transport = Arc::new(ScriptedTransport::replying(ScriptedReply::status(200, "page")));
        let network = network_with(transport.clone());
        let recorder = start_recording_event_fetch_calls(&network);

        let response = network.fetch(FetchRequest::get("https://example.com/api")).await.unwrap();
        assert_eq!(response.status, 200);
        let _ = network
            .fetch(FetchRequest::post(EVENT_URL, "{not json"))
            .await
            .unwrap();

        assert_eq!(transport.calls().len(), 2);
        assert!(with_interceptions(&recorder.interceptions, |map| map.is_empty()));
    }

    #[tokio::test]
    async fn network_failure_is_recorded_and_re_raised() {
        let transport = Arc::new(ScriptedTransport::replying(ScriptedReply::Fail(
            FetchError::Network("Failed to fetch".to_string()),
        )));
        let network = network_with(transport);
        let recorder = start_recording_event_fetch_calls(&network);

        let result = network.fetch(event_request("signup")).await;
        assert_eq!(result, Err(FetchError::Network("Failed to fetch".to_string())));

        let event = recorder.get_intercepted_fetch("signup").unwrap();
        assert_eq!(
            event.error,
            Some(InterceptedError {
                message: "Failed to fetch".to_string()
            })
        );
        assert_eq!(event.response, None);
    }

    #[tokio::test]
    async fn aborted_request_is_recorded_with_abort_message() {
        let transport = Arc::new(ScriptedTransport::replying(ScriptedReply::Fail(
            FetchError::Aborted,
        )));
        let network = network_with(transport);
        let recorder = start_recording_event_fetch_calls(&network);

        let result = network.fetch(event_request("signup")).await;
        assert_eq!(result, Err(FetchError::Aborted));

        let event = recorder.get_intercepted_fetch("signup").unwrap();
        assert_eq!(
            event.error,
            Some(InterceptedError {
                message: "The operation was aborted".to_string()
            })
        );
    }

    #[tokio::test]
    async fn request_is_recorded_before_the_response_arrives() {
        let transport = Arc::new(ScriptedTransport::replying(ScriptedReply::Hang));
        let network = network_with(transport);
        let recorder = start_recording_event_fetch_calls(&network);

        let pending = network.fetch(event_request("signup"));
        let event = recorder.get_intercepted_fetch("signup").unwrap();
        assert_eq!(event.response, None);
        assert_eq!(event.error, None);
        drop(pending);
    }

    #[tokio::test]
    async fn calls_after_stop_are_never_recorded() {
        let transport = Arc::new(ScriptedTransport::replying(ScriptedReply::status(202, "ok")));
        let network = network_with(transport);
        let recorder = start_recording_event_fetch_calls(&network);
        assert!(recorder.is_recording());

        recorder.stop_recording();
        recorder.stop_recording();
        assert!(!recorder.is_recording());

        network.fetch(event_request("late")).await.unwrap();
        assert_eq!(recorder.get_intercepted_fetch("late"), None);
    }

    #[tokio::test]
    async fn dropping_the_recorder_restores_the_original_transport() {
        let transport = Arc::new(ScriptedTransport::replying(ScriptedReply::status(202, "ok")));
        let network = network_with(transport.clone());
        let original = network.current();
        {
            let _recorder = start_recording_event_fetch_calls(&network);
            assert!(!Arc::ptr_eq(&network.current(), &original));
        }
        assert!(Arc::ptr_eq(&network.current(), &original));
    }

    #[test]
    fn legacy_body_serializes_with_compat_marker() {
        let body = InterceptedBody::LegacyCompat(LegacyCompatBody {
            legacy_compat_installation: true,
            domain: Some("a.com".to_string()),
        });
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({"__legacyCompatInstallation": true, "domain": "a.com"})
        );
    }
}

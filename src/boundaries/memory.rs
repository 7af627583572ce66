// In-memory page pieces for harnesses and tests: a window with a scriptable
// tracker and a transport with canned replies.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde_json::{json, Value};

use super::contracts::{PageWindow, TrackOptions, TrackerCallbackResult};
use crate::network::{
    FetchError, FetchFuture, FetchRequest, FetchResponse, FetchTransport, NetworkPrimitive,
};

/// How an in-memory tracker delivers the events it is asked to track.
#[derive(Clone)]
pub enum TrackerDelivery {
    /// POSTs a compact event body through the page's network primitive and
    /// reports the outcome to the callback.
    Fetch {
        network: Arc<NetworkPrimitive>,
        endpoint: String,
        domain: String,
    },
    /// Skips the network primitive and reports `result` straight away, the
    /// way legacy builds that send through another channel behave.
    Direct(Option<TrackerCallbackResult>),
    /// Never calls back.
    Silent,
}

#[derive(Clone)]
pub struct InMemoryTracker {
    pub initialized: bool,
    pub version: Option<Value>,
    pub variant: Option<Value>,
    pub delivery: TrackerDelivery,
}

impl InMemoryTracker {
    pub fn new(delivery: TrackerDelivery) -> Self {
        Self {
            initialized: false,
            version: None,
            variant: None,
            delivery,
        }
    }

    pub fn initialized(mut self, version: Value, variant: Value) -> Self {
        self.initialized = true;
        self.version = Some(version);
        self.variant = Some(variant);
        self
    }
}

#[derive(Default)]
struct WindowState {
    tracker: Option<InMemoryTracker>,
    markers: HashMap<String, bool>,
    tracked: Vec<String>,
}

#[derive(Default)]
pub struct InMemoryWindow {
    state: Mutex<WindowState>,
}

impl InMemoryWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tracker(tracker: InMemoryTracker) -> Self {
        let window = Self::new();
        window.install_tracker(tracker);
        window
    }

    fn state(&self) -> MutexGuard<'_, WindowState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn install_tracker(&self, tracker: InMemoryTracker) {
        self.state().tracker = Some(tracker);
    }

    pub fn remove_tracker(&self) {
        self.state().tracker = None;
    }

    /// Flips the installed tracker to initialized. No-op without a tracker.
    pub fn mark_initialized(&self, version: Value, variant: Value) {
        if let Some(tracker) = self.state().tracker.as_mut() {
            tracker.initialized = true;
            tracker.version = Some(version);
            tracker.variant = Some(variant);
        }
    }

    /// Names passed to `track`, in call order.
    pub fn tracked_events(&self) -> Vec<String> {
        self.state().tracked.clone()
    }
}

impl PageWindow for InMemoryWindow {
    fn tracker_present(&self) -> bool {
        self.state().tracker.is_some()
    }

    fn tracker_initialized(&self) -> bool {
        self.state()
            .tracker
            .as_ref()
            .is_some_and(|tracker| tracker.initialized)
    }

    fn tracker_version(&self) -> Option<Value> {
        self.state().tracker.as_ref()?.version.clone()
    }

    fn tracker_variant(&self) -> Option<Value> {
        self.state().tracker.as_ref()?.variant.clone()
    }

    fn track(&self, event_name: &str, options: TrackOptions) {
        let delivery = {
            let mut state = self.state();
            let Some(tracker) = state.tracker.as_ref() else {
                return;
            };
            let delivery = tracker.delivery.clone();
            state.tracked.push(event_name.to_string());
            delivery
        };
        let callback = options.callback;

        match delivery {
            TrackerDelivery::Fetch {
                network,
                endpoint,
                domain,
            } => {
                let body = json!({ "n": event_name, "d": domain, "u": "https://example.com/" });
                let pending = network.fetch(FetchRequest::post(endpoint, body.to_string()));
                let Ok(handle) = tokio::runtime::Handle::try_current() else {
                    tracing::warn!("in-memory tracker has no runtime to deliver {event_name}");
                    return;
                };
                handle.spawn(async move {
                    let result = match pending.await {
                        Ok(response) => TrackerCallbackResult::Status(response.status),
                        Err(error) => TrackerCallbackResult::Error(error.message()),
                    };
                    if let Some(callback) = callback {
                        callback(Some(result));
                    }
                });
            }
            TrackerDelivery::Direct(result) => {
                if let Some(callback) = callback {
                    callback(result);
                }
            }
            TrackerDelivery::Silent => {}
        }
    }

    fn set_marker(&self, name: &str, value: bool) {
        self.state().markers.insert(name.to_string(), value);
    }

    fn marker(&self, name: &str) -> Option<bool> {
        self.state().markers.get(name).copied()
    }
}

#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Respond {
        status: u16,
        body: String,
        delay: Duration,
    },
    Fail(FetchError),
    /// The request never settles.
    Hang,
}

impl ScriptedReply {
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        ScriptedReply::Respond {
            status,
            body: body.into(),
            delay: Duration::ZERO,
        }
    }

    pub fn delayed(status: u16, body: impl Into<String>, delay: Duration) -> Self {
        ScriptedReply::Respond {
            status,
            body: body.into(),
            delay,
        }
    }
}

/// Transport answering every call with a canned reply, optionally per URL prefix.
pub struct ScriptedTransport {
    fallback: ScriptedReply,
    routes: Vec<(String, ScriptedReply)>,
    calls: Mutex<Vec<FetchRequest>>,
}

impl ScriptedTransport {
    pub fn replying(fallback: ScriptedReply) -> Self {
        Self {
            fallback,
            routes: Vec::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_route(mut self, url_prefix: impl Into<String>, reply: ScriptedReply) -> Self {
        self.routes.push((url_prefix.into(), reply));
        self
    }

    pub fn calls(&self) -> Vec<FetchRequest> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn reply_for(&self, url: &str) -> ScriptedReply {
        self.routes
            .iter()
            .find(|(prefix, _)| url.starts_with(prefix.as_str()))
            .map(|(_, reply)| reply.clone())
            .unwrap_or_else(|| self.fallback.clone())
    }
}

impl FetchTransport for ScriptedTransport {
    fn fetch(&self, request: FetchRequest) -> FetchFuture {
        let reply = self.reply_for(&request.url);
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(request);

        Box::pin(async move {
            match reply {
                ScriptedReply::Respond {
                    status,
                    body,
                    delay,
                } => {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    Ok(FetchResponse::new(status, body))
                }
                ScriptedReply::Fail(error) => Err(error),
                ScriptedReply::Hang => std::future::pending().await,
            }
        })
    }
}

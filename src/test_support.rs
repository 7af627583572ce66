use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

pub(crate) use crate::boundaries::memory::{
    InMemoryTracker, InMemoryWindow, ScriptedReply, ScriptedTransport, TrackerDelivery,
};
use crate::boundaries::{ConsentCallbacks, ConsentEngine, ElementSnapshot};
use crate::consent::ConsentResult;
use crate::dom::StaticDocument;
use crate::network::NetworkPrimitive;
use crate::verifier::PageContext;

pub(crate) const EVENT_ENDPOINT: &str = "https://analytics.qusto.io/api/event";
pub(crate) const SITE_DOMAIN: &str = "example.com";

pub(crate) fn tracker_script_tag() -> ElementSnapshot {
    ElementSnapshot::new("script")
        .with_attribute("defer", "")
        .with_attribute("src", "https://analytics.qusto.io/js/script.js")
}

pub(crate) fn legacy_script_tag(domains: &str) -> ElementSnapshot {
    ElementSnapshot::new("script")
        .with_attribute("data-domain", domains)
        .with_attribute("src", "https://analytics.qusto.io/js/script.compat.js")
}

pub(crate) fn ready_tracker(delivery: TrackerDelivery) -> InMemoryTracker {
    InMemoryTracker::new(delivery).initialized(json!("2.1.0"), json!("default"))
}

/// A page whose tracker reports through its own network primitive.
pub(crate) struct TestPage {
    pub window: Arc<InMemoryWindow>,
    pub document: Arc<StaticDocument>,
    pub transport: Arc<ScriptedTransport>,
    pub network: Arc<NetworkPrimitive>,
}

impl TestPage {
    pub(crate) fn new(reply: ScriptedReply, elements: Vec<ElementSnapshot>) -> Self {
        let transport = Arc::new(ScriptedTransport::replying(reply));
        let network = Arc::new(NetworkPrimitive::new(transport.clone()));
        Self {
            window: Arc::new(InMemoryWindow::new()),
            document: Arc::new(StaticDocument::new(elements)),
            transport,
            network,
        }
    }

    pub(crate) fn fetch_delivery(&self) -> TrackerDelivery {
        TrackerDelivery::Fetch {
            network: self.network.clone(),
            endpoint: EVENT_ENDPOINT.to_string(),
            domain: SITE_DOMAIN.to_string(),
        }
    }

    pub(crate) fn context(&self) -> PageContext {
        PageContext::new(
            self.window.clone(),
            self.document.clone(),
            self.network.clone(),
        )
    }
}

#[derive(Debug, Clone)]
pub(crate) enum ConsentStep {
    Lifecycle(&'static str),
    Done(Option<&'static str>),
    Error(&'static str),
}

/// Consent engine replaying timed callbacks from a background task.
pub(crate) struct ScriptedConsentEngine {
    initial: ConsentResult,
    steps: Vec<(Duration, ConsentStep)>,
}

impl ScriptedConsentEngine {
    pub(crate) fn new(initial: ConsentResult, steps: Vec<(Duration, ConsentStep)>) -> Self {
        Self { initial, steps }
    }
}

impl ConsentEngine for ScriptedConsentEngine {
    fn initialize(&self, _debug: bool, callbacks: Arc<dyn ConsentCallbacks>) -> ConsentResult {
        let steps = self.steps.clone();
        tokio::spawn(async move {
            for (delay, step) in steps {
                tokio::time::sleep(delay).await;
                match step {
                    ConsentStep::Lifecycle(stage) => callbacks.on_lifecycle_update(stage),
                    ConsentStep::Done(cmp) => callbacks.on_consent_done(cmp.map(str::to_string)),
                    ConsentStep::Error(error) => callbacks.on_consent_error(error.to_string()),
                }
            }
        });
        self.initial.clone()
    }
}

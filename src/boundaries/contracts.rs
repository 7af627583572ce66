use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::config::HeaderMap;
use crate::consent::ConsentResult;

/// Outcome the tracker reports to a `track` callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerCallbackResult {
    /// The event request completed with this HTTP status.
    Status(u16),
    /// The event request failed before a response arrived.
    Error(String),
}

pub type TrackCallback = Box<dyn FnOnce(Option<TrackerCallbackResult>) + Send>;

/// Options passed alongside a tracker `track` call.
pub struct TrackOptions {
    pub callback: Option<TrackCallback>,
}

impl TrackOptions {
    pub fn with_callback(callback: impl FnOnce(Option<TrackerCallbackResult>) + Send + 'static) -> Self {
        Self {
            callback: Some(Box::new(callback)),
        }
    }
}

impl std::fmt::Debug for TrackOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackOptions")
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

/// Global scope of the page under test, as far as the probe reads or writes it.
pub trait PageWindow: Send + Sync {
    /// The tracker object exists on the global scope.
    fn tracker_present(&self) -> bool;
    /// The tracker's initialized flag.
    fn tracker_initialized(&self) -> bool;
    fn tracker_version(&self) -> Option<Value>;
    fn tracker_variant(&self) -> Option<Value>;
    /// Invokes the tracker itself. Does nothing when the tracker is absent.
    fn track(&self, event_name: &str, options: TrackOptions);
    fn set_marker(&self, name: &str, value: bool);
    fn marker(&self, name: &str) -> Option<bool>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ElementSnapshot {
    pub tag: String,
    pub attributes: BTreeMap<String, String>,
}

impl ElementSnapshot {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_ascii_lowercase(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

pub trait PageDocument: Send + Sync {
    /// First element in document order matching `selector`.
    fn query_selector(&self, selector: &str) -> Option<ElementSnapshot>;
}

/// Signals the consent engine reports while it works through a consent banner.
pub trait ConsentCallbacks: Send + Sync {
    fn on_consent_done(&self, cmp: Option<String>);
    fn on_consent_error(&self, error: String);
    fn on_lifecycle_update(&self, stage: &str);
}

/// The external cookie-consent adapter.
pub trait ConsentEngine: Send + Sync {
    /// Starts the engine and returns its state at the moment of return.
    fn initialize(&self, debug: bool, callbacks: Arc<dyn ConsentCallbacks>) -> ConsentResult;
}

pub trait CspChecker: Send + Sync {
    /// True when the page's CSP would block the tracker host.
    fn is_disallowed(&self, response_headers: &HeaderMap, host_to_check: &str) -> bool;
}

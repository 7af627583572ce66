// src/network/mod.rs
// The page's single outbound network primitive and the values that flow through it.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use thiserror::Error;

pub mod interceptor;
pub mod normalize;

pub use interceptor::{
    start_recording_event_fetch_calls, EventFetchRecorder, InterceptedBody, InterceptedError,
    InterceptedEvent, InterceptedRequest, InterceptedResponse, LegacyCompatBody,
};
pub use normalize::{normalize_event_body, NormalizedEventBody};

const UNKNOWN_FETCH_ERROR: &str = "Unknown error during fetch";

/// One outbound request as the page issues it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FetchRequest {
    pub url: String,
    pub method: Option<String>,
    pub body: Option<String>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: Some("GET".to_string()),
            body: None,
        }
    }

    pub fn post(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: Some("POST".to_string()),
            body: Some(body.into()),
        }
    }
}

/// Response handed back to the page. Cloning shares the body bytes, so an
/// observer reading a clone never consumes what the page reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    body: Arc<[u8]>,
}

impl FetchResponse {
    pub fn new(status: u16, body: impl AsRef<[u8]>) -> Self {
        Self {
            status,
            body: Arc::from(body.as_ref()),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.body
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("{0}")]
    Network(String),
    #[error("The operation was aborted")]
    Aborted,
    #[error("Unknown error during fetch")]
    Unknown,
}

impl FetchError {
    /// Message surfaced in diagnostics; never empty.
    pub fn message(&self) -> String {
        match self {
            FetchError::Network(message) if message.trim().is_empty() => {
                UNKNOWN_FETCH_ERROR.to_string()
            }
            other => other.to_string(),
        }
    }
}

pub type FetchFuture = Pin<Box<dyn Future<Output = Result<FetchResponse, FetchError>> + Send>>;

/// Something that can perform one outbound call.
pub trait FetchTransport: Send + Sync {
    fn fetch(&self, request: FetchRequest) -> FetchFuture;
}

/// The page-wide network entry point. Page code always calls through here,
/// so swapping the installed transport changes what every later call uses.
pub struct NetworkPrimitive {
    current: Mutex<Arc<dyn FetchTransport>>,
}

impl NetworkPrimitive {
    pub fn new(transport: Arc<dyn FetchTransport>) -> Self {
        Self {
            current: Mutex::new(transport),
        }
    }

    pub fn fetch(&self, request: FetchRequest) -> FetchFuture {
        let transport = self.current();
        transport.fetch(request)
    }

    pub fn current(&self) -> Arc<dyn FetchTransport> {
        self.current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Installs `transport`, returning the one it replaced.
    pub(crate) fn replace(&self, transport: Arc<dyn FetchTransport>) -> Arc<dyn FetchTransport> {
        let mut current = self
            .current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::replace(&mut *current, transport)
    }
}

impl std::fmt::Debug for NetworkPrimitive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkPrimitive").finish_non_exhaustive()
    }
}

mod adapters;
mod contracts;
pub mod memory;

pub use adapters::{DirectiveCspChecker, NoConsentEngine};
pub(crate) use adapters::{DEFAULT_CONSENT_ENGINE, DEFAULT_CSP_CHECKER};
pub use contracts::{
    ConsentCallbacks, ConsentEngine, CspChecker, ElementSnapshot, PageDocument, PageWindow,
    TrackCallback, TrackOptions, TrackerCallbackResult,
};

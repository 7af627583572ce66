// src/consent.rs
// Folds the consent engine's callbacks into one consent outcome.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;

use crate::boundaries::ConsentCallbacks;

const NOT_STARTED: &str = "not-started";
const LIFECYCLE_DONE: &str = "done";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "ConsentResultWire")]
pub enum ConsentResult {
    /// No outcome yet; carries the last lifecycle stage the engine reported.
    Pending { engine_lifecycle: String },
    /// Consent was resolved, optionally by a named consent-management platform.
    Handled { cmp: Option<String> },
    /// The engine failed.
    Failed { error: String },
}

impl ConsentResult {
    pub fn not_started() -> Self {
        ConsentResult::Pending {
            engine_lifecycle: NOT_STARTED.to_string(),
        }
    }

    /// `None` while pending, otherwise whether consent was handled.
    pub fn handled(&self) -> Option<bool> {
        match self {
            ConsentResult::Pending { .. } => None,
            ConsentResult::Handled { .. } => Some(true),
            ConsentResult::Failed { .. } => Some(false),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConsentResultWire {
    handled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    engine_lifecycle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cmp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl From<ConsentResult> for ConsentResultWire {
    fn from(result: ConsentResult) -> Self {
        let handled = result.handled();
        match result {
            ConsentResult::Pending { engine_lifecycle } => ConsentResultWire {
                handled,
                engine_lifecycle: Some(engine_lifecycle),
                cmp: None,
                error: None,
            },
            ConsentResult::Handled { cmp } => ConsentResultWire {
                handled,
                engine_lifecycle: None,
                cmp,
                error: None,
            },
            ConsentResult::Failed { error } => ConsentResultWire {
                handled,
                engine_lifecycle: None,
                cmp: None,
                error: Some(error),
            },
        }
    }
}

struct CoordinatorState {
    result: ConsentResult,
    sealed: bool,
}

/// Receives the consent engine's callbacks for one run.
///
/// The first success or error wins. Lifecycle stages only update a pending
/// result. After `seal` every callback is ignored.
pub struct ConsentCoordinator {
    state: Mutex<CoordinatorState>,
}

impl ConsentCoordinator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(CoordinatorState {
                result: ConsentResult::not_started(),
                sealed: false,
            }),
        })
    }

    fn state(&self) -> MutexGuard<'_, CoordinatorState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // Applies `next` only while no outcome has been reached.
    fn update_pending(&self, next: impl FnOnce(&mut ConsentResult)) {
        let mut state = self.state();
        if state.sealed || state.result.handled().is_some() {
            return;
        }
        next(&mut state.result);
    }

    /// Adopts the engine's synchronous return value unless a callback already
    /// settled the outcome during initialization.
    pub fn seed(&self, initial: ConsentResult) {
        self.update_pending(|result| *result = initial);
    }

    pub fn snapshot(&self) -> ConsentResult {
        self.state().result.clone()
    }

    /// Freezes the outcome and returns it.
    pub fn seal(&self) -> ConsentResult {
        let mut state = self.state();
        state.sealed = true;
        state.result.clone()
    }
}

impl ConsentCallbacks for ConsentCoordinator {
    fn on_consent_done(&self, cmp: Option<String>) {
        self.update_pending(|result| *result = ConsentResult::Handled { cmp });
    }

    fn on_consent_error(&self, error: String) {
        self.update_pending(|result| *result = ConsentResult::Failed { error });
    }

    fn on_lifecycle_update(&self, stage: &str) {
        self.update_pending(|result| {
            *result = if stage == LIFECYCLE_DONE {
                ConsentResult::Handled { cmp: None }
            } else {
                ConsentResult::Pending {
                    engine_lifecycle: stage.to_string(),
                }
            };
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn starts_pending_as_not_started() {
        let coordinator = ConsentCoordinator::new();
        assert_eq!(coordinator.snapshot(), ConsentResult::not_started());
        assert_eq!(coordinator.snapshot().handled(), None);
    }

    #[test]
    fn lifecycle_updates_replace_the_pending_stage() {
        let coordinator = ConsentCoordinator::new();
        coordinator.on_lifecycle_update("initialized");
        coordinator.on_lifecycle_update("cmpDetected");
        assert_eq!(
            coordinator.snapshot(),
            ConsentResult::Pending {
                engine_lifecycle: "cmpDetected".to_string()
            }
        );
    }

    #[test]
    fn done_lifecycle_resolves_without_cmp() {
        let coordinator = ConsentCoordinator::new();
        coordinator.on_lifecycle_update("done");
        assert_eq!(coordinator.snapshot(), ConsentResult::Handled { cmp: None });
    }

    #[test]
    fn consent_done_is_not_overwritten_by_later_signals() {
        let coordinator = ConsentCoordinator::new();
        coordinator.on_consent_done(Some("Cookiebot".to_string()));
        coordinator.on_lifecycle_update("done");
        coordinator.on_lifecycle_update("waitingForPopup");
        coordinator.on_consent_error("popup vanished".to_string());

        assert_eq!(
            coordinator.snapshot(),
            ConsentResult::Handled {
                cmp: Some("Cookiebot".to_string())
            }
        );
    }

    #[test]
    fn consent_error_is_not_overwritten_by_later_signals() {
        let coordinator = ConsentCoordinator::new();
        coordinator.on_consent_error("engine crashed".to_string());
        coordinator.on_consent_done(None);
        coordinator.on_lifecycle_update("done");
        assert_eq!(coordinator.snapshot().handled(), Some(false));
    }

    #[test]
    fn seed_does_not_override_an_outcome_reached_during_initialization() {
        let coordinator = ConsentCoordinator::new();
        coordinator.on_consent_done(Some("OneTrust".to_string()));
        coordinator.seed(ConsentResult::Pending {
            engine_lifecycle: "started".to_string(),
        });
        assert_eq!(coordinator.snapshot().handled(), Some(true));

        let fresh = ConsentCoordinator::new();
        fresh.seed(ConsentResult::Pending {
            engine_lifecycle: "started".to_string(),
        });
        assert_eq!(
            fresh.snapshot(),
            ConsentResult::Pending {
                engine_lifecycle: "started".to_string()
            }
        );
    }

    #[test]
    fn sealed_coordinator_ignores_callbacks() {
        let coordinator = ConsentCoordinator::new();
        coordinator.on_lifecycle_update("waitingForPopup");
        let sealed = coordinator.seal();
        coordinator.on_consent_done(Some("Cookiebot".to_string()));
        assert_eq!(coordinator.snapshot(), sealed);
    }

    #[test]
    fn wire_shapes_match_each_outcome() {
        assert_eq!(
            serde_json::to_value(ConsentResult::not_started()).unwrap(),
            json!({"handled": null, "engineLifecycle": "not-started"})
        );
        assert_eq!(
            serde_json::to_value(ConsentResult::Handled {
                cmp: Some("Cookiebot".to_string())
            })
            .unwrap(),
            json!({"handled": true, "cmp": "Cookiebot"})
        );
        assert_eq!(
            serde_json::to_value(ConsentResult::Handled { cmp: None }).unwrap(),
            json!({"handled": true})
        );
        assert_eq!(
            serde_json::to_value(ConsentResult::Failed {
                error: "boom".to_string()
            })
            .unwrap(),
            json!({"handled": false, "error": "boom"})
        );
    }
}

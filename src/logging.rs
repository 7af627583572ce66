// src/logging.rs
// Debug-gated [VERIFICATION] log lines.

use std::fmt::Display;

use serde::Serialize;

const TAG: &str = "[VERIFICATION]";

#[derive(Debug, Clone, Copy)]
pub(crate) struct VerificationLog {
    debug: bool,
}

impl VerificationLog {
    pub(crate) fn new(debug: bool) -> Self {
        Self { debug }
    }

    pub(crate) fn line(&self, message: impl Display) {
        if self.debug {
            tracing::info!(target: "qusto_verifier", "{}", format_line(message));
        }
    }

    /// Logs `value` as JSON under `label`.
    pub(crate) fn record<T: Serialize>(&self, label: &str, value: &T) {
        if !self.debug {
            return;
        }
        match serde_json::to_string(value) {
            Ok(json) => self.line(format_args!("{label}: {json}")),
            Err(err) => tracing::warn!(target: "qusto_verifier", "could not serialize {label}: {err}"),
        }
    }
}

fn format_line(message: impl Display) -> String {
    format!("{TAG} {message}")
}

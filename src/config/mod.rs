// src/config/mod.rs
// Verification options for the installation probe.
// Defaults are defined in config/defaults.env; process env vars of the same name override them.

use std::{collections::BTreeMap, collections::HashMap, env, time::Duration};

use once_cell::sync::Lazy;
use serde::Deserialize;
use thiserror::Error;

const DEFAULTS_ENV_TEXT: &str = include_str!("../../config/defaults.env");

pub const TIMEOUT_MS_KEY: &str = "QUSTO_VERIFY_TIMEOUT_MS";
pub const DEBUG_KEY: &str = "QUSTO_VERIFY_DEBUG";
pub const POLL_INTERVAL_MS_KEY: &str = "QUSTO_VERIFY_POLL_INTERVAL_MS";
pub const TRACKER_SCRIPT_SELECTOR_KEY: &str = "QUSTO_VERIFY_TRACKER_SCRIPT_SELECTOR";
pub const CSP_HOST_KEY: &str = "QUSTO_VERIFY_CSP_HOST";

/// Selector for the tracker `<script>` tag when the caller does not provide one.
pub const DEFAULT_TRACKER_SCRIPT_SELECTOR: &str = r#"script[src^="https://analytics.qusto.io/js"]"#;

const POLL_INTERVAL_MS_MIN: u64 = 1;
const POLL_INTERVAL_MS_MAX: u64 = 1_000;

/// Response headers of the page under test, as captured by the harness.
pub type HeaderMap = BTreeMap<String, String>;

/// Case-insensitive header lookup.
pub fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid defaults line {line}: {reason}")]
    InvalidDefaultsLine { line: usize, reason: String },
    #[error("missing required defaults key {0}")]
    MissingDefault(&'static str),
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
    #[error("invalid verifier arguments: {0}")]
    InvalidArgs(String),
}

/// Immutable input of one verification run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationOptions {
    pub timeout: Duration,
    pub response_headers: HeaderMap,
    pub debug: bool,
    pub csp_host_to_check: String,
    pub tracker_script_selector: String,
    pub poll_interval: Duration,
}

impl Default for VerificationOptions {
    fn default() -> Self {
        defaults().clone()
    }
}

impl VerificationOptions {
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout = Duration::from_millis(timeout_ms);
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_response_headers(mut self, headers: HeaderMap) -> Self {
        self.response_headers = headers;
        self
    }

    pub fn with_csp_host(mut self, host: impl Into<String>) -> Self {
        self.csp_host_to_check = host.into();
        self
    }

    pub fn with_tracker_script_selector(mut self, selector: impl Into<String>) -> Self {
        self.tracker_script_selector = selector.into();
        self
    }

    /// Defaults overlaid with any `QUSTO_VERIFY_*` process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut options = defaults().clone();
        apply_overrides(&mut options, |key| env::var(key).ok())?;
        Ok(options)
    }

    /// Merges harness-provided arguments over these options.
    pub fn merged_with(mut self, args: VerifierArgs) -> Self {
        if let Some(timeout_ms) = args.timeout_ms {
            self.timeout = Duration::from_millis(timeout_ms);
        }
        if let Some(headers) = args.response_headers {
            self.response_headers = headers;
        }
        if let Some(debug) = args.debug {
            self.debug = debug;
        }
        if let Some(host) = args.csp_host_to_check {
            self.csp_host_to_check = host;
        }
        if let Some(selector) = args.tracker_script_selector {
            self.tracker_script_selector = selector;
        }
        self
    }
}

/// Argument object passed by an external verification harness.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VerifierArgs {
    pub timeout_ms: Option<u64>,
    pub response_headers: Option<HeaderMap>,
    pub debug: Option<bool>,
    pub csp_host_to_check: Option<String>,
    pub tracker_script_selector: Option<String>,
}

impl VerifierArgs {
    pub fn from_json(input: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(input).map_err(|err| ConfigError::InvalidArgs(err.to_string()))
    }
}

static DEFAULTS_MAP: Lazy<Result<HashMap<String, String>, ConfigError>> =
    Lazy::new(|| parse_defaults_env_map(DEFAULTS_ENV_TEXT));

static DEFAULT_OPTIONS: Lazy<VerificationOptions> = Lazy::new(|| {
    let parsed = (*DEFAULTS_MAP).as_ref().map_err(|err| err.clone());
    match parsed.and_then(options_from_defaults) {
        Ok(options) => options,
        Err(err) => panic!("Invalid config/defaults.env: {}", err),
    }
});

const REQUIRED_DEFAULT_KEYS: [&str; 3] = [TIMEOUT_MS_KEY, DEBUG_KEY, POLL_INTERVAL_MS_KEY];

fn options_from_defaults(map: &HashMap<String, String>) -> Result<VerificationOptions, ConfigError> {
    if let Some(key) = REQUIRED_DEFAULT_KEYS
        .into_iter()
        .find(|key| !map.contains_key(*key))
    {
        return Err(ConfigError::MissingDefault(key));
    }
    let mut options = VerificationOptions {
        timeout: Duration::ZERO,
        response_headers: HeaderMap::new(),
        debug: false,
        csp_host_to_check: String::new(),
        tracker_script_selector: DEFAULT_TRACKER_SCRIPT_SELECTOR.to_string(),
        poll_interval: Duration::from_millis(10),
    };
    apply_overrides(&mut options, |key| map.get(key).cloned())?;
    Ok(options)
}

pub fn defaults() -> &'static VerificationOptions {
    &DEFAULT_OPTIONS
}

fn apply_overrides<F>(options: &mut VerificationOptions, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(TIMEOUT_MS_KEY) {
        options.timeout = Duration::from_millis(parse_u64(TIMEOUT_MS_KEY, &raw)?);
    }
    if let Some(raw) = lookup(DEBUG_KEY) {
        options.debug = parse_bool_like(&raw).ok_or(ConfigError::InvalidValue {
            key: DEBUG_KEY,
            value: raw.clone(),
        })?;
    }
    if let Some(raw) = lookup(POLL_INTERVAL_MS_KEY) {
        let interval_ms = parse_u64(POLL_INTERVAL_MS_KEY, &raw)?;
        options.poll_interval =
            Duration::from_millis(interval_ms.clamp(POLL_INTERVAL_MS_MIN, POLL_INTERVAL_MS_MAX));
    }
    if let Some(raw) = lookup(TRACKER_SCRIPT_SELECTOR_KEY) {
        let selector = raw.trim();
        if !selector.is_empty() {
            options.tracker_script_selector = selector.to_string();
        }
    }
    if let Some(raw) = lookup(CSP_HOST_KEY) {
        options.csp_host_to_check = raw.trim().to_string();
    }
    Ok(())
}

fn parse_u64(key: &'static str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim()
        .parse::<u64>()
        .map_err(|_| ConfigError::InvalidValue {
            key,
            value: raw.to_string(),
        })
}

pub(crate) fn parse_bool_like(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub(crate) fn parse_defaults_env_map(input: &str) -> Result<HashMap<String, String>, ConfigError> {
    let mut map = HashMap::new();
    for (index, raw_line) in input.lines().enumerate() {
        let line_no = index + 1;
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (key, raw_value) = line
            .split_once('=')
            .ok_or_else(|| ConfigError::InvalidDefaultsLine {
                line: line_no,
                reason: "missing '='".to_string(),
            })?;

        let key = key.trim();
        if key.is_empty() {
            return Err(ConfigError::InvalidDefaultsLine {
                line: line_no,
                reason: "empty key".to_string(),
            });
        }
        if !key
            .chars()
            .all(|ch| ch.is_ascii_uppercase() || ch.is_ascii_digit() || ch == '_')
        {
            return Err(ConfigError::InvalidDefaultsLine {
                line: line_no,
                reason: format!("invalid key '{}'", key),
            });
        }

        let mut value = raw_value.trim().to_string();
        if let Some((head, _)) = value.split_once(" #") {
            value = head.trim().to_string();
        }
        if value.len() >= 2 {
            let first = value.as_bytes()[0] as char;
            let last = value.as_bytes()[value.len() - 1] as char;
            if (first == '"' && last == '"') || (first == '\'' && last == '\'') {
                value = value[1..value.len() - 1].to_string();
            }
        }

        map.insert(key.to_string(), value);
    }
    Ok(map)
}

// src/csp.rs
// Decides whether a page's Content-Security-Policy would keep the tracker from loading or reporting.

use crate::config::{header_value, HeaderMap};

const CSP_HEADER: &str = "content-security-policy";

/// True when the CSP header blocks `host_to_check` for script loading
/// (`script-src`, else `default-src`) or for event delivery (`connect-src`,
/// else `default-src`). No header or an empty host is never disallowed.
pub fn check_disallowed_by_csp(response_headers: &HeaderMap, host_to_check: &str) -> bool {
    let host = host_to_check.trim();
    if host.is_empty() {
        return false;
    }
    let Some(policy) = header_value(response_headers, CSP_HEADER) else {
        return false;
    };

    let directives = parse_directives(policy);
    let lookup = |name: &str| {
        directives
            .iter()
            .find(|(directive, _)| directive == name)
            .map(|(_, sources)| sources.as_slice())
    };
    let default_src = lookup("default-src");
    let script_src = lookup("script-src").or(default_src);
    let connect_src = lookup("connect-src").or(default_src);

    let blocked = [script_src, connect_src]
        .into_iter()
        .flatten()
        .any(|sources| !sources.iter().any(|source| source_admits(source, host)));
    blocked
}

// First occurrence of a directive wins, as browsers ignore repeats.
fn parse_directives(policy: &str) -> Vec<(String, Vec<String>)> {
    let mut directives: Vec<(String, Vec<String>)> = Vec::new();
    for raw in policy.split(';') {
        let mut tokens = raw.split_whitespace();
        let Some(name) = tokens.next() else {
            continue;
        };
        let name = name.to_ascii_lowercase();
        if directives.iter().any(|(existing, _)| *existing == name) {
            continue;
        }
        directives.push((name, tokens.map(str::to_string).collect()));
    }
    directives
}

fn source_admits(source: &str, host: &str) -> bool {
    let source = source.to_ascii_lowercase();
    let host = host.to_ascii_lowercase();
    if source == "*" {
        return true;
    }
    let source_host = strip_scheme_and_path(&source);
    if let Some(suffix) = source_host.strip_prefix("*.") {
        return host.ends_with(&format!(".{suffix}"));
    }
    source_host == host || source.contains(&host)
}

fn strip_scheme_and_path(source: &str) -> &str {
    let without_scheme = source
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(source);
    let without_path = without_scheme.split('/').next().unwrap_or(without_scheme);
    without_path.split(':').next().unwrap_or(without_path)
}

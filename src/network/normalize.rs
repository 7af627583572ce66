// src/network/normalize.rs
// Reduces both tracker wire shapes (compact `n`/`d`/`v` and verbose `name`/`domain`/`version`)
// to one event body.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::FetchRequest;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedEventBody {
    pub name: String,
    pub domain: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<Value>,
}

/// Returns the event body if `request` is a tracked event: a POST whose JSON
/// body carries a string name and a string domain in either key convention.
/// Anything else, including an unparseable body, is `None`.
pub fn normalize_event_body(request: &FetchRequest) -> Option<NormalizedEventBody> {
    let raw = request.body.as_deref().unwrap_or("{}");
    let body: Value = serde_json::from_str(raw).ok()?;

    if request.method.as_deref() != Some("POST") {
        return None;
    }
    if !has_string(&body, "n", "name") || !has_string(&body, "d", "domain") {
        return None;
    }

    let name = first_truthy(&body, "n", "name")?.as_str()?.to_string();
    let domain = first_truthy(&body, "d", "domain")?.as_str()?.to_string();
    let version = first_truthy(&body, "v", "version").cloned();

    Some(NormalizedEventBody {
        name,
        domain,
        version,
    })
}

fn has_string(body: &Value, compact: &str, verbose: &str) -> bool {
    body.get(compact).is_some_and(Value::is_string) || body.get(verbose).is_some_and(Value::is_string)
}

// The compact key wins unless its value is empty, zero, false or null.
fn first_truthy<'a>(body: &'a Value, compact: &str, verbose: &str) -> Option<&'a Value> {
    [compact, verbose]
        .into_iter()
        .filter_map(|key| body.get(key))
        .find(|value| is_truthy(value))
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

//! Variable substitution: `{{name}}` token replacement in plain strings, and
//! marker-based splicing of non-string values into request bodies.
//!
//! The marker mechanism is the central non-obvious trick this crate
//! implements: a request body must be syntactically valid JSON at edit
//! time (so the codec can pretty-print and re-parse it), but an author
//! still needs to inject a number, bool, or object in place of a string
//! literal. `##VAR:string:NAME##` and `##VAR:unquoted:NAME##` sentinel
//! strings stand in for `{{NAME}}` through that JSON round trip; unquoted
//! markers are further rewritten into placeholder tokens so the body can be
//! validated as JSON one more time before the raw value is spliced in at
//! the string level, just before transport.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::path;

static TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{\{([^{}]+)\}\}").expect("valid token regex"));
static MARKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^##VAR:(string|unquoted):([A-Za-z_][A-Za-z0-9_]*)##$").expect("valid marker regex"));

/// Replaces every `{{name}}` in `input` with the string form of
/// `evaluate(context, name)`. Tokens that don't resolve are left literal.
/// Non-string resolved values are JSON-stringified.
pub fn substitute_string(context: &Value, input: &str) -> String {
    TOKEN_RE
        .replace_all(input, |caps: &regex::Captures| {
            let name = caps[1].trim();
            match path::evaluate(context, name) {
                Some(Value::String(s)) => s,
                Some(other) => other.to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Applies `substitute_string` to every value of a header map.
pub fn substitute_headers(
    context: &Value,
    headers: &HashMap<String, String>,
) -> HashMap<String, String> {
    headers
        .iter()
        .map(|(k, v)| (k.clone(), substitute_string(context, v)))
        .collect()
}

/// The result of splicing a request body through the marker mechanism:
/// the JSON-valid processed body plus the map of placeholder tokens to
/// their raw (possibly non-string) replacement values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubstitutedBody {
    pub processed: Value,
    pub unquoted_placeholders: HashMap<String, Value>,
}

fn unquoted_placeholder_token(ts: u128, n: u64) -> String {
    format!("__FLOWRUNNER_UNQUOTED_{ts}_{n}")
}

/// Deep-copies and walks `raw_body_with_markers`, replacing every string
/// that exactly matches a `##VAR:(string|unquoted):NAME##` marker.
pub fn substitute_body(context: &Value, raw_body_with_markers: &Value) -> SubstitutedBody {
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let mut counter = 0u64;
    let mut placeholders = HashMap::new();

    let processed = walk(context, raw_body_with_markers, ts, &mut counter, &mut placeholders);

    SubstitutedBody {
        processed,
        unquoted_placeholders: placeholders,
    }
}

fn walk(
    context: &Value,
    node: &Value,
    ts: u128,
    counter: &mut u64,
    placeholders: &mut HashMap<String, Value>,
) -> Value {
    match node {
        Value::String(s) => {
            if let Some(caps) = MARKER_RE.captures(s) {
                let variant = &caps[1];
                let name = &caps[2];
                let resolved = path::evaluate(context, name);
                return match variant {
                    "string" => resolved.unwrap_or(Value::Null),
                    "unquoted" => {
                        let token = unquoted_placeholder_token(ts, *counter);
                        *counter += 1;
                        placeholders.insert(token.clone(), resolved.unwrap_or(Value::Null));
                        Value::String(token)
                    }
                    _ => unreachable!("regex only matches string|unquoted"),
                };
            }
            Value::String(s.clone())
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| walk(context, v, ts, counter, placeholders))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), walk(context, v, ts, counter, placeholders)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Splices `unquoted_placeholders` into a stringified JSON body: each
/// `"placeholder"` occurrence (including its surrounding quotes) is
/// replaced by the raw value's string form.
pub fn splice_unquoted_placeholders(
    stringified_body: &str,
    placeholders: &HashMap<String, Value>,
) -> String {
    let mut result = stringified_body.to_string();
    for (token, value) in placeholders {
        let quoted = format!("\"{token}\"");
        let replacement = match value {
            Value::String(s) => s.clone(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            other => other.to_string(),
        };
        result = result.replace(&quoted, &replacement);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unresolved_token_left_literal() {
        let ctx = json!({});
        assert_eq!(substitute_string(&ctx, "hello {{name}}"), "hello {{name}}");
    }

    #[test]
    fn string_token_replaced() {
        let ctx = json!({"name": "Ada"});
        assert_eq!(substitute_string(&ctx, "hello {{name}}"), "hello Ada");
    }

    #[test]
    fn non_string_token_is_json_stringified() {
        let ctx = json!({"count": 3});
        assert_eq!(substitute_string(&ctx, "n={{count}}"), "n=3");
    }

    #[test]
    fn string_marker_replaced_in_place_any_type() {
        let ctx = json!({"count": 3});
        let raw = json!({"n": "##VAR:string:count##"});
        let result = substitute_body(&ctx, &raw);
        assert_eq!(result.processed, json!({"n": 3}));
        assert!(result.unquoted_placeholders.is_empty());
    }

    #[test]
    fn unquoted_marker_becomes_placeholder_with_raw_value_recorded() {
        let ctx = json!({"count": 3});
        let raw = json!({"n": "##VAR:unquoted:count##"});
        let result = substitute_body(&ctx, &raw);
        let Value::Object(map) = &result.processed else { panic!("expected object") };
        let Value::String(token) = &map["n"] else { panic!("expected placeholder string") };
        assert!(token.starts_with("__FLOWRUNNER_UNQUOTED_"));
        assert_eq!(result.unquoted_placeholders.get(token), Some(&json!(3)));
    }

    #[test]
    fn unresolved_variable_inside_marker_becomes_null() {
        let ctx = json!({});
        let raw = json!({"n": "##VAR:string:missing##"});
        let result = substitute_body(&ctx, &raw);
        assert_eq!(result.processed, json!({"n": Value::Null}));
    }

    #[test]
    fn splice_produces_unquoted_numeric_literal() {
        let ctx = json!({"count": 3});
        let raw = json!({"n": "##VAR:unquoted:count##"});
        let result = substitute_body(&ctx, &raw);
        let stringified = serde_json::to_string(&result.processed).unwrap();
        let spliced = splice_unquoted_placeholders(&stringified, &result.unquoted_placeholders);
        assert_eq!(spliced, r#"{"n":3}"#);
        let reparsed: Value = serde_json::from_str(&spliced).unwrap();
        assert_eq!(reparsed, json!({"n": 3}));
    }

    #[test]
    fn non_marker_strings_pass_through_unchanged() {
        let ctx = json!({});
        let raw = json!({"a": "plain string", "b": ["x", "##VAR:string:missing## trailing"]});
        let result = substitute_body(&ctx, &raw);
        assert_eq!(result.processed, raw);
    }
}

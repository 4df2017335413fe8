//! Structured condition evaluation: `{variable, operator, value}` against a
//! runtime context, with the numeric/string coercion rules a dynamically
//! typed source flow would apply.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::errors::FlowError;
use crate::path;

static REGEX_LITERAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^/(.*)/([a-zA-Z]*)$").expect("valid literal-regex matcher"));

fn to_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn to_coerced_string(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn is_empty_value(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(Value::Array(a)) => a.is_empty(),
        _ => false,
    }
}

fn compile_pattern(pattern: &str) -> Option<Regex> {
    if let Some(caps) = REGEX_LITERAL_RE.captures(pattern) {
        let body = &caps[1];
        let flags = &caps[2];
        let prefix = if flags.contains('i') { "(?i)" } else { "" };
        Regex::new(&format!("{prefix}{body}")).ok()
    } else {
        Regex::new(pattern).ok()
    }
}

/// Evaluates a structured condition. `variable_path` is resolved against
/// `context` with the path evaluator; `value` is the literal comparand.
/// Returns `Err(FlowError::Condition)` only for an unrecognized operator —
/// every other outcome is a plain boolean per the coercion rules below.
pub fn evaluate(
    context: &Value,
    variable_path: &str,
    operator: &str,
    value: &Value,
) -> Result<bool, FlowError> {
    let left = path::evaluate(context, variable_path);

    let result = match operator {
        "equals" => values_equal(left.as_ref(), value),
        "not_equals" => !values_equal(left.as_ref(), value),

        "greater_than" => numeric_cmp(left.as_ref(), value, |a, b| a > b),
        "less_than" => numeric_cmp(left.as_ref(), value, |a, b| a < b),
        "greater_equals" => numeric_cmp(left.as_ref(), value, |a, b| a >= b),
        "less_equals" => numeric_cmp(left.as_ref(), value, |a, b| a <= b),

        "contains" => to_coerced_string(left.as_ref()).contains(&to_coerced_string(Some(value))),
        "not_contains" => {
            !to_coerced_string(left.as_ref()).contains(&to_coerced_string(Some(value)))
        }
        "starts_with" => {
            to_coerced_string(left.as_ref()).starts_with(&to_coerced_string(Some(value)))
        }
        "ends_with" => to_coerced_string(left.as_ref()).ends_with(&to_coerced_string(Some(value))),

        "matches_regex" | "not_matches_regex" => {
            let pattern = to_coerced_string(Some(value));
            let haystack = to_coerced_string(left.as_ref());
            let matched = compile_pattern(&pattern).map(|re| re.is_match(&haystack));
            match (operator, matched) {
                ("matches_regex", Some(m)) => m,
                ("matches_regex", None) => false,
                ("not_matches_regex", Some(m)) => !m,
                (_, None) => true,
                _ => unreachable!(),
            }
        }

        "exists" => left.is_some(),
        "not_exists" => left.is_none(),
        "is_null" => matches!(left, Some(Value::Null)),
        "is_not_null" => !matches!(left, Some(Value::Null)),
        "is_empty" => is_empty_value(left.as_ref()),
        "is_not_empty" => !is_empty_value(left.as_ref()),
        "is_number" => matches!(&left, Some(Value::Number(n)) if n.as_f64().is_some()),
        "is_text" => matches!(left, Some(Value::String(_))),
        "is_boolean" => matches!(left, Some(Value::Bool(_))),
        "is_array" => matches!(left, Some(Value::Array(_))),
        "is_object" => matches!(left, Some(Value::Object(_))),
        "is_true" => matches!(left, Some(Value::Bool(true))),
        "is_false" => matches!(left, Some(Value::Bool(false))),

        other => return Err(FlowError::Condition(format!("unknown operator '{other}'"))),
    };

    Ok(result)
}

fn values_equal(left: Option<&Value>, right: &Value) -> bool {
    if let Some(l) = left {
        if l == right {
            return true;
        }
        if !l.is_object() && !l.is_null() && !right.is_object() && !right.is_null() {
            if let (Some(a), Some(b)) = (to_number(l), to_number(right)) {
                return a == b;
            }
        }
    }
    false
}

fn numeric_cmp(left: Option<&Value>, right: &Value, cmp: impl Fn(f64, f64) -> bool) -> bool {
    match (left.and_then(to_number), to_number(right)) {
        (Some(a), Some(b)) => cmp(a, b),
        _ => false,
    }
}

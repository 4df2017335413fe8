//! Applies a Request step's `extract: {varName: path}` map against a
//! response output, writing resolved values into the runtime context and
//! recording per-variable failures without ever failing the step itself.

use std::collections::HashMap;

use serde_json::Value;

use crate::context::RuntimeContext;
use crate::errors::ExtractionFailure;
use crate::path;

/// Outcome of running every extraction declared on a step.
#[derive(Debug, Clone, Default)]
pub struct ExtractionOutcome {
    pub extracted_values: HashMap<String, Value>,
    pub failures: Vec<ExtractionFailure>,
    /// True if any extracted value differs from what the context already
    /// held — the interpreter uses this to decide whether to fire
    /// `onContextUpdate`.
    pub changed: bool,
}

/// Resolves a single extraction path against a response `output`
/// (`{status, headers, body}`). Recognizes the response-shape keywords
/// before falling back to body-relative, then whole-response, evaluation.
fn resolve(output: &Value, path: &str) -> Option<Value> {
    let trimmed = path.trim();

    if trimmed == ".status" || trimmed.eq_ignore_ascii_case("$status") {
        return output.get("status").cloned();
    }
    if trimmed.eq_ignore_ascii_case("$headers") {
        return output.get("headers").cloned();
    }
    if trimmed.eq_ignore_ascii_case("$body") {
        return output.get("body").cloned();
    }
    if let Some(name) = strip_prefix_ci(trimmed, "$header.") {
        return output.get("headers")?.as_object()?.iter().find_map(|(k, v)| {
            k.eq_ignore_ascii_case(name).then(|| v.clone())
        });
    }

    let body = output.get("body").cloned().unwrap_or(Value::Null);
    if let Some(value) = path::evaluate(&body, trimmed) {
        return Some(value);
    }

    // Open question (a): a `response.`-prefixed path is retried against the
    // whole response only when the body-relative lookup came up empty.
    if let Some(rest) = trimmed.strip_prefix("response.") {
        return path::evaluate(output, rest);
    }

    None
}

fn strip_prefix_ci<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    if s.len() >= prefix.len() && s[..prefix.len()].eq_ignore_ascii_case(prefix) {
        Some(&s[prefix.len()..])
    } else {
        None
    }
}

/// Runs every `{varName: path}` pair in `extract` against `output`,
/// mutating `context` in place. Failed extractions unset the context
/// variable (modeling "undefined") and are recorded, never aborting the
/// step.
pub fn apply_extractions(
    context: &mut RuntimeContext,
    extract: &HashMap<String, String>,
    output: &Value,
) -> ExtractionOutcome {
    let mut outcome = ExtractionOutcome::default();

    for (var_name, path) in extract {
        match resolve(output, path) {
            Some(value) => {
                let changed = context.get(var_name) != Some(&value);
                outcome.changed |= changed;
                context.set(var_name.clone(), value.clone());
                outcome.extracted_values.insert(var_name.clone(), value);
            }
            None => {
                context.unset(var_name);
                outcome.failures.push(ExtractionFailure {
                    var_name: var_name.clone(),
                    path: path.clone(),
                    reason: format!("path '{path}' did not resolve against the response"),
                });
            }
        }
    }

    outcome
}

//! Flow validation: collects every problem found rather than stopping at
//! the first one. Gates save; never mutates the model.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::codec;
use crate::model::{ConditionData, Flow, Step, ValidationIssue};

static TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{([A-Za-z_][A-Za-z0-9_]*)\}\}").expect("valid token regex"));
static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

const KNOWN_OPERATORS: &[&str] = &[
    "equals",
    "not_equals",
    "greater_than",
    "less_than",
    "greater_equals",
    "less_equals",
    "contains",
    "not_contains",
    "starts_with",
    "ends_with",
    "matches_regex",
    "not_matches_regex",
    "exists",
    "not_exists",
    "is_null",
    "is_not_null",
    "is_empty",
    "is_not_empty",
    "is_number",
    "is_text",
    "is_boolean",
    "is_array",
    "is_object",
    "is_true",
    "is_false",
];

const VALUELESS_OPERATORS: &[&str] = &[
    "exists",
    "not_exists",
    "is_null",
    "is_not_null",
    "is_empty",
    "is_not_empty",
    "is_number",
    "is_text",
    "is_boolean",
    "is_array",
    "is_object",
    "is_true",
    "is_false",
];

/// Runs every check described in §4.4 and returns the collected issues.
/// An empty result means the flow is valid.
pub fn validate_flow(flow: &Flow) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    if flow.name.trim().is_empty() {
        issues.push(ValidationIssue::new("flow name must not be empty"));
    }

    let base_scope: HashSet<String> = flow.static_vars.keys().cloned().collect();
    validate_steps(&flow.steps, base_scope, &mut issues);

    issues
}

fn check_tokens(text: &str, scope: &HashSet<String>, step_id: &str, issues: &mut Vec<ValidationIssue>) {
    for caps in TOKEN_RE.captures_iter(text) {
        let name = &caps[1];
        if !scope.contains(name) {
            issues.push(
                ValidationIssue::new(format!(
                    "variable '{{{{{name}}}}}' is not reachable from static vars, ancestor extractions, or enclosing loop variables"
                ))
                .on_step(step_id),
            );
        }
    }
}

fn validate_steps(steps: &[Step], mut scope: HashSet<String>, issues: &mut Vec<ValidationIssue>) {
    for step in steps {
        match step {
            Step::Request {
                id,
                name,
                url,
                headers,
                body,
                extract,
                ..
            } => {
                if name.trim().is_empty() {
                    issues.push(ValidationIssue::new("step name must not be empty").on_step(id));
                }
                if url.trim().is_empty() {
                    issues.push(ValidationIssue::new("request URL must not be empty").on_step(id));
                }

                check_tokens(url, &scope, id, issues);
                for header_value in headers.values() {
                    check_tokens(header_value, &scope, id, issues);
                }
                check_tokens(body, &scope, id, issues);

                if !body.trim().is_empty() {
                    if let Err(e) = codec::encode_body(body) {
                        issues.push(
                            ValidationIssue::new(format!("request body is not valid JSON: {e}"))
                                .on_step(id),
                        );
                    }
                }

                for (var_name, path) in extract {
                    if !IDENTIFIER_RE.is_match(var_name) {
                        issues.push(
                            ValidationIssue::new(format!(
                                "extraction variable name '{var_name}' is not a valid identifier"
                            ))
                            .on_step(id),
                        );
                    }
                    if path.trim().is_empty() {
                        issues.push(
                            ValidationIssue::new(format!(
                                "extraction path for '{var_name}' must not be empty"
                            ))
                            .on_step(id),
                        );
                    }
                }

                for var_name in extract.keys() {
                    scope.insert(var_name.clone());
                }
            }
            Step::Condition {
                id,
                name,
                condition_data,
                then_steps,
                else_steps,
                ..
            } => {
                if name.trim().is_empty() {
                    issues.push(ValidationIssue::new("step name must not be empty").on_step(id));
                }
                validate_condition_data(condition_data, id, issues);
                check_tokens(&condition_data.variable, &scope, id, issues);
                if let serde_json::Value::String(s) = &condition_data.value {
                    check_tokens(s, &scope, id, issues);
                }

                validate_steps(then_steps, scope.clone(), issues);
                validate_steps(else_steps, scope.clone(), issues);
            }
            Step::Loop {
                id,
                name,
                source,
                loop_variable,
                loop_steps,
            } => {
                if name.trim().is_empty() {
                    issues.push(ValidationIssue::new("step name must not be empty").on_step(id));
                }
                if !IDENTIFIER_RE.is_match(loop_variable) {
                    issues.push(
                        ValidationIssue::new(format!(
                            "loop variable '{loop_variable}' is not a valid identifier"
                        ))
                        .on_step(id),
                    );
                }

                let stripped = source.trim().trim_start_matches("{{").trim_end_matches("}}");
                if stripped.is_empty() {
                    issues.push(ValidationIssue::new("loop source must not be empty").on_step(id));
                } else if !scope.contains(stripped) {
                    check_tokens(source, &scope, id, issues);
                    if !source.contains("{{") {
                        issues.push(
                            ValidationIssue::new(format!(
                                "loop source '{stripped}' is not reachable from static vars, ancestor extractions, or enclosing loop variables"
                            ))
                            .on_step(id),
                        );
                    }
                }

                let mut loop_scope = scope.clone();
                loop_scope.insert(loop_variable.clone());
                validate_steps(loop_steps, loop_scope, issues);
            }
        }
    }
}

fn validate_condition_data(condition: &ConditionData, step_id: &str, issues: &mut Vec<ValidationIssue>) {
    if !KNOWN_OPERATORS.contains(&condition.operator.as_str()) {
        issues.push(
            ValidationIssue::new(format!("unknown condition operator '{}'", condition.operator))
                .on_step(step_id),
        );
        return;
    }
    let needs_value = !VALUELESS_OPERATORS.contains(&condition.operator.as_str());
    if needs_value && condition.value.is_null() {
        issues.push(
            ValidationIssue::new(format!(
                "condition operator '{}' requires a value",
                condition.operator
            ))
            .on_step(step_id),
        );
    }
}

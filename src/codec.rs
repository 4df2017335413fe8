//! Bidirectional JSON serialization of the flow model, including the
//! marker/placeholder rewriting that keeps a request body valid JSON on
//! disk while letting the UI show plain `{{name}}` placeholders — some
//! quoted, some bare — in the editor.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;

use crate::errors::FlowError;
use crate::model::{ConditionData, Flow, Step};

static TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{([A-Za-z_][A-Za-z0-9_]*)\}\}").expect("valid token regex"));
static QUOTED_MARKER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""##VAR:(string|unquoted):([A-Za-z_][A-Za-z0-9_]*)##""#).expect("valid marker regex")
});

/// Converts the UI-facing body text (a "relaxed JSON" dialect that permits
/// bare `{{name}}` placeholders as values) into the on-disk marker form.
///
/// Each `{{name}}` token is classified by its immediate neighbors: a token
/// already sitting inside an existing pair of quotes (`"{{name}}"`) is a
/// *quoted position* and becomes `##VAR:string:NAME##` in place; a bare
/// token sitting where a JSON value is expected (after `:`, `[`, `{`, `,`,
/// or whitespace, before `,`, `}`, `]`) is an *unquoted position* and
/// becomes the quoted marker `"##VAR:unquoted:NAME##"` so the surrounding
/// text stays parseable as strict JSON.
pub fn encode_body(ui_text: &str) -> Result<Value, FlowError> {
    if ui_text.trim().is_empty() {
        return Ok(Value::Null);
    }

    let mut result = String::with_capacity(ui_text.len());
    let mut last = 0;
    for caps in TOKEN_RE.captures_iter(ui_text) {
        let m = caps.get(0).expect("capture group 0 always present");
        let name = &caps[1];
        result.push_str(&ui_text[last..m.start()]);

        let prev_char = ui_text[..m.start()].trim_end().chars().last();
        let next_char = ui_text[m.end()..].trim_start().chars().next();
        let quoted = prev_char == Some('"') && next_char == Some('"');

        if quoted {
            result.push_str(&format!("##VAR:string:{name}##"));
        } else {
            result.push_str(&format!("\"##VAR:unquoted:{name}##\""));
        }
        last = m.end();
    }
    result.push_str(&ui_text[last..]);

    serde_json::from_str(&result)
        .map_err(|e| FlowError::Substitution(format!("request body is not valid JSON: {e}")))
}

/// The inverse of `encode_body`: restores `{{name}}` placeholders — quoted
/// for the `string` variant, bare for the `unquoted` variant — from the
/// on-disk marker form, pretty-printed for editing.
pub fn decode_body(raw_body_with_markers: &Value) -> Result<String, FlowError> {
    if raw_body_with_markers.is_null() {
        return Ok(String::new());
    }
    let pretty = serde_json::to_string_pretty(raw_body_with_markers)
        .map_err(|e| FlowError::Model(format!("failed to pretty-print body: {e}")))?;

    let decoded = QUOTED_MARKER_RE.replace_all(&pretty, |caps: &Captures| {
        let variant = &caps[1];
        let name = &caps[2];
        if variant == "string" {
            format!("\"{{{{{name}}}}}\"")
        } else {
            format!("{{{{{name}}}}}")
        }
    });
    Ok(decoded.into_owned())
}

/// Best-effort parser for the legacy condition *string* format, used only
/// when a flow file carries `condition` but no structured `conditionData`.
/// This crate never writes the legacy form itself; it only needs to
/// tolerate hand-edited or foreign flow files. Anything it cannot parse is
/// preserved verbatim in `preview` rather than guessed at.
pub fn parse_legacy_condition(raw: &str) -> ConditionData {
    const PATTERNS: &[(&str, &str)] = &[
        (" == ", "equals"),
        (" != ", "not_equals"),
        (" contains ", "contains"),
    ];

    for (separator, operator) in PATTERNS {
        if let Some(idx) = raw.find(separator) {
            let variable = raw[..idx].trim().to_string();
            let value = raw[idx + separator.len()..]
                .trim()
                .trim_matches('"')
                .to_string();
            return ConditionData {
                variable,
                operator: operator.to_string(),
                value: Value::String(value),
                preview: None,
            };
        }
    }

    ConditionData {
        variable: String::new(),
        operator: String::new(),
        value: Value::Null,
        preview: Some(raw.to_string()),
    }
}

fn decode_steps(steps: &mut [Step]) -> Result<(), FlowError> {
    for step in steps {
        match step {
            Step::Request {
                body,
                raw_body_with_markers,
                ..
            } => {
                *body = decode_body(raw_body_with_markers)?;
            }
            Step::Condition {
                condition,
                condition_data,
                then_steps,
                else_steps,
                ..
            } => {
                if condition_data.variable.is_empty() {
                    if let Some(legacy) = condition {
                        *condition_data = parse_legacy_condition(legacy);
                    }
                }
                decode_steps(then_steps)?;
                decode_steps(else_steps)?;
            }
            Step::Loop { loop_steps, .. } => decode_steps(loop_steps)?,
        }
    }
    Ok(())
}

fn encode_steps(steps: &mut [Step]) -> Result<(), FlowError> {
    for step in steps {
        match step {
            Step::Request {
                body,
                raw_body_with_markers,
                ..
            } => {
                *raw_body_with_markers = encode_body(body)?;
            }
            Step::Condition {
                condition,
                condition_data,
                then_steps,
                else_steps,
                ..
            } => {
                if condition.is_none() && !condition_data.variable.is_empty() {
                    *condition = Some(format!(
                        "{} {} {}",
                        condition_data.variable, condition_data.operator, condition_data.value
                    ));
                }
                encode_steps(then_steps)?;
                encode_steps(else_steps)?;
            }
            Step::Loop { loop_steps, .. } => encode_steps(loop_steps)?,
        }
    }
    Ok(())
}

/// Parses a `*.flow.json` payload into the in-memory model, decoding every
/// Request step's marker body into its UI-facing text along the way.
pub fn decode_flow(value: Value) -> Result<Flow, FlowError> {
    let mut flow: Flow =
        serde_json::from_value(value).map_err(|e| FlowError::Model(e.to_string()))?;
    decode_steps(&mut flow.steps)?;
    Ok(flow)
}

/// Converts the in-memory model back to its on-disk JSON form. Always
/// re-derives each Request step's marker body from its current UI text —
/// the UI string is the source of truth for what gets written, exactly as
/// the original editor treats it.
pub fn encode_flow(flow: &Flow) -> Result<Value, FlowError> {
    let mut flow = flow.clone();
    encode_steps(&mut flow.steps)?;
    serde_json::to_value(&flow).map_err(|e| FlowError::Model(e.to_string()))
}

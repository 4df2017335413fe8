//! The in-memory flow tree: metadata, shared state, and the step hierarchy.
//!
//! Tagged-variant steps (`Step::Request` / `Step::Condition` / `Step::Loop`)
//! replace any dynamic-dispatch inheritance — every operation in this crate
//! switches on step type rather than calling through a trait object.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::RuntimeContext;

/// On-failure policy for a Request step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnFailure {
    Stop,
    Continue,
}

impl Default for OnFailure {
    fn default() -> Self {
        Self::Stop
    }
}

/// `{variable, operator, value}` — the authoritative structured condition.
/// `preview` carries the raw legacy string when the best-effort parser
/// (see `codec::parse_legacy_condition`) could not produce a structured
/// form; it is never written by this crate, only read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConditionData {
    pub variable: String,
    pub operator: String,
    #[serde(default)]
    pub value: Value,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub preview: Option<String>,
}

/// A position in the visual node-graph editor. Opaque to the interpreter;
/// round-tripped by the codec only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// A node in the flow tree: one of Request, Condition, or Loop. `id` is
/// unique within the owning flow; clones receive fresh IDs recursively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Step {
    Request {
        id: String,
        name: String,
        #[serde(default = "default_method")]
        method: String,
        #[serde(default)]
        url: String,
        #[serde(default)]
        headers: HashMap<String, String>,

        /// The on-disk marker form, preserved byte-for-byte across
        /// load/save. Deep-copied before every substitution pass so that a
        /// subsequent save still contains the original markers.
        #[serde(default, rename = "body")]
        raw_body_with_markers: Value,

        /// The UI-facing pretty-printed string with `{{var}}` placeholders
        /// restored. Derived at load time by the codec; never persisted —
        /// `raw_body_with_markers` is the source of truth on disk.
        #[serde(skip, default)]
        body: String,

        #[serde(default)]
        extract: HashMap<String, String>,
        #[serde(default)]
        on_failure: OnFailure,
    },
    Condition {
        id: String,
        name: String,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        condition: Option<String>,
        condition_data: ConditionData,
        #[serde(default)]
        then_steps: Vec<Step>,
        #[serde(default)]
        else_steps: Vec<Step>,
    },
    Loop {
        id: String,
        name: String,
        #[serde(default)]
        source: String,
        #[serde(default = "default_loop_variable")]
        loop_variable: String,
        /// The loop body. On disk this is the `steps` field, not
        /// `loopSteps` — matching the external flow-file shape.
        #[serde(default, rename = "steps")]
        loop_steps: Vec<Step>,
    },
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_loop_variable() -> String {
    "item".to_string()
}

impl Step {
    pub fn id(&self) -> &str {
        match self {
            Step::Request { id, .. } | Step::Condition { id, .. } | Step::Loop { id, .. } => id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Step::Request { name, .. } | Step::Condition { name, .. } | Step::Loop { name, .. } => {
                name
            }
        }
    }

    pub fn children(&self) -> Vec<&Vec<Step>> {
        match self {
            Step::Request { .. } => vec![],
            Step::Condition {
                then_steps,
                else_steps,
                ..
            } => vec![then_steps, else_steps],
            Step::Loop { loop_steps, .. } => vec![loop_steps],
        }
    }

    /// True if `target_id` appears anywhere in this step's subtree
    /// (including itself). Used by the structural mutator's cycle check.
    pub fn subtree_contains(&self, target_id: &str) -> bool {
        if self.id() == target_id {
            return true;
        }
        self.children()
            .into_iter()
            .flatten()
            .any(|child| child.subtree_contains(target_id))
    }
}

/// A mapping of `stepId` to its position in the node-graph view. Opaque to
/// the interpreter; round-tripped by the codec only.
pub type VisualLayout = HashMap<String, Position>;

/// The top-level container: metadata, shared state, and an ordered step
/// tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flow {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub static_vars: HashMap<String, Value>,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default)]
    pub visual_layout: VisualLayout,
}

impl Flow {
    pub fn find_step(&self, id: &str) -> Option<&Step> {
        fn search<'a>(steps: &'a [Step], id: &str) -> Option<&'a Step> {
            for step in steps {
                if step.id() == id {
                    return Some(step);
                }
                for branch in step.children() {
                    if let Some(found) = search(branch, id) {
                        return Some(found);
                    }
                }
            }
            None
        }
        search(&self.steps, id)
    }
}

/// One level on the interpreter's stack: an ordered step sequence, an index
/// cursor, a context reference, and optional loop bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameKind {
    Main,
    Then,
    Else,
    Loop,
}

#[derive(Debug, Clone)]
pub struct ExecutionFrame {
    pub steps: Vec<Step>,
    pub index: usize,
    pub context: RuntimeContext,
    pub kind: FrameKind,
    pub parent_step_id: Option<String>,
    pub loop_items: Option<Vec<Value>>,
    pub loop_item_index: usize,
    pub loop_var_name: Option<String>,
}

impl ExecutionFrame {
    pub fn root(steps: Vec<Step>, context: RuntimeContext) -> Self {
        Self {
            steps,
            index: 0,
            context,
            kind: FrameKind::Main,
            parent_step_id: None,
            loop_items: None,
            loop_item_index: 0,
            loop_var_name: None,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.index >= self.steps.len()
    }

    pub fn current_step(&self) -> Option<&Step> {
        self.steps.get(self.index)
    }
}

/// Outcome of one step occurrence. A loop iteration produces one
/// `StepResult` per pass through its body, not one per loop overall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Success,
    Error,
    Running,
    Stopped,
    Skipped,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepResult {
    pub step_id: String,
    pub status: Option<StepStatus>,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub extraction_failures: Vec<crate::errors::ExtractionFailure>,
    #[serde(default)]
    pub extracted_values: HashMap<String, Value>,
}

impl StepResult {
    pub fn new(step_id: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            status: None,
            output: None,
            error: None,
            extraction_failures: Vec::new(),
            extracted_values: HashMap::new(),
        }
    }
}

/// One problem surfaced by `validate_flow`. Non-fatal: a flow with
/// validation issues can still run, it just cannot be saved cleanly by a
/// well-behaved host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub step_id: Option<String>,
}

impl ValidationIssue {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            step_id: None,
        }
    }

    pub fn on_step(mut self, step_id: impl Into<String>) -> Self {
        self.step_id = Some(step_id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(id: &str) -> Step {
        Step::Request {
            id: id.to_string(),
            name: id.to_string(),
            method: "GET".to_string(),
            url: String::new(),
            headers: HashMap::new(),
            raw_body_with_markers: Value::Null,
            body: String::new(),
            extract: HashMap::new(),
            on_failure: OnFailure::Stop,
        }
    }

    #[test]
    fn subtree_contains_finds_nested_descendant() {
        let loop_step = Step::Loop {
            id: "loop1".to_string(),
            name: "loop1".to_string(),
            source: "xs".to_string(),
            loop_variable: "item".to_string(),
            loop_steps: vec![request("req1")],
        };
        let condition = Step::Condition {
            id: "cond1".to_string(),
            name: "cond1".to_string(),
            condition: None,
            condition_data: ConditionData::default(),
            then_steps: vec![loop_step],
            else_steps: vec![],
        };
        assert!(condition.subtree_contains("req1"));
        assert!(condition.subtree_contains("loop1"));
        assert!(!condition.subtree_contains("req2"));
    }

    #[test]
    fn on_failure_defaults_to_stop() {
        let json = serde_json::json!({
            "type": "request", "id": "r1", "name": "r1"
        });
        let step: Step = serde_json::from_value(json).unwrap();
        match step {
            Step::Request { on_failure, method, .. } => {
                assert_eq!(on_failure, OnFailure::Stop);
                assert_eq!(method, "GET");
            }
            _ => panic!("expected Request"),
        }
    }

    #[test]
    fn loop_body_serializes_under_steps_field() {
        let step = Step::Loop {
            id: "l1".to_string(),
            name: "l1".to_string(),
            source: "xs".to_string(),
            loop_variable: "item".to_string(),
            loop_steps: vec![request("r1")],
        };
        let value = serde_json::to_value(&step).unwrap();
        assert!(value.get("steps").is_some());
        assert!(value.get("loopSteps").is_none());
    }

    #[test]
    fn find_step_descends_into_branches() {
        let flow = Flow {
            steps: vec![Step::Condition {
                id: "c1".to_string(),
                name: "c1".to_string(),
                condition: None,
                condition_data: ConditionData::default(),
                then_steps: vec![request("r1")],
                else_steps: vec![],
            }],
            ..Default::default()
        };
        assert!(flow.find_step("r1").is_some());
        assert!(flow.find_step("nope").is_none());
    }
}

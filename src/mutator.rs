//! Structural mutations over a flow's step tree: nested insertion, move
//! (with ancestor-cycle prevention), delete, and clone. Every operation
//! reports success/failure; none of them touch dirty-flag bookkeeping —
//! that is the host's responsibility, triggered by whatever called in.

use uuid::Uuid;

use crate::model::{ConditionData, Flow, Step};

/// Which child sequence of a Condition or Loop step to target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    Then,
    Else,
    Loop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovePosition {
    Before,
    After,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PathSegment {
    step_id: String,
    branch: Branch,
}

/// The location of a step within the tree: every ancestor container
/// (identified by owning step id and branch) down to the immediate parent
/// array, plus the step's index within that array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepLocation {
    path: Vec<PathSegment>,
    pub index: usize,
}

fn locate(steps: &[Step], id: &str, path: &mut Vec<PathSegment>) -> Option<usize> {
    if let Some(index) = steps.iter().position(|s| s.id() == id) {
        return Some(index);
    }
    for step in steps {
        match step {
            Step::Condition {
                id: sid,
                then_steps,
                else_steps,
                ..
            } => {
                path.push(PathSegment {
                    step_id: sid.clone(),
                    branch: Branch::Then,
                });
                if let Some(i) = locate(then_steps, id, path) {
                    return Some(i);
                }
                path.pop();

                path.push(PathSegment {
                    step_id: sid.clone(),
                    branch: Branch::Else,
                });
                if let Some(i) = locate(else_steps, id, path) {
                    return Some(i);
                }
                path.pop();
            }
            Step::Loop {
                id: sid, loop_steps, ..
            } => {
                path.push(PathSegment {
                    step_id: sid.clone(),
                    branch: Branch::Loop,
                });
                if let Some(i) = locate(loop_steps, id, path) {
                    return Some(i);
                }
                path.pop();
            }
            Step::Request { .. } => {}
        }
    }
    None
}

/// Finds `{step, parentSteps (reference), index, path}` for a step id.
pub fn find_step_info(flow: &Flow, id: &str) -> Option<StepLocation> {
    let mut path = Vec::new();
    let index = locate(&flow.steps, id, &mut path)?;
    Some(StepLocation { path, index })
}

fn container_mut<'a>(root: &'a mut Vec<Step>, path: &[PathSegment]) -> &'a mut Vec<Step> {
    let mut current = root;
    for segment in path {
        let step = current
            .iter_mut()
            .find(|s| s.id() == segment.step_id)
            .expect("path segments are constructed from a successful locate() over the same tree");
        current = match (step, segment.branch) {
            (Step::Condition { then_steps, .. }, Branch::Then) => then_steps,
            (Step::Condition { else_steps, .. }, Branch::Else) => else_steps,
            (Step::Loop { loop_steps, .. }, Branch::Loop) => loop_steps,
            _ => unreachable!("branch tag always matches the step kind it was recorded against"),
        };
    }
    current
}

fn find_mut<'a>(steps: &'a mut [Step], id: &str) -> Option<&'a mut Step> {
    if let Some(pos) = steps.iter().position(|s| s.id() == id) {
        return Some(&mut steps[pos]);
    }
    for step in steps.iter_mut() {
        let nested = match step {
            Step::Condition {
                then_steps,
                else_steps,
                ..
            } => find_mut(then_steps, id).or_else(|| find_mut(else_steps, id)),
            Step::Loop { loop_steps, .. } => find_mut(loop_steps, id),
            Step::Request { .. } => None,
        };
        if nested.is_some() {
            return nested;
        }
    }
    None
}

/// Appends `new_step` into the `then`/`else`/`loop` child sequence of
/// `parent_id`. Fails if `parent_id` is missing or is not a container of
/// the requested kind (e.g. `Branch::Loop` against a Condition step).
pub fn add_nested(flow: &mut Flow, new_step: Step, parent_id: &str, branch: Branch) -> bool {
    match (find_mut(&mut flow.steps, parent_id), branch) {
        (Some(Step::Condition { then_steps, .. }), Branch::Then) => {
            then_steps.push(new_step);
            true
        }
        (Some(Step::Condition { else_steps, .. }), Branch::Else) => {
            else_steps.push(new_step);
            true
        }
        (Some(Step::Loop { loop_steps, .. }), Branch::Loop) => {
            loop_steps.push(new_step);
            true
        }
        _ => false,
    }
}

/// Moves `source_id` to sit immediately before/after `target_id`. Rejects
/// (returning `false` without mutating) if `source_id == target_id` or if
/// `target_id` lies in the subtree rooted at `source_id` — moving a step
/// next to its own descendant would otherwise create a cycle.
///
/// Unlike an implementation that looks containers up by object identity,
/// this re-locates both source and target by id after the removal, so the
/// "target vanished because it shared the source's former array reference"
/// edge case the original guards against cannot occur here: ids are stable
/// regardless of how the backing `Vec` is reallocated.
pub fn move_step(
    flow: &mut Flow,
    source_id: &str,
    target_id: &str,
    position: MovePosition,
) -> bool {
    if source_id == target_id {
        return false;
    }
    let Some(source_step) = flow.find_step(source_id) else {
        return false;
    };
    if source_step.subtree_contains(target_id) {
        return false;
    }
    if flow.find_step(target_id).is_none() {
        return false;
    }

    let source_loc = find_step_info(flow, source_id).expect("already confirmed present");
    let removed = {
        let container = container_mut(&mut flow.steps, &source_loc.path);
        container.remove(source_loc.index)
    };

    let target_loc = find_step_info(flow, target_id).expect("target existence just verified");
    let container = container_mut(&mut flow.steps, &target_loc.path);
    let insert_at = match position {
        MovePosition::Before => target_loc.index,
        MovePosition::After => target_loc.index + 1,
    };
    container.insert(insert_at.min(container.len()), removed);
    true
}

/// Removes `step_id` wherever it appears in the tree. Returns `false`
/// (without mutating) if the step is not found.
pub fn delete_step(flow: &mut Flow, step_id: &str) -> bool {
    let Some(loc) = find_step_info(flow, step_id) else {
        return false;
    };
    let container = container_mut(&mut flow.steps, &loc.path);
    if loc.index < container.len() {
        container.remove(loc.index);
        true
    } else {
        false
    }
}

/// Inserts a deep copy of `original_id`'s subtree immediately after it at
/// the same depth, assigning fresh ids recursively throughout the copy.
pub fn clone_step(flow: &mut Flow, original_id: &str) -> bool {
    let Some(original) = flow.find_step(original_id).cloned() else {
        return false;
    };
    let cloned = assign_new_ids_recursive(original);

    let loc = find_step_info(flow, original_id).expect("source existence just verified");
    let container = container_mut(&mut flow.steps, &loc.path);
    container.insert(loc.index + 1, cloned);
    true
}

fn assign_new_ids_recursive(step: Step) -> Step {
    match step {
        Step::Request {
            name,
            method,
            url,
            headers,
            raw_body_with_markers,
            body,
            extract,
            on_failure,
            ..
        } => Step::Request {
            id: Uuid::new_v4().to_string(),
            name,
            method,
            url,
            headers,
            raw_body_with_markers,
            body,
            extract,
            on_failure,
        },
        Step::Condition {
            name,
            condition,
            condition_data,
            then_steps,
            else_steps,
            ..
        } => Step::Condition {
            id: Uuid::new_v4().to_string(),
            name,
            condition,
            condition_data: ConditionData {
                variable: condition_data.variable,
                operator: condition_data.operator,
                value: condition_data.value,
                preview: condition_data.preview,
            },
            then_steps: then_steps.into_iter().map(assign_new_ids_recursive).collect(),
            else_steps: else_steps.into_iter().map(assign_new_ids_recursive).collect(),
        },
        Step::Loop {
            name,
            source,
            loop_variable,
            loop_steps,
            ..
        } => Step::Loop {
            id: Uuid::new_v4().to_string(),
            name,
            source,
            loop_variable,
            loop_steps: loop_steps.into_iter().map(assign_new_ids_recursive).collect(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn request(id: &str) -> Step {
        Step::Request {
            id: id.to_string(),
            name: id.to_string(),
            method: "GET".to_string(),
            url: String::new(),
            headers: HashMap::new(),
            raw_body_with_markers: serde_json::Value::Null,
            body: String::new(),
            extract: HashMap::new(),
            on_failure: Default::default(),
        }
    }

    fn flow_with(steps: Vec<Step>) -> Flow {
        Flow {
            name: "demo".to_string(),
            steps,
            ..Default::default()
        }
    }

    #[test]
    fn add_nested_into_then_branch() {
        let mut flow = flow_with(vec![Step::Condition {
            id: "c1".to_string(),
            name: "c1".to_string(),
            condition: None,
            condition_data: ConditionData::default(),
            then_steps: vec![],
            else_steps: vec![],
        }]);
        assert!(add_nested(&mut flow, request("r1"), "c1", Branch::Then));
        assert!(flow.find_step("r1").is_some());
    }

    #[test]
    fn add_nested_rejects_wrong_branch_kind() {
        let mut flow = flow_with(vec![Step::Loop {
            id: "l1".to_string(),
            name: "l1".to_string(),
            source: "xs".to_string(),
            loop_variable: "item".to_string(),
            loop_steps: vec![],
        }]);
        assert!(!add_nested(&mut flow, request("r1"), "l1", Branch::Then));
    }

    #[test]
    fn move_reorders_siblings() {
        let mut flow = flow_with(vec![request("a"), request("b"), request("c")]);
        assert!(move_step(&mut flow, "a", "c", MovePosition::After));
        let ids: Vec<&str> = flow.steps.iter().map(|s| s.id()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    #[test]
    fn move_rejects_when_source_equals_target() {
        let mut flow = flow_with(vec![request("a")]);
        assert!(!move_step(&mut flow, "a", "a", MovePosition::Before));
    }

    #[test]
    fn move_rejects_cycle_where_target_is_descendant_of_source() {
        let mut flow = flow_with(vec![Step::Condition {
            id: "c".to_string(),
            name: "c".to_string(),
            condition: None,
            condition_data: ConditionData::default(),
            then_steps: vec![Step::Loop {
                id: "l".to_string(),
                name: "l".to_string(),
                source: "xs".to_string(),
                loop_variable: "item".to_string(),
                loop_steps: vec![request("r")],
            }],
            else_steps: vec![],
        }]);
        assert!(!move_step(&mut flow, "c", "r", MovePosition::Before));
        assert!(flow.find_step("r").is_some());
        assert_eq!(flow.steps.len(), 1);
    }

    #[test]
    fn delete_removes_nested_step() {
        let mut flow = flow_with(vec![Step::Loop {
            id: "l".to_string(),
            name: "l".to_string(),
            source: "xs".to_string(),
            loop_variable: "item".to_string(),
            loop_steps: vec![request("r")],
        }]);
        assert!(delete_step(&mut flow, "r"));
        assert!(flow.find_step("r").is_none());
    }

    #[test]
    fn delete_missing_step_returns_false() {
        let mut flow = flow_with(vec![request("a")]);
        assert!(!delete_step(&mut flow, "missing"));
    }

    #[test]
    fn clone_inserts_copy_with_fresh_id_immediately_after() {
        let mut flow = flow_with(vec![request("a"), request("b")]);
        assert!(clone_step(&mut flow, "a"));
        assert_eq!(flow.steps.len(), 3);
        assert_eq!(flow.steps[0].id(), "a");
        assert_ne!(flow.steps[1].id(), "a");
        assert_eq!(flow.steps[2].id(), "b");
    }

    #[test]
    fn clone_assigns_fresh_ids_throughout_subtree() {
        let mut flow = flow_with(vec![Step::Loop {
            id: "l".to_string(),
            name: "l".to_string(),
            source: "xs".to_string(),
            loop_variable: "item".to_string(),
            loop_steps: vec![request("r")],
        }]);
        assert!(clone_step(&mut flow, "l"));
        assert_eq!(flow.steps.len(), 2);
        let Step::Loop { loop_steps, .. } = &flow.steps[1] else {
            panic!("expected cloned loop step")
        };
        assert_ne!(loop_steps[0].id(), "r");
    }
}

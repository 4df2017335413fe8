//! Runtime variable context: the name→value mapping visible to
//! substitution and condition evaluation at a given execution frame.

use std::collections::HashMap;

use serde_json::Value;

/// Mutated only by initial seeding from `staticVars`, request extractions,
/// and loop iteration setting the loop variable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuntimeContext {
    variables: HashMap<String, Value>,
}

impl RuntimeContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(static_vars: &HashMap<String, Value>) -> Self {
        Self {
            variables: static_vars.clone(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.variables.insert(name.into(), value);
    }

    pub fn unset(&mut self, name: &str) {
        self.variables.remove(name);
    }

    pub fn as_value(&self) -> Value {
        Value::Object(self.variables.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }

    /// A frame-local copy: frames share references conceptually but each
    /// writes into its own frame's context, never mutating a sibling's.
    pub fn fork(&self) -> Self {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn seeded_context_copies_static_vars() {
        let mut statics = HashMap::new();
        statics.insert("count".to_string(), json!(3));
        let ctx = RuntimeContext::seeded(&statics);
        assert_eq!(ctx.get("count"), Some(&json!(3)));
    }

    #[test]
    fn fork_is_independent() {
        let mut ctx = RuntimeContext::new();
        ctx.set("x", json!(1));
        let mut forked = ctx.fork();
        forked.set("x", json!(2));
        assert_eq!(ctx.get("x"), Some(&json!(1)));
        assert_eq!(forked.get("x"), Some(&json!(2)));
    }
}

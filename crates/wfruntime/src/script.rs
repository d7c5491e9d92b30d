use rhai::{Dynamic, Engine, Scope};
use serde_json::Value;
use wfcore::{NodeError, ScriptEvaluator};

/// Evaluates decision scripts and edge conditions with `rhai`.
///
/// Every evaluation gets a fresh engine, so scripts cannot leak state into
/// each other. Top-level state keys become variables (characters that are
/// not valid in identifiers turn into `_`), and the whole state is also
/// available as `state`.
#[derive(Debug, Clone)]
pub struct RhaiEvaluator {
    max_operations: u64,
    max_expr_depth: usize,
}

impl RhaiEvaluator {
    pub fn new() -> Self {
        Self {
            max_operations: 100_000,
            max_expr_depth: 64,
        }
    }

    pub fn with_max_operations(mut self, max_operations: u64) -> Self {
        self.max_operations = max_operations;
        self
    }

    fn engine(&self) -> Engine {
        let mut engine = Engine::new();
        engine.set_max_operations(self.max_operations);
        engine.set_max_expr_depths(self.max_expr_depth, self.max_expr_depth);
        engine
    }
}

impl Default for RhaiEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptEvaluator for RhaiEvaluator {
    fn evaluate(
        &self,
        script: &str,
        state: &Value,
        bindings: &[(&str, Value)],
    ) -> Result<Value, NodeError> {
        let mut scope = Scope::new();

        if let Value::Object(map) = state {
            for (key, value) in map {
                scope.push_dynamic(identifier(key), to_dynamic(value)?);
            }
        }
        scope.push_dynamic("state", to_dynamic(state)?);
        for (name, value) in bindings {
            scope.push_dynamic(identifier(name), to_dynamic(value)?);
        }

        let result: Dynamic = self
            .engine()
            .eval_with_scope(&mut scope, script)
            .map_err(|e| NodeError::Script(format!("'{}': {}", script, e)))?;

        rhai::serde::from_dynamic(&result).map_err(|e| {
            NodeError::Script(format!(
                "'{}' returned an unrepresentable value: {}",
                script, e
            ))
        })
    }
}

fn to_dynamic(value: &Value) -> Result<Dynamic, NodeError> {
    rhai::serde::to_dynamic(value)
        .map_err(|e| NodeError::Script(format!("cannot expose state: {}", e)))
}

/// Turn a state key into a usable variable name.
pub fn identifier(key: &str) -> String {
    let mut ident: String = key
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if ident.chars().next().map_or(true, |c| c.is_ascii_digit()) {
        ident.insert(0, '_');
    }
    ident
}

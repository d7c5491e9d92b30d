use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use wfcore::{
    Node, NodeConfig, NodeContext, NodeError, NodeExecutionRecord, NodeExecutor, NodeKind,
    NodeOutcome, ScriptEvaluator, ValueExt,
};

/// Evaluates a script to pick a branch; edges match on the result.
pub struct DecisionExecutor {
    evaluator: Arc<dyn ScriptEvaluator>,
}

impl DecisionExecutor {
    pub fn new(evaluator: Arc<dyn ScriptEvaluator>) -> Self {
        Self { evaluator }
    }
}

#[async_trait]
impl NodeExecutor for DecisionExecutor {
    fn kind(&self) -> NodeKind {
        NodeKind::Decision
    }

    async fn execute(&self, node: &Node, ctx: NodeContext) -> Result<NodeOutcome, NodeError> {
        let NodeConfig::Decision(cfg) = &node.config else {
            return Err(NodeError::Configuration(format!(
                "node '{}' is not a decision node",
                node.id
            )));
        };
        let Some(script) = cfg.script.as_deref().filter(|s| !s.trim().is_empty()) else {
            return Ok(NodeOutcome::completed(NodeExecutionRecord::success(
                node.id.clone(),
                Value::Null,
                Value::Null,
                0,
            )));
        };

        let start = Instant::now();
        let result = self.evaluator.evaluate(script, &ctx.state, &[]);
        let elapsed_ms = start.elapsed().as_millis() as u64;
        let request = json!({ "script": script });

        let value = match result {
            Ok(value @ (Value::Bool(_) | Value::String(_) | Value::Number(_))) => value,
            Ok(other) => {
                let message = format!(
                    "decision must yield a boolean, string or number, got {}",
                    other.type_name()
                );
                return Ok(NodeOutcome::completed(NodeExecutionRecord::error(
                    node.id.clone(),
                    request,
                    message,
                    elapsed_ms,
                )));
            }
            Err(e) => {
                ctx.events.warn(e.to_string());
                return Ok(NodeOutcome::completed(NodeExecutionRecord::error(
                    node.id.clone(),
                    request,
                    e.to_string(),
                    elapsed_ms,
                )));
            }
        };

        ctx.events.info(format!("Decision result: {}", value));
        Ok(NodeOutcome::Completed {
            record: NodeExecutionRecord::success(
                node.id.clone(),
                request,
                json!({ "result": value }),
                elapsed_ms,
            ),
            branch: Some(value),
        })
    }
}

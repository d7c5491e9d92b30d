use async_trait::async_trait;
use wfcore::{
    Node, NodeConfig, NodeContext, NodeError, NodeExecutionRecord, NodeExecutor, NodeKind,
    NodeOutcome, PauseSignal,
};

/// Suspends the run until someone submits the form.
///
/// When the node already holds a submission (the run was resumed and
/// traversal came back to it) the submission is passed through.
pub struct FormExecutor;

#[async_trait]
impl NodeExecutor for FormExecutor {
    fn kind(&self) -> NodeKind {
        NodeKind::Form
    }

    async fn execute(&self, node: &Node, ctx: NodeContext) -> Result<NodeOutcome, NodeError> {
        let NodeConfig::Form(form) = &node.config else {
            return Err(NodeError::Configuration(format!("node '{}' is not a form node", node.id)));
        };

        if let Some(submitted) = ctx.response_of(&node.id) {
            return Ok(NodeOutcome::completed(NodeExecutionRecord::success(
                node.id.clone(),
                form.schema.clone(),
                submitted.clone(),
                0,
            )));
        }

        ctx.events.info("Waiting for form submission");
        Ok(NodeOutcome::Paused(PauseSignal {
            node_id: node.id.clone(),
            form_schema: form.schema.clone(),
        }))
    }

    fn validate(&self, node: &Node) -> Result<(), NodeError> {
        if let NodeConfig::Form(form) = &node.config {
            if !form.schema.is_object() {
                return Err(NodeError::Configuration("form schema must be an object".into()));
            }
        }
        Ok(())
    }
}

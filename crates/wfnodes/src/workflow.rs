use crate::http::{failure_message, send_with_retry, HttpCall, HttpClients};
use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use wfcore::template::{resolve_text, resolve_value};
use wfcore::{
    Node, NodeConfig, NodeContext, NodeError, NodeExecutionRecord, NodeExecutor, NodeKind,
    NodeOutcome, RetryPolicy,
};

/// Runs another workflow, either remotely over HTTP or from the local store.
pub struct WorkflowExecutor {
    clients: HttpClients,
}

impl WorkflowExecutor {
    pub fn new(clients: HttpClients) -> Self {
        Self { clients }
    }
}

#[async_trait]
impl NodeExecutor for WorkflowExecutor {
    fn kind(&self) -> NodeKind {
        NodeKind::Workflow
    }

    async fn execute(&self, node: &Node, ctx: NodeContext) -> Result<NodeOutcome, NodeError> {
        let NodeConfig::Workflow(cfg) = &node.config else {
            return Err(NodeError::Configuration(format!(
                "node '{}' is not a workflow node",
                node.id
            )));
        };

        let mut inputs = Map::new();
        for (key, template) in &cfg.input_mapping {
            inputs.insert(key.clone(), resolve_value(template, &ctx.state)?);
        }
        let inputs = Value::Object(inputs);
        let timeout_ms = cfg.timeout_ms.unwrap_or(ctx.default_timeout_ms);

        let start = Instant::now();
        let result = if let Some(url) = &cfg.url {
            let call = HttpCall {
                method: Method::POST,
                url: resolve_text(url, &ctx.state)?,
                headers: BTreeMap::new(),
                body: Some(json!({ "inputs": inputs })),
                auth: None,
                timeout_ms,
            };
            send_with_retry(
                self.clients.client(true),
                &call,
                &RetryPolicy::default(),
                &ctx.cancellation,
                &ctx.events,
            )
            .await
            .map(|reply| reply.body)
        } else {
            let (Some(name), Some(runner)) = (&cfg.graph_name, &ctx.subgraphs) else {
                return Err(NodeError::Configuration(format!(
                    "workflow node '{}' has neither a url nor a runnable graph_name",
                    node.id
                )));
            };
            ctx.events.info(format!("Running sub-workflow '{}'", name));
            match tokio::time::timeout(
                Duration::from_millis(timeout_ms),
                runner.run_subgraph(name, inputs.clone(), ctx.cancellation.child_token()),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(NodeError::Timeout { ms: timeout_ms }),
            }
        };
        let elapsed_ms = start.elapsed().as_millis() as u64;

        let record = match result {
            Ok(output) => NodeExecutionRecord::success(node.id.clone(), inputs, output, elapsed_ms),
            Err(NodeError::Cancelled) => return Err(NodeError::Cancelled),
            Err(e) => {
                NodeExecutionRecord::error(node.id.clone(), inputs, failure_message(&e), elapsed_ms)
            }
        };
        Ok(NodeOutcome::completed(record))
    }

    fn validate(&self, node: &Node) -> Result<(), NodeError> {
        if let NodeConfig::Workflow(cfg) = &node.config {
            if cfg.url.is_none() && cfg.graph_name.is_none() {
                return Err(NodeError::Configuration("either url or graph_name is required".into()));
            }
        }
        Ok(())
    }
}

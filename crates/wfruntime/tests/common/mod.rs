#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use wfcore::template::resolve_value;
use wfcore::{
    FormConfig, Node, NodeConfig, NodeContext, NodeError, NodeExecutionRecord, NodeExecutor,
    NodeKind, NodeOutcome, PauseSignal, ScriptEvaluator, ServiceConfig, TemplateError,
};
use wfruntime::{ExecutorRegistry, RhaiEvaluator, RuntimeConfig, Scheduler};

/// Node ids in the order the fake service executor saw them.
pub type CallLog = Arc<Mutex<Vec<String>>>;

/// Pretends to call HTTP endpoints. URLs containing `/fail` answer with a
/// 500, `bad-template` raises a template error.
pub struct FakeService {
    pub calls: CallLog,
}

#[async_trait]
impl NodeExecutor for FakeService {
    fn kind(&self) -> NodeKind {
        NodeKind::Service
    }

    async fn execute(&self, node: &Node, ctx: NodeContext) -> Result<NodeOutcome, NodeError> {
        let NodeConfig::Service(cfg) = &node.config else {
            return Err(NodeError::Configuration("not a service node".into()));
        };
        self.calls.lock().unwrap().push(node.id.clone());

        if cfg.url.contains("bad-template") {
            return Err(TemplateError::Unclosed { offset: 0 }.into());
        }
        let request = match &cfg.body {
            Some(body) => resolve_value(body, &ctx.state)?,
            None => Value::Null,
        };
        let record = if cfg.url.contains("/fail") {
            NodeExecutionRecord::error(node.id.clone(), request, "HTTP 500: boom", 1)
        } else {
            let response = json!({ "ok": true, "node": node.id });
            NodeExecutionRecord::success(node.id.clone(), request, response, 1)
        };
        Ok(NodeOutcome::completed(record))
    }
}

pub struct FakeForm;

#[async_trait]
impl NodeExecutor for FakeForm {
    fn kind(&self) -> NodeKind {
        NodeKind::Form
    }

    async fn execute(&self, node: &Node, ctx: NodeContext) -> Result<NodeOutcome, NodeError> {
        let NodeConfig::Form(form) = &node.config else {
            return Err(NodeError::Configuration("not a form node".into()));
        };
        match ctx.response_of(&node.id) {
            Some(data) => Ok(NodeOutcome::completed(NodeExecutionRecord::success(
                node.id.clone(),
                form.schema.clone(),
                data.clone(),
                0,
            ))),
            None => Ok(NodeOutcome::Paused(PauseSignal {
                node_id: node.id.clone(),
                form_schema: form.schema.clone(),
            })),
        }
    }
}

pub struct FakeDecision;

#[async_trait]
impl NodeExecutor for FakeDecision {
    fn kind(&self) -> NodeKind {
        NodeKind::Decision
    }

    async fn execute(&self, node: &Node, ctx: NodeContext) -> Result<NodeOutcome, NodeError> {
        let NodeConfig::Decision(cfg) = &node.config else {
            return Err(NodeError::Configuration("not a decision node".into()));
        };
        let Some(script) = &cfg.script else {
            return Ok(NodeOutcome::completed(NodeExecutionRecord::success(
                node.id.clone(),
                Value::Null,
                Value::Null,
                0,
            )));
        };
        let result = RhaiEvaluator::new().evaluate(script, &ctx.state, &[])?;
        Ok(NodeOutcome::Completed {
            record: NodeExecutionRecord::success(
                node.id.clone(),
                Value::Null,
                json!({ "result": result }),
                0,
            ),
            branch: Some(result),
        })
    }
}

pub fn scheduler_with(config: RuntimeConfig) -> (Scheduler, CallLog) {
    let calls: CallLog = Arc::new(Mutex::new(Vec::new()));
    let mut registry = ExecutorRegistry::new();
    registry.register(Arc::new(FakeService { calls: calls.clone() }));
    registry.register(Arc::new(FakeForm));
    registry.register(Arc::new(FakeDecision));

    let scheduler = Scheduler::new(
        Arc::new(registry),
        Arc::new(RhaiEvaluator::new()),
        Arc::new(wfcore::EventBus::new(64)),
        config,
    );
    (scheduler, calls)
}

pub fn scheduler() -> (Scheduler, CallLog) {
    scheduler_with(RuntimeConfig::default())
}

pub fn service(id: &str, url: &str) -> Node {
    Node::new(id, NodeConfig::Service(ServiceConfig::new("GET", url)))
}

pub fn service_with_body(id: &str, body: Value) -> Node {
    let config = ServiceConfig::new("POST", "https://x/submit").with_body(body);
    Node::new(id, NodeConfig::Service(config))
}

pub fn form(id: &str) -> Node {
    Node::new(
        id,
        NodeConfig::Form(FormConfig {
            schema: json!({
                "title": "Who are you?",
                "type": "object",
                "properties": { "name": { "type": "string" } },
                "required": ["name"]
            }),
        }),
    )
}

pub fn decision(id: &str, script: Option<&str>) -> Node {
    Node::new(
        id,
        NodeConfig::Decision(wfcore::DecisionConfig {
            script: script.map(str::to_string),
        }),
    )
}

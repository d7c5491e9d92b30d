//! Built-in node executors
//!
//! One executor per node kind: `service`, `decision`, `llm`, `form` and
//! `workflow`.

mod decision;
mod form;
mod http;
mod llm;
mod service;
mod workflow;

pub use decision::DecisionExecutor;
pub use form::FormExecutor;
pub use http::HttpClients;
pub use llm::{HttpLlmClient, LlmClient, LlmExecutor, LlmRequest, LlmResponse, DEFAULT_LLM_BASE_URL};
pub use service::ServiceExecutor;
pub use workflow::WorkflowExecutor;

use std::sync::Arc;
use wfcore::{NodeError, ScriptEvaluator};
use wfruntime::{ExecutorRegistry, RhaiEvaluator};

/// Shared collaborators handed to the executors.
#[derive(Clone)]
pub struct NodeDeps {
    pub http: HttpClients,
    pub evaluator: Arc<dyn ScriptEvaluator>,
    pub llm: Arc<dyn LlmClient>,
}

impl NodeDeps {
    pub fn new(
        http: HttpClients,
        evaluator: Arc<dyn ScriptEvaluator>,
        llm: Arc<dyn LlmClient>,
    ) -> Self {
        Self { http, evaluator, llm }
    }

    /// Rhai scripting and an OpenAI-compatible client configured from
    /// `LLM_BASE_URL` and `LLM_API_KEY`.
    pub fn from_env() -> Result<Self, NodeError> {
        let http = HttpClients::new()?;
        let base_url =
            std::env::var("LLM_BASE_URL").unwrap_or_else(|_| DEFAULT_LLM_BASE_URL.to_string());
        let mut llm = HttpLlmClient::new(http.clone(), base_url);
        if let Ok(key) = std::env::var("LLM_API_KEY") {
            llm = llm.with_api_key(key);
        }
        Ok(Self::new(http, Arc::new(RhaiEvaluator::new()), Arc::new(llm)))
    }
}

/// Register all built-in executors with a registry
pub fn register_all(registry: &mut ExecutorRegistry, deps: NodeDeps) {
    registry.register(Arc::new(ServiceExecutor::new(deps.http.clone())));
    registry.register(Arc::new(DecisionExecutor::new(deps.evaluator)));
    registry.register(Arc::new(LlmExecutor::new(deps.llm)));
    registry.register(Arc::new(FormExecutor));
    registry.register(Arc::new(WorkflowExecutor::new(deps.http)));
}

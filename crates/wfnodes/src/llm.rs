use crate::http::{failure_message, send_with_retry, HttpCall, HttpClients};
use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use wfcore::template::resolve_text;
use wfcore::{
    EventEmitter, Node, NodeConfig, NodeContext, NodeError, NodeExecutionRecord, NodeExecutor,
    NodeKind, NodeOutcome, RetryPolicy,
};

pub const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LlmRequest {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip)]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LlmResponse {
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Value>,
}

/// Completion backend used by `llm` nodes.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(
        &self,
        request: &LlmRequest,
        cancel: &CancellationToken,
        events: &EventEmitter,
    ) -> Result<LlmResponse, NodeError>;
}

/// OpenAI-compatible chat completions client. Works with anything that
/// serves `/chat/completions` (OpenAI, Ollama, vLLM, OpenRouter).
pub struct HttpLlmClient {
    clients: HttpClients,
    base_url: String,
    api_key: Option<String>,
}

impl HttpLlmClient {
    pub fn new(clients: HttpClients, base_url: impl Into<String>) -> Self {
        Self {
            clients,
            base_url: base_url.into(),
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<Value>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(
        &self,
        request: &LlmRequest,
        cancel: &CancellationToken,
        events: &EventEmitter,
    ) -> Result<LlmResponse, NodeError> {
        let mut messages = Vec::new();
        if let Some(system) = &request.system {
            messages.push(ChatMessage { role: "system", content: system });
        }
        messages.push(ChatMessage { role: "user", content: &request.prompt });

        let mut body = json!({ "model": request.model, "messages": messages });
        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }

        let mut headers = BTreeMap::new();
        if let Some(key) = &self.api_key {
            headers.insert("Authorization".to_string(), format!("Bearer {}", key));
        }
        let call = HttpCall {
            method: Method::POST,
            url: self.endpoint(),
            headers,
            body: Some(body),
            auth: None,
            timeout_ms: request.timeout_ms,
        };

        let client = self.clients.client(true);
        let reply = send_with_retry(client, &call, &RetryPolicy::default(), cancel, events).await?;
        let parsed: ChatResponse = serde_json::from_value(reply.body).map_err(|e| {
            NodeError::ExecutionFailed(format!("unexpected completion response: {}", e))
        })?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| {
                NodeError::ExecutionFailed("completion response has no content".into())
            })?;

        Ok(LlmResponse {
            content,
            model: parsed.model,
            usage: parsed.usage,
        })
    }
}

/// Sends a templated prompt to the configured [`LlmClient`].
pub struct LlmExecutor {
    client: Arc<dyn LlmClient>,
}

impl LlmExecutor {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NodeExecutor for LlmExecutor {
    fn kind(&self) -> NodeKind {
        NodeKind::Llm
    }

    async fn execute(&self, node: &Node, ctx: NodeContext) -> Result<NodeOutcome, NodeError> {
        let NodeConfig::Llm(cfg) = &node.config else {
            return Err(NodeError::Configuration(format!("node '{}' is not an llm node", node.id)));
        };

        let request = LlmRequest {
            model: cfg.model.clone(),
            system: cfg.system.as_deref().map(|s| resolve_text(s, &ctx.state)).transpose()?,
            prompt: resolve_text(&cfg.prompt, &ctx.state)?,
            temperature: cfg.temperature,
            timeout_ms: ctx.default_timeout_ms,
        };
        let request_data = serde_json::to_value(&request).unwrap_or(Value::Null);

        let start = Instant::now();
        let result = self.client.complete(&request, &ctx.cancellation, &ctx.events).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        let record = match result {
            Ok(response) => NodeExecutionRecord::success(
                node.id.clone(),
                request_data,
                serde_json::to_value(&response).unwrap_or(Value::Null),
                elapsed_ms,
            ),
            Err(NodeError::Cancelled) => return Err(NodeError::Cancelled),
            Err(e) => NodeExecutionRecord::error(
                node.id.clone(),
                request_data,
                failure_message(&e),
                elapsed_ms,
            ),
        };
        Ok(NodeOutcome::completed(record))
    }

    fn validate(&self, node: &Node) -> Result<(), NodeError> {
        if let NodeConfig::Llm(cfg) = &node.config {
            if cfg.model.trim().is_empty() {
                return Err(NodeError::Configuration("model must not be empty".into()));
            }
        }
        Ok(())
    }
}

mod common;

use async_trait::async_trait;
use common::{context, TestServer};
use serde_json::json;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use wfcore::{
    EventEmitter, LlmConfig, Node, NodeConfig, NodeError, NodeExecutor, NodeOutcome, RecordStatus,
};
use wfnodes::{HttpClients, HttpLlmClient, LlmClient, LlmExecutor, LlmRequest, LlmResponse};

/// Echoes the prompt back and remembers every request.
struct EchoClient {
    seen: Mutex<Vec<LlmRequest>>,
}

#[async_trait]
impl LlmClient for EchoClient {
    async fn complete(
        &self,
        request: &LlmRequest,
        _cancel: &CancellationToken,
        _events: &EventEmitter,
    ) -> Result<LlmResponse, NodeError> {
        self.seen.lock().unwrap().push(request.clone());
        if request.prompt.is_empty() {
            return Err(NodeError::ExecutionFailed("empty prompt".into()));
        }
        Ok(LlmResponse {
            content: format!("echo: {}", request.prompt),
            model: Some(request.model.clone()),
            usage: None,
        })
    }
}

fn llm_node(prompt: &str) -> Node {
    Node::new(
        "summarize",
        NodeConfig::Llm(LlmConfig {
            model: "test-model".into(),
            prompt: prompt.into(),
            system: Some("You answer about {{topic}}.".into()),
            temperature: Some(0.2),
        }),
    )
}

#[tokio::test]
async fn test_prompt_is_templated_and_recorded() {
    let client = Arc::new(EchoClient { seen: Mutex::new(Vec::new()) });
    let executor = LlmExecutor::new(client.clone());
    let state = json!({ "topic": "rust", "fetch": { "response_data": { "title": "Ownership" } } });

    let outcome = executor
        .execute(&llm_node("Summarize {{fetch.response_data.title}}"), context(state))
        .await
        .unwrap();

    let NodeOutcome::Completed { record, .. } = outcome else {
        panic!("llm node paused");
    };
    assert_eq!(record.status, RecordStatus::Success);
    assert_eq!(record.response_data["content"], "echo: Summarize Ownership");
    assert_eq!(record.request_data["system"], "You answer about rust.");

    let seen = client.seen.lock().unwrap();
    assert_eq!(seen[0].prompt, "Summarize Ownership");
    assert_eq!(seen[0].temperature, Some(0.2));
}

#[tokio::test]
async fn test_client_failure_is_an_error_record() {
    let executor = LlmExecutor::new(Arc::new(EchoClient { seen: Mutex::new(Vec::new()) }));

    let outcome = executor.execute(&llm_node(""), context(json!({}))).await.unwrap();

    let NodeOutcome::Completed { record, .. } = outcome else {
        panic!("llm node paused");
    };
    assert_eq!(record.status, RecordStatus::Error);
    assert_eq!(record.error_message.as_deref(), Some("Execution failed: empty prompt"));
}

#[tokio::test]
async fn test_http_client_speaks_chat_completions() {
    let server = TestServer::start(vec![(
        200,
        r#"{"model":"m-1","choices":[{"message":{"role":"assistant","content":"hello"}}],"usage":{"total_tokens":7}}"#,
    )])
    .await;
    let client = HttpLlmClient::new(HttpClients::new().unwrap(), format!("{}/v1/", server.base_url))
        .with_api_key("sk-test");
    let request = LlmRequest {
        model: "m-1".into(),
        system: Some("be brief".into()),
        prompt: "hi".into(),
        temperature: None,
        timeout_ms: 5_000,
    };

    let response = client
        .complete(&request, &CancellationToken::new(), &EventEmitter::detached("llm"))
        .await
        .unwrap();

    assert_eq!(response.content, "hello");
    assert_eq!(response.usage, Some(json!({ "total_tokens": 7 })));

    let sent = &server.requests()[0];
    assert_eq!(sent.path, "/v1/chat/completions");
    assert_eq!(sent.header("authorization"), Some("Bearer sk-test"));
    let body = sent.json();
    assert_eq!(body["model"], "m-1");
    assert_eq!(body["messages"][0], json!({ "role": "system", "content": "be brief" }));
    assert_eq!(body["messages"][1], json!({ "role": "user", "content": "hi" }));
    assert!(body.get("temperature").is_none());
}

#[tokio::test]
async fn test_http_client_reports_api_errors() {
    let server = TestServer::start(vec![(401, r#"{"error":"bad key"}"#)]).await;
    let client = HttpLlmClient::new(HttpClients::new().unwrap(), server.url("/v1"));
    let request = LlmRequest {
        model: "m".into(),
        system: None,
        prompt: "hi".into(),
        temperature: None,
        timeout_ms: 5_000,
    };

    let err = client
        .complete(&request, &CancellationToken::new(), &EventEmitter::detached("llm"))
        .await
        .unwrap_err();
    assert!(matches!(err, NodeError::Http { status: Some(401), .. }));
}

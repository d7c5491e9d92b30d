//! Request plumbing shared by the service, llm and workflow executors.

use reqwest::{Client, Method};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wfcore::{parse_body, AuthConfig, EventEmitter, NodeError, RetryPolicy};

/// One client that verifies certificates and one that does not, so TLS
/// settings can differ per node without rebuilding clients.
#[derive(Clone)]
pub struct HttpClients {
    verified: Client,
    unverified: Client,
}

impl HttpClients {
    pub fn new() -> Result<Self, NodeError> {
        let unverified = Client::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| NodeError::Configuration(format!("cannot build HTTP client: {}", e)))?;
        Ok(Self {
            verified: Client::new(),
            unverified,
        })
    }

    pub fn client(&self, verify_tls: bool) -> &Client {
        if verify_tls {
            &self.verified
        } else {
            &self.unverified
        }
    }
}

/// A fully resolved request.
#[derive(Debug, Clone)]
pub(crate) struct HttpCall {
    pub method: Method,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Value>,
    pub auth: Option<AuthConfig>,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone)]
pub(crate) struct HttpReply {
    pub status: u16,
    pub body: Value,
}

pub(crate) fn parse_method(method: &str) -> Result<Method, NodeError> {
    match method.to_uppercase().as_str() {
        "GET" => Ok(Method::GET),
        "POST" => Ok(Method::POST),
        "PUT" => Ok(Method::PUT),
        "PATCH" => Ok(Method::PATCH),
        "DELETE" => Ok(Method::DELETE),
        "HEAD" => Ok(Method::HEAD),
        _ => Err(NodeError::Configuration(format!("Unsupported method: {}", method))),
    }
}

/// Send `call`, retrying per `retry`.
///
/// Only the last attempt's result is returned. Cancellation aborts both the
/// in-flight request and any pending retry delay.
pub(crate) async fn send_with_retry(
    client: &Client,
    call: &HttpCall,
    retry: &RetryPolicy,
    cancel: &CancellationToken,
    events: &EventEmitter,
) -> Result<HttpReply, NodeError> {
    let attempts = retry.attempts();
    let mut attempt = 1;
    loop {
        events.info(format!("{} {} (attempt {}/{})", call.method, call.url, attempt, attempts));
        let result = tokio::select! {
            _ = cancel.cancelled() => return Err(NodeError::Cancelled),
            result = send_once(client, call) => result,
        };
        match result {
            Ok(reply) => {
                events.info(format!("Response status: {}", reply.status));
                return Ok(reply);
            }
            Err(e) if attempt < attempts => {
                events.warn(format!("Attempt {} failed: {}", attempt, e));
                tracing::warn!(
                    url = %call.url,
                    attempt,
                    "Request failed, retrying in {}ms: {}",
                    retry.retry_delay_ms,
                    e
                );
                tokio::select! {
                    _ = cancel.cancelled() => return Err(NodeError::Cancelled),
                    _ = tokio::time::sleep(Duration::from_millis(retry.retry_delay_ms)) => {}
                }
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

async fn send_once(client: &Client, call: &HttpCall) -> Result<HttpReply, NodeError> {
    let mut request = client
        .request(call.method.clone(), &call.url)
        .timeout(Duration::from_millis(call.timeout_ms));

    for (key, value) in &call.headers {
        request = request.header(key, value);
    }
    request = match &call.auth {
        Some(AuthConfig::Bearer { token }) => request.bearer_auth(token),
        Some(AuthConfig::Basic { username, password }) => {
            request.basic_auth(username, password.as_ref())
        }
        Some(AuthConfig::ApiKey { header, value }) => request.header(header, value),
        None => request,
    };
    request = match &call.body {
        None | Some(Value::Null) => request,
        Some(Value::String(text)) => request.body(text.clone()),
        Some(json) => request.json(json),
    };

    let response = request.send().await.map_err(|e| {
        if e.is_timeout() {
            NodeError::Timeout { ms: call.timeout_ms }
        } else {
            NodeError::Http {
                status: None,
                message: format!("HTTP request failed: {}", e),
            }
        }
    })?;

    let status = response.status();
    let text = response.text().await.map_err(|e| NodeError::Http {
        status: Some(status.as_u16()),
        message: format!("Failed to read response: {}", e),
    })?;

    if !status.is_success() {
        return Err(NodeError::Http {
            status: Some(status.as_u16()),
            message: if text.is_empty() { status.to_string() } else { text },
        });
    }

    Ok(HttpReply {
        status: status.as_u16(),
        body: parse_body(&text),
    })
}

/// What goes into a record's `error_message`: the response body for
/// non-2xx replies, the error text otherwise.
pub(crate) fn failure_message(error: &NodeError) -> String {
    match error {
        NodeError::Http { message, .. } => message.clone(),
        other => other.to_string(),
    }
}

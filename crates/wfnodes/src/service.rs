use crate::http::{failure_message, parse_method, send_with_retry, HttpCall, HttpClients};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Instant;
use wfcore::template::{resolve_text, resolve_value};
use wfcore::{
    AuthConfig, Node, NodeConfig, NodeContext, NodeError, NodeExecutionRecord, NodeExecutor,
    NodeKind, NodeOutcome,
};

/// Calls an HTTP endpoint and records its response body.
pub struct ServiceExecutor {
    clients: HttpClients,
}

impl ServiceExecutor {
    pub fn new(clients: HttpClients) -> Self {
        Self { clients }
    }
}

#[async_trait]
impl NodeExecutor for ServiceExecutor {
    fn kind(&self) -> NodeKind {
        NodeKind::Service
    }

    async fn execute(&self, node: &Node, ctx: NodeContext) -> Result<NodeOutcome, NodeError> {
        let NodeConfig::Service(cfg) = &node.config else {
            return Err(NodeError::Configuration(format!(
                "node '{}' is not a service node",
                node.id
            )));
        };

        let body = match &cfg.body {
            Some(body) => Some(resolve_value(body, &ctx.state)?),
            None => None,
        };
        let headers = cfg
            .headers
            .iter()
            .map(|(k, v)| Ok((k.clone(), resolve_text(v, &ctx.state)?)))
            .collect::<Result<BTreeMap<_, _>, NodeError>>()?;
        let call = HttpCall {
            method: parse_method(&cfg.method)?,
            url: resolve_text(&cfg.url, &ctx.state)?,
            headers,
            body: body.clone(),
            auth: cfg.auth.as_ref().map(|a| resolve_auth(a, &ctx.state)).transpose()?,
            timeout_ms: cfg.timeout_ms.unwrap_or(ctx.default_timeout_ms),
        };
        let request = body.unwrap_or(Value::Null);

        let start = Instant::now();
        let result = send_with_retry(
            self.clients.client(cfg.tls.verify),
            &call,
            &cfg.retry,
            &ctx.cancellation,
            &ctx.events,
        )
        .await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        let record = match result {
            Ok(reply) => {
                NodeExecutionRecord::success(node.id.clone(), request, reply.body, elapsed_ms)
            }
            Err(NodeError::Cancelled) => return Err(NodeError::Cancelled),
            Err(e) => NodeExecutionRecord::error(
                node.id.clone(),
                request,
                failure_message(&e),
                elapsed_ms,
            ),
        };
        Ok(NodeOutcome::completed(record))
    }

    fn validate(&self, node: &Node) -> Result<(), NodeError> {
        if let NodeConfig::Service(cfg) = &node.config {
            parse_method(&cfg.method)?;
            if cfg.url.trim().is_empty() {
                return Err(NodeError::Configuration("url must not be empty".into()));
            }
        }
        Ok(())
    }
}

fn resolve_auth(auth: &AuthConfig, state: &Value) -> Result<AuthConfig, NodeError> {
    Ok(match auth {
        AuthConfig::Bearer { token } => AuthConfig::Bearer {
            token: resolve_text(token, state)?,
        },
        AuthConfig::Basic { username, password } => AuthConfig::Basic {
            username: resolve_text(username, state)?,
            password: password.as_deref().map(|p| resolve_text(p, state)).transpose()?,
        },
        AuthConfig::ApiKey { header, value } => AuthConfig::ApiKey {
            header: header.clone(),
            value: resolve_text(value, state)?,
        },
    })
}

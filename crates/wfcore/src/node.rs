use crate::{events::EventEmitter, ExecutionId, Node, NodeError, NodeId, NodeKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// One executor per node kind.
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    /// The kind this executor handles.
    fn kind(&self) -> NodeKind;

    /// Execute `node` against the current run state.
    ///
    /// Recoverable failures (bad HTTP status, script errors) come back as a
    /// completed outcome whose record has status `error`. `Err` is reserved
    /// for failures that abort the node outright, like malformed templates.
    async fn execute(&self, node: &Node, ctx: NodeContext) -> Result<NodeOutcome, NodeError>;

    /// Optional: reject a node's configuration before the run starts.
    fn validate(&self, _node: &Node) -> Result<(), NodeError> {
        Ok(())
    }
}

/// Execution context passed to each executor
#[derive(Clone)]
pub struct NodeContext {
    pub execution_id: ExecutionId,

    /// Snapshot of the accumulated run state (inputs plus node entries).
    pub state: Arc<Value>,

    /// Event emitter for real-time updates
    pub events: EventEmitter,

    /// Cancelled when the caller abandons the run
    pub cancellation: CancellationToken,

    /// Runs referenced graphs for `workflow` nodes
    pub subgraphs: Option<Arc<dyn SubgraphRunner>>,

    /// Applied when a node does not configure its own timeout
    pub default_timeout_ms: u64,
}

impl NodeContext {
    pub fn new(execution_id: ExecutionId, state: Value, events: EventEmitter) -> Self {
        Self {
            execution_id,
            state: Arc::new(state),
            events,
            cancellation: CancellationToken::new(),
            subgraphs: None,
            default_timeout_ms: 30_000,
        }
    }

    /// The stored `response_data` of a node that already ran.
    pub fn response_of(&self, node_id: &str) -> Option<&Value> {
        self.state
            .get(node_id)
            .and_then(|entry| entry.get("response_data"))
            .filter(|v| !v.is_null())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Success,
    Error,
    Paused,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Success => "success",
            RecordStatus::Error => "error",
            RecordStatus::Paused => "paused",
        }
    }
}

/// What happened on one node visit. Immutable once appended to a history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeExecutionRecord {
    pub node_id: NodeId,
    pub status: RecordStatus,
    #[serde(default)]
    pub request_data: Value,
    #[serde(default)]
    pub response_data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub execution_time_ms: u64,
    pub timestamp: DateTime<Utc>,
}

impl NodeExecutionRecord {
    pub fn success(
        node_id: impl Into<String>,
        request: Value,
        response: Value,
        elapsed_ms: u64,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            status: RecordStatus::Success,
            request_data: request,
            response_data: response,
            error_message: None,
            execution_time_ms: elapsed_ms,
            timestamp: Utc::now(),
        }
    }

    pub fn error(
        node_id: impl Into<String>,
        request: Value,
        message: impl Into<String>,
        elapsed_ms: u64,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            status: RecordStatus::Error,
            request_data: request,
            response_data: Value::Null,
            error_message: Some(message.into()),
            execution_time_ms: elapsed_ms,
            timestamp: Utc::now(),
        }
    }

    pub fn paused(node_id: impl Into<String>, form_schema: Value) -> Self {
        Self {
            node_id: node_id.into(),
            status: RecordStatus::Paused,
            request_data: form_schema,
            response_data: Value::Null,
            error_message: None,
            execution_time_ms: 0,
            timestamp: Utc::now(),
        }
    }

    pub fn with_response(mut self, response: Value) -> Self {
        self.response_data = response;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == RecordStatus::Success
    }

    /// The shape stored under the node id in the accumulated state.
    pub fn state_entry(&self) -> Value {
        serde_json::json!({
            "status": self.status.as_str(),
            "request_data": self.request_data,
            "response_data": self.response_data,
        })
    }
}

/// Raised by form nodes that have no submission yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PauseSignal {
    pub node_id: NodeId,
    pub form_schema: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeOutcome {
    Completed {
        record: NodeExecutionRecord,
        /// Branch key produced by a decision node.
        branch: Option<Value>,
    },
    Paused(PauseSignal),
}

impl NodeOutcome {
    pub fn completed(record: NodeExecutionRecord) -> Self {
        NodeOutcome::Completed { record, branch: None }
    }
}

/// Sandboxed evaluation of decision scripts and edge conditions.
pub trait ScriptEvaluator: Send + Sync {
    /// Evaluate `script` with the state's top-level keys in scope, plus any
    /// extra `bindings`.
    fn evaluate(
        &self,
        script: &str,
        state: &Value,
        bindings: &[(&str, Value)],
    ) -> Result<Value, NodeError>;
}

/// Runs a referenced graph to completion on behalf of a `workflow` node.
#[async_trait]
pub trait SubgraphRunner: Send + Sync {
    /// Returns the sub-run's accumulated state when it completes.
    async fn run_subgraph(
        &self,
        graph_name: &str,
        inputs: Value,
        cancellation: CancellationToken,
    ) -> Result<Value, NodeError>;
}

use thiserror::Error;

/// Errors surfaced to callers of `run` / `resume`.
///
/// Node failures and routing failures inside a run are *not* reported here;
/// they end up on the returned state as a `failed` status.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Graph configuration error: {0}")]
    Graph(#[from] GraphError),

    #[error("Node error: {0}")]
    Node(#[from] NodeError),

    #[error("Form submission rejected: {0}")]
    Schema(#[from] SchemaValidationError),

    #[error("Run inputs must be a JSON object, got {0}")]
    InvalidInputs(String),

    #[error("Execution {execution_id} is not paused (status: {status})")]
    NotPaused { execution_id: String, status: String },

    #[error("Checkpoint was taken against {expected}, got {actual}")]
    GraphMismatch { expected: String, actual: String },

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Execution not found: {0}")]
    ExecutionNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Malformed `{{ }}` tokens.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unclosed '{{{{' at offset {offset}")]
    Unclosed { offset: usize },

    #[error("nested '{{{{' at offset {offset}")]
    Nested { offset: usize },

    #[error("empty reference at offset {offset}")]
    Empty { offset: usize },

    #[error("invalid reference path '{path}' at offset {offset}")]
    InvalidPath { path: String, offset: usize },
}

#[derive(Error, Debug, Clone)]
pub enum NodeError {
    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("HTTP error: {message}")]
    Http { status: Option<u16>, message: String },

    #[error("Script error: {0}")]
    Script(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Timeout after {ms}ms")]
    Timeout { ms: u64 },

    #[error("Sub-workflow error: {0}")]
    Subgraph(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Cancelled")]
    Cancelled,
}

impl NodeError {
    /// Template errors abort the node instead of being recorded on it.
    pub fn is_fatal(&self) -> bool {
        matches!(self, NodeError::Template(_) | NodeError::Cancelled)
    }
}

/// Problems detected before a run starts.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("Workflow not found: {0}")]
    NotFound(String),

    #[error("Workflow already exists: {0}")]
    AlreadyExists(String),

    #[error("Graph has no entry node")]
    NoEntryNode,

    #[error("Graph has multiple entry nodes: {}", .0.join(", "))]
    MultipleEntryNodes(Vec<String>),

    #[error("Duplicate node id: {0}")]
    DuplicateNodeId(String),

    #[error("Edge {from} -> {to} references unknown node '{missing}'")]
    DanglingEdge {
        from: String,
        to: String,
        missing: String,
    },

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("No executor registered for node kind '{0}'")]
    MissingExecutor(String),

    #[error("Invalid node '{node_id}': {message}")]
    InvalidNode { node_id: String, message: String },
}

/// A form submission that does not satisfy the paused node's schema.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{}", violations.join("; "))]
pub struct SchemaValidationError {
    pub node_id: String,
    pub violations: Vec<String>,
}

//! Core abstractions for the workflow engine
//!
//! This crate provides the graph model, the executor contract, template
//! resolution and form validation that every other crate builds on. It
//! does not run anything itself.

mod error;
pub mod events;
mod node;
pub mod schema;
pub mod template;
mod value;
mod workflow;

pub use error::{EngineError, GraphError, NodeError, SchemaValidationError, TemplateError};
pub use events::*;
pub use node::{
    NodeContext, NodeExecutionRecord, NodeExecutor, NodeOutcome, PauseSignal, RecordStatus,
    ScriptEvaluator, SubgraphRunner,
};
pub use value::{parse_body, ValueExt};
pub use workflow::{
    AuthConfig, DecisionConfig, Edge, FormConfig, LlmConfig, Node, NodeConfig, NodeId, NodeKind,
    RetryPolicy, ServiceConfig, SubWorkflowConfig, TlsConfig, WorkflowGraph, ERROR_CONDITION,
};

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

//! Workflow execution runtime
//!
//! This crate provides the scheduler that walks workflow graphs, the
//! executor registry, execution state and checkpoints, and the workflow
//! definition store.

pub mod checkpoint;
mod loader;
mod registry;
mod runtime;
mod scheduler;
mod script;
mod state;
mod store;
mod validate;

pub use checkpoint::{
    Checkpoint, CheckpointStore, FileCheckpointStore, InMemoryCheckpointStore, CHECKPOINT_FORMAT,
};
pub use loader::{load_graph_file, load_graphs_from_dir};
pub use registry::{ExecutorRegistry, KindMetadata};
pub use runtime::{GraphRuntime, GraphRuntimeBuilder, RuntimeConfig};
pub use scheduler::Scheduler;
pub use script::{identifier, RhaiEvaluator};
pub use state::{ExecutionState, FailureKind, RunFailure, RunStatus};
pub use store::{InMemoryWorkflowStore, WorkflowStore};
pub use validate::{validate_graph, GraphPlan};

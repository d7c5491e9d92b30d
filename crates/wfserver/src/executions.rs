//! Execute/resume bookkeeping behind the HTTP API.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;
use wfcore::{EngineError, GraphError, WorkflowGraph};
use wfruntime::{Checkpoint, CheckpointStore, ExecutionState, GraphRuntime, RunStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Success,
    Paused,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PausedAtForm {
    pub node_id: String,
    pub form_schema: Value,
}

/// Body returned by `/execute` and `/resume`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResponse {
    pub execution_id: Uuid,
    pub status: ResponseStatus,
    /// The run's accumulated state.
    pub result: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused_at_form: Option<PausedAtForm>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub steps: usize,
}

impl From<&ExecutionState> for ExecutionResponse {
    fn from(state: &ExecutionState) -> Self {
        let status = match state.status() {
            RunStatus::Completed => ResponseStatus::Success,
            RunStatus::Paused => ResponseStatus::Paused,
            RunStatus::Failed | RunStatus::Running => ResponseStatus::Error,
        };
        let paused_at_form = match (state.current_node_id(), state.pending_form()) {
            (Some(node_id), Some(schema)) => Some(PausedAtForm {
                node_id: node_id.to_string(),
                form_schema: schema.clone(),
            }),
            _ => None,
        };
        Self {
            execution_id: state.execution_id(),
            status,
            result: state.state_value(),
            paused_at_form,
            error: state.failure().map(|f| f.message.clone()),
            steps: state.steps(),
        }
    }
}

/// Runs graphs and parks paused runs in a checkpoint store until their form
/// is submitted.
#[derive(Clone)]
pub struct Executions {
    runtime: Arc<GraphRuntime>,
    checkpoints: Arc<dyn CheckpointStore>,
}

impl Executions {
    pub fn new(runtime: Arc<GraphRuntime>, checkpoints: Arc<dyn CheckpointStore>) -> Self {
        Self { runtime, checkpoints }
    }

    pub fn runtime(&self) -> &Arc<GraphRuntime> {
        &self.runtime
    }

    pub async fn execute(
        &self,
        graph: WorkflowGraph,
        inputs: Value,
    ) -> Result<ExecutionResponse, EngineError> {
        let state = self.runtime.run(&graph, inputs).await?;
        self.settle(&state, graph).await?;
        Ok(ExecutionResponse::from(&state))
    }

    pub async fn execute_by_name(
        &self,
        name: &str,
        inputs: Value,
    ) -> Result<ExecutionResponse, EngineError> {
        let (graph, state) = self.runtime.run_by_name(name, inputs).await?;
        self.settle(&state, graph).await?;
        Ok(ExecutionResponse::from(&state))
    }

    /// Continue a parked run.
    ///
    /// The checkpoint is claimed before anything runs, so a second submission
    /// for the same run finds nothing. A rejected submission puts it back so
    /// the form can be submitted again.
    pub async fn resume(
        &self,
        execution_id: Uuid,
        form_data: Value,
    ) -> Result<ExecutionResponse, EngineError> {
        let checkpoint = self
            .checkpoints
            .take(execution_id)
            .await?
            .ok_or_else(|| EngineError::ExecutionNotFound(execution_id.to_string()))?;

        match self.continue_run(checkpoint.clone(), form_data).await {
            Ok((graph, state)) => {
                self.settle(&state, graph).await?;
                Ok(ExecutionResponse::from(&state))
            }
            Err(e) => {
                self.checkpoints.save(&checkpoint).await?;
                Err(e)
            }
        }
    }

    async fn continue_run(
        &self,
        checkpoint: Checkpoint,
        form_data: Value,
    ) -> Result<(WorkflowGraph, ExecutionState), EngineError> {
        let graph = match checkpoint.graph {
            Some(graph) => graph,
            None => {
                let name = checkpoint.state.graph_name();
                self.runtime
                    .store()
                    .get_by_name(name)
                    .await?
                    .ok_or_else(|| GraphError::NotFound(name.to_string()))?
            }
        };
        let state = self.runtime.resume(checkpoint.state, &graph, form_data).await?;
        Ok((graph, state))
    }

    /// Ids of runs waiting for a form submission.
    pub async fn paused(&self) -> Result<Vec<Uuid>, EngineError> {
        self.checkpoints.list().await
    }

    async fn settle(
        &self,
        state: &ExecutionState,
        graph: WorkflowGraph,
    ) -> Result<(), EngineError> {
        if state.status() == RunStatus::Paused {
            tracing::info!(execution_id = %state.execution_id(), "Saving checkpoint");
            self.checkpoints
                .save(&Checkpoint::new(state.clone()).with_graph(graph))
                .await
        } else {
            self.checkpoints.remove(state.execution_id()).await
        }
    }
}

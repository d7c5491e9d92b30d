//! Per-run mutable state.
//!
//! Fields are private: callers read through accessors, and only the
//! scheduler in this crate moves a run between statuses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;
use wfcore::{ExecutionId, NodeExecutionRecord, NodeId, PauseSignal, WorkflowGraph};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Paused,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Running => "running",
            RunStatus::Paused => "paused",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// A node recorded an error and had no failure edge.
    NodeFailed,
    NoMatchingEdge,
    Template,
    StepLimitExceeded,
    Cancelled,
}

/// Why a run ended in `failed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFailure {
    pub node_id: Option<NodeId>,
    pub kind: FailureKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionState {
    execution_id: ExecutionId,
    graph_name: String,
    graph_version: u64,
    status: RunStatus,
    accumulated_state: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    current_node_id: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pending_form: Option<Value>,
    history: Vec<NodeExecutionRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    failure: Option<RunFailure>,
    steps: usize,
    started_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ExecutionState {
    pub(crate) fn start(graph: &WorkflowGraph, inputs: Map<String, Value>) -> Self {
        let now = Utc::now();
        Self {
            execution_id: Uuid::new_v4(),
            graph_name: graph.name.clone(),
            graph_version: graph.version,
            status: RunStatus::Running,
            accumulated_state: inputs,
            current_node_id: None,
            pending_form: None,
            history: Vec::new(),
            failure: None,
            steps: 0,
            started_at: now,
            updated_at: now,
        }
    }

    pub fn execution_id(&self) -> ExecutionId {
        self.execution_id
    }

    pub fn graph_name(&self) -> &str {
        &self.graph_name
    }

    pub fn graph_version(&self) -> u64 {
        self.graph_version
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn accumulated_state(&self) -> &Map<String, Value> {
        &self.accumulated_state
    }

    /// The accumulated state as a JSON object.
    pub fn state_value(&self) -> Value {
        Value::Object(self.accumulated_state.clone())
    }

    /// Recorded `response_data` of a node.
    pub fn response_of(&self, node_id: &str) -> Option<&Value> {
        self.accumulated_state
            .get(node_id)
            .and_then(|entry| entry.get("response_data"))
    }

    /// Recorded `request_data` of a node.
    pub fn request_of(&self, node_id: &str) -> Option<&Value> {
        self.accumulated_state
            .get(node_id)
            .and_then(|entry| entry.get("request_data"))
    }

    pub fn current_node_id(&self) -> Option<&str> {
        self.current_node_id.as_deref()
    }

    /// Form schema of the node the run is paused at.
    pub fn pending_form(&self) -> Option<&Value> {
        self.pending_form.as_ref()
    }

    pub fn history(&self) -> &[NodeExecutionRecord] {
        &self.history
    }

    pub fn failure(&self) -> Option<&RunFailure> {
        self.failure.as_ref()
    }

    /// Node visits so far, across run and resumes.
    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// `current_node_id` is set if and only if the run is paused.
    pub fn check_invariants(&self) -> Result<(), String> {
        match (self.status, &self.current_node_id) {
            (RunStatus::Paused, None) => Err("paused state without a current node".to_string()),
            (RunStatus::Paused, Some(_)) => Ok(()),
            (status, Some(node)) => {
                Err(format!("{} state still points at node '{}'", status, node))
            }
            (_, None) => Ok(()),
        }
    }

    pub(crate) fn begin_step(&mut self) {
        self.steps += 1;
    }

    /// Append a record and merge its entry under the node id.
    pub(crate) fn record(&mut self, record: NodeExecutionRecord) {
        if self.accumulated_state.contains_key(&record.node_id)
            && !self.history.iter().any(|r| r.node_id == record.node_id)
        {
            tracing::warn!(
                node_id = %record.node_id,
                "Node output shadows a run input with the same key"
            );
        }
        self.accumulated_state
            .insert(record.node_id.clone(), record.state_entry());
        self.history.push(record);
        self.touch();
    }

    pub(crate) fn pause(&mut self, signal: PauseSignal) {
        self.record(NodeExecutionRecord::paused(
            signal.node_id.clone(),
            signal.form_schema.clone(),
        ));
        self.status = RunStatus::Paused;
        self.current_node_id = Some(signal.node_id);
        self.pending_form = Some(signal.form_schema);
    }

    /// Leave `paused`; the caller records the submission next.
    pub(crate) fn unpause(&mut self) -> Option<NodeId> {
        self.status = RunStatus::Running;
        self.pending_form = None;
        self.touch();
        self.current_node_id.take()
    }

    pub(crate) fn complete(&mut self) {
        self.status = RunStatus::Completed;
        self.touch();
    }

    pub(crate) fn fail(
        &mut self,
        node_id: Option<&str>,
        kind: FailureKind,
        message: impl Into<String>,
    ) {
        self.status = RunStatus::Failed;
        self.current_node_id = None;
        self.pending_form = None;
        self.failure = Some(RunFailure {
            node_id: node_id.map(str::to_string),
            kind,
            message: message.into(),
        });
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

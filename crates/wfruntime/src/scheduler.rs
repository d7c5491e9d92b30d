use crate::registry::ExecutorRegistry;
use crate::runtime::RuntimeConfig;
use crate::state::{ExecutionState, FailureKind, RunStatus};
use crate::store::WorkflowStore;
use crate::validate::validate_graph;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use wfcore::schema::validate_submission;
use wfcore::{
    EngineError, EventBus, ExecutionEvent, GraphError, Node, NodeConfig, NodeContext, NodeError,
    NodeExecutionRecord, NodeId, NodeOutcome, ScriptEvaluator, SubgraphRunner, ValueExt,
    WorkflowGraph,
};

/// Where traversal goes after a node.
#[derive(Debug, Clone, PartialEq)]
enum Route {
    Next(NodeId),
    Done,
    Fail(FailureKind, String),
}

/// Walks a graph one node at a time, pausing at forms.
///
/// Cloning is cheap; every clone shares the registry, evaluator, store and
/// event bus.
#[derive(Clone)]
pub struct Scheduler {
    registry: Arc<ExecutorRegistry>,
    evaluator: Arc<dyn ScriptEvaluator>,
    event_bus: Arc<EventBus>,
    store: Option<Arc<dyn WorkflowStore>>,
    config: RuntimeConfig,
    depth: usize,
}

impl Scheduler {
    pub fn new(
        registry: Arc<ExecutorRegistry>,
        evaluator: Arc<dyn ScriptEvaluator>,
        event_bus: Arc<EventBus>,
        config: RuntimeConfig,
    ) -> Self {
        Self {
            registry,
            evaluator,
            event_bus,
            store: None,
            config,
            depth: 0,
        }
    }

    /// Store used to look up graphs referenced by `workflow` nodes
    pub fn with_store(mut self, store: Arc<dyn WorkflowStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn registry(&self) -> &Arc<ExecutorRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Start a run from the graph's entry node.
    pub async fn run(
        &self,
        graph: &WorkflowGraph,
        inputs: Value,
    ) -> Result<ExecutionState, EngineError> {
        self.run_with_cancel(graph, inputs, CancellationToken::new()).await
    }

    pub async fn run_with_cancel(
        &self,
        graph: &WorkflowGraph,
        inputs: Value,
        cancel: CancellationToken,
    ) -> Result<ExecutionState, EngineError> {
        let inputs = match inputs {
            Value::Null => Map::new(),
            Value::Object(map) => map,
            other => return Err(EngineError::InvalidInputs(other.type_name().to_string())),
        };
        let plan = validate_graph(graph, &self.registry)?;

        let mut state = ExecutionState::start(graph, inputs);
        tracing::info!(
            execution_id = %state.execution_id(),
            graph = %graph.label(),
            entry = %plan.entry,
            "Starting run"
        );
        self.event_bus.emit(ExecutionEvent::RunStarted {
            execution_id: state.execution_id(),
            graph_name: graph.name.clone(),
            timestamp: Utc::now(),
        });

        self.drive(graph, &mut state, plan.entry, &cancel).await?;
        Ok(state)
    }

    /// Continue a paused run with the submitted form data.
    ///
    /// A submission that does not satisfy the form's schema is rejected and
    /// the caller keeps its paused state.
    pub async fn resume(
        &self,
        saved: ExecutionState,
        graph: &WorkflowGraph,
        form_data: Value,
    ) -> Result<ExecutionState, EngineError> {
        self.resume_with_cancel(saved, graph, form_data, CancellationToken::new())
            .await
    }

    pub async fn resume_with_cancel(
        &self,
        saved: ExecutionState,
        graph: &WorkflowGraph,
        form_data: Value,
        cancel: CancellationToken,
    ) -> Result<ExecutionState, EngineError> {
        if saved.status() != RunStatus::Paused {
            return Err(EngineError::NotPaused {
                execution_id: saved.execution_id().to_string(),
                status: saved.status().to_string(),
            });
        }
        if graph.name != saved.graph_name() || graph.version != saved.graph_version() {
            return Err(EngineError::GraphMismatch {
                expected: format!("{}@v{}", saved.graph_name(), saved.graph_version()),
                actual: graph.label(),
            });
        }
        validate_graph(graph, &self.registry)?;

        let node_id = saved
            .current_node_id()
            .map(str::to_string)
            .ok_or_else(|| EngineError::Checkpoint("paused state without a current node".into()))?;
        let node = graph
            .find_node(&node_id)
            .ok_or_else(|| GraphError::NodeNotFound(node_id.clone()))?;
        let NodeConfig::Form(form) = &node.config else {
            return Err(GraphError::InvalidNode {
                node_id,
                message: format!("run is paused at a {} node, not a form", node.kind()),
            }
            .into());
        };
        validate_submission(&node_id, &form.schema, &form_data)?;

        let mut state = saved;
        state.unpause();
        state.record(NodeExecutionRecord::success(
            node_id.clone(),
            form.schema.clone(),
            form_data,
            0,
        ));
        tracing::info!(execution_id = %state.execution_id(), node_id = %node_id, "Resuming run");
        self.event_bus.emit(ExecutionEvent::RunResumed {
            execution_id: state.execution_id(),
            node_id: node_id.clone(),
            timestamp: Utc::now(),
        });

        match self.select_next(graph, node, None, None, &state) {
            Route::Next(next) => self.drive(graph, &mut state, next, &cancel).await?,
            Route::Done => self.finish(&mut state, None),
            Route::Fail(kind, message) => {
                self.finish(&mut state, Some((Some(node_id.as_str()), kind, message)))
            }
        }
        Ok(state)
    }

    async fn drive(
        &self,
        graph: &WorkflowGraph,
        state: &mut ExecutionState,
        mut current: NodeId,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        loop {
            if cancel.is_cancelled() {
                let message = "run cancelled".to_string();
                let failure = (Some(current.as_str()), FailureKind::Cancelled, message);
                self.finish(state, Some(failure));
                return Ok(());
            }
            if state.steps() >= self.config.max_steps {
                let message = format!("step budget of {} exhausted", self.config.max_steps);
                let failure = (Some(current.as_str()), FailureKind::StepLimitExceeded, message);
                self.finish(state, Some(failure));
                return Ok(());
            }

            let node = graph
                .find_node(&current)
                .ok_or_else(|| GraphError::NodeNotFound(current.clone()))?;
            let executor = self.registry.get(node.kind())?;
            state.begin_step();

            tracing::debug!(
                node_id = %node.id,
                kind = %node.kind(),
                step = state.steps(),
                "Executing node"
            );
            self.event_bus.emit(ExecutionEvent::NodeStarted {
                execution_id: state.execution_id(),
                node_id: node.id.clone(),
                kind: node.kind(),
                timestamp: Utc::now(),
            });

            let ctx = self.node_context(state, node, cancel);
            let start = Instant::now();
            let outcome = executor.execute(node, ctx).await;
            let elapsed_ms = start.elapsed().as_millis() as u64;

            let (succeeded, error, branch) = match outcome {
                Ok(NodeOutcome::Paused(signal)) => {
                    tracing::info!(node_id = %node.id, "Run paused awaiting form input");
                    self.event_bus.emit(ExecutionEvent::RunPaused {
                        execution_id: state.execution_id(),
                        node_id: node.id.clone(),
                        timestamp: Utc::now(),
                    });
                    state.pause(signal);
                    return Ok(());
                }
                Ok(NodeOutcome::Completed { record, branch }) => {
                    let succeeded = record.is_success();
                    let error = record.error_message.clone();
                    self.emit_node_result(state, &record);
                    state.record(record);
                    (succeeded, error, branch)
                }
                Err(e) if e.is_fatal() => {
                    let record = NodeExecutionRecord::error(
                        node.id.clone(),
                        Value::Null,
                        e.to_string(),
                        elapsed_ms,
                    );
                    self.emit_node_result(state, &record);
                    state.record(record);
                    let kind = match e {
                        NodeError::Cancelled => FailureKind::Cancelled,
                        _ => FailureKind::Template,
                    };
                    self.finish(state, Some((Some(node.id.as_str()), kind, e.to_string())));
                    return Ok(());
                }
                Err(e) => {
                    let record = NodeExecutionRecord::error(
                        node.id.clone(),
                        Value::Null,
                        e.to_string(),
                        elapsed_ms,
                    );
                    self.emit_node_result(state, &record);
                    state.record(record);
                    (false, Some(e.to_string()), None)
                }
            };

            let route = if succeeded {
                self.select_next(graph, node, None, branch.as_ref(), state)
            } else {
                let message = error.as_deref().unwrap_or("node failed");
                self.select_next(graph, node, Some(message), None, state)
            };
            match route {
                Route::Next(next) => {
                    tracing::debug!(from = %node.id, to = %next, "Following edge");
                    current = next;
                }
                Route::Done => {
                    self.finish(state, None);
                    return Ok(());
                }
                Route::Fail(kind, message) => {
                    self.finish(state, Some((Some(node.id.as_str()), kind, message)));
                    return Ok(());
                }
            }
        }
    }

    fn node_context(
        &self,
        state: &ExecutionState,
        node: &Node,
        cancel: &CancellationToken,
    ) -> NodeContext {
        let child = SubgraphHandle {
            scheduler: Scheduler {
                depth: self.depth + 1,
                ..self.clone()
            },
        };
        NodeContext {
            execution_id: state.execution_id(),
            state: Arc::new(state.state_value()),
            events: self.event_bus.create_emitter(state.execution_id(), node.id.clone()),
            cancellation: cancel.clone(),
            subgraphs: Some(Arc::new(child)),
            default_timeout_ms: self.config.default_node_timeout_ms,
        }
    }

    /// Pick the next node.
    ///
    /// A failed node only follows its `error` edge. Otherwise conditional
    /// edges are tried in declaration order and the first match wins; the
    /// first unconditional edge is the fallback.
    fn select_next(
        &self,
        graph: &WorkflowGraph,
        node: &Node,
        error: Option<&str>,
        branch: Option<&Value>,
        state: &ExecutionState,
    ) -> Route {
        if let Some(message) = error {
            return match graph.outgoing(&node.id).find(|e| e.is_failure_edge()) {
                Some(edge) => Route::Next(edge.target.clone()),
                None => Route::Fail(
                    FailureKind::NodeFailed,
                    format!("node '{}' failed: {}", node.id, message),
                ),
            };
        }

        let mut candidates = graph.outgoing(&node.id).filter(|e| !e.is_failure_edge()).peekable();
        if candidates.peek().is_none() {
            return Route::Done;
        }

        let scope = state.state_value();
        let mut fallback = None;
        for edge in candidates {
            match edge.condition() {
                None => {
                    fallback.get_or_insert(edge);
                }
                Some(condition) => {
                    if self.condition_matches(condition, branch, &scope) {
                        return Route::Next(edge.target.clone());
                    }
                }
            }
        }

        match fallback {
            Some(edge) => Route::Next(edge.target.clone()),
            None => Route::Fail(
                FailureKind::NoMatchingEdge,
                format!("no outgoing edge of '{}' matched", node.id),
            ),
        }
    }

    fn condition_matches(&self, condition: &str, branch: Option<&Value>, scope: &Value) -> bool {
        if let Some(branch) = branch {
            if let Some(matched) = match_branch_key(condition, branch) {
                return matched;
            }
        }

        let bindings: Vec<(&str, Value)> = branch
            .map(|b| vec![("result", b.clone())])
            .unwrap_or_default();
        match self.evaluator.evaluate(condition, scope, &bindings) {
            Ok(value) => value.is_truthy(),
            Err(e) => {
                tracing::debug!(
                    condition,
                    error = %e,
                    "Edge condition did not evaluate; treating as false"
                );
                false
            }
        }
    }

    fn emit_node_result(&self, state: &ExecutionState, record: &NodeExecutionRecord) {
        if record.is_success() {
            tracing::info!(
                node_id = %record.node_id,
                "Node completed in {}ms",
                record.execution_time_ms
            );
            self.event_bus.emit(ExecutionEvent::NodeCompleted {
                execution_id: state.execution_id(),
                node_id: record.node_id.clone(),
                duration_ms: record.execution_time_ms,
                timestamp: Utc::now(),
            });
        } else {
            let error = record.error_message.clone().unwrap_or_default();
            tracing::error!(node_id = %record.node_id, "Node failed: {}", error);
            self.event_bus.emit(ExecutionEvent::NodeFailed {
                execution_id: state.execution_id(),
                node_id: record.node_id.clone(),
                error,
                timestamp: Utc::now(),
            });
        }
    }

    fn finish(
        &self,
        state: &mut ExecutionState,
        failure: Option<(Option<&str>, FailureKind, String)>,
    ) {
        match failure {
            None => {
                tracing::info!(
                    execution_id = %state.execution_id(),
                    steps = state.steps(),
                    "Run completed"
                );
                state.complete();
            }
            Some((node_id, kind, message)) => {
                tracing::error!(
                    execution_id = %state.execution_id(),
                    ?kind,
                    "Run failed: {}",
                    message
                );
                state.fail(node_id, kind, message);
            }
        }
        self.event_bus.emit(ExecutionEvent::RunFinished {
            execution_id: state.execution_id(),
            success: state.status() == RunStatus::Completed,
            steps: state.steps(),
            timestamp: Utc::now(),
        });
    }
}

/// Compare a condition against a decision's branch key.
///
/// Returns `None` when the condition is not a literal and must be evaluated
/// as an expression instead.
fn match_branch_key(condition: &str, branch: &Value) -> Option<bool> {
    let literal = if condition.eq_ignore_ascii_case("true") {
        Value::Bool(true)
    } else if condition.eq_ignore_ascii_case("false") {
        Value::Bool(false)
    } else if let Ok(n) = condition.parse::<f64>() {
        serde_json::Number::from_f64(n).map(Value::Number)?
    } else if let Some(s) = unquote(condition) {
        Value::String(s.to_string())
    } else if let (Value::String(key), true) = (branch, is_bare_word(condition)) {
        // Bare words name string branch keys, never state variables.
        return Some(condition == key);
    } else {
        return None;
    };

    let matched = match (&literal, branch) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (a, b) => a == b,
    };
    Some(matched)
}

fn is_bare_word(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn unquote(s: &str) -> Option<&str> {
    ['"', '\'']
        .iter()
        .find_map(|q| s.strip_prefix(*q).and_then(|rest| rest.strip_suffix(*q)))
}

/// Lets `workflow` nodes run referenced graphs one level deeper.
struct SubgraphHandle {
    scheduler: Scheduler,
}

#[async_trait]
impl SubgraphRunner for SubgraphHandle {
    async fn run_subgraph(
        &self,
        graph_name: &str,
        inputs: Value,
        cancellation: CancellationToken,
    ) -> Result<Value, NodeError> {
        let scheduler = &self.scheduler;
        if scheduler.depth > scheduler.config.max_subgraph_depth {
            return Err(NodeError::Subgraph(format!(
                "sub-workflows nested deeper than {}",
                scheduler.config.max_subgraph_depth
            )));
        }
        let store = scheduler
            .store
            .as_ref()
            .ok_or_else(|| NodeError::Subgraph("no workflow store configured".to_string()))?;
        let graph = store
            .get_by_name(graph_name)
            .await
            .map_err(|e| NodeError::Subgraph(e.to_string()))?
            .ok_or_else(|| NodeError::Subgraph(format!("workflow '{}' not found", graph_name)))?;

        let state = scheduler
            .run_with_cancel(&graph, inputs, cancellation)
            .await
            .map_err(|e| NodeError::Subgraph(e.to_string()))?;

        match state.status() {
            RunStatus::Completed => Ok(state.state_value()),
            RunStatus::Failed => Err(NodeError::Subgraph(
                state
                    .failure()
                    .map(|f| f.message.clone())
                    .unwrap_or_else(|| "sub-workflow failed".to_string()),
            )),
            RunStatus::Paused => Err(NodeError::Subgraph(format!(
                "sub-workflow '{}' paused at form '{}'; forms inside sub-workflows are not supported",
                graph_name,
                state.current_node_id().unwrap_or_default()
            ))),
            RunStatus::Running => Err(NodeError::Subgraph(
                "sub-workflow did not finish".to_string(),
            )),
        }
    }
}

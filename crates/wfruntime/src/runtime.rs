use crate::registry::ExecutorRegistry;
use crate::scheduler::Scheduler;
use crate::script::RhaiEvaluator;
use crate::state::ExecutionState;
use crate::store::{InMemoryWorkflowStore, WorkflowStore};
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use wfcore::{EngineError, EventBus, GraphError, ScriptEvaluator, WorkflowGraph};

/// Main entry point for running workflows
pub struct GraphRuntime {
    scheduler: Scheduler,
    store: Arc<dyn WorkflowStore>,
    event_bus: Arc<EventBus>,
}

impl GraphRuntime {
    /// Runtime with a pre-configured registry, an in-memory store and the
    /// rhai evaluator
    pub fn with_registry(registry: Arc<ExecutorRegistry>, config: RuntimeConfig) -> Self {
        Self::builder(registry, config).build()
    }

    pub fn builder(registry: Arc<ExecutorRegistry>, config: RuntimeConfig) -> GraphRuntimeBuilder {
        GraphRuntimeBuilder {
            registry,
            config,
            evaluator: None,
            store: None,
        }
    }

    pub fn registry(&self) -> &Arc<ExecutorRegistry> {
        self.scheduler.registry()
    }

    pub fn store(&self) -> &Arc<dyn WorkflowStore> {
        &self.store
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Run a stored workflow by name
    pub async fn run_by_name(
        &self,
        name: &str,
        inputs: Value,
    ) -> Result<(WorkflowGraph, ExecutionState), EngineError> {
        let graph = self
            .store
            .get_by_name(name)
            .await?
            .ok_or_else(|| GraphError::NotFound(name.to_string()))?;
        let state = self.scheduler.run(&graph, inputs).await?;
        Ok((graph, state))
    }

    /// Run a graph directly (without storing it)
    pub async fn run(
        &self,
        graph: &WorkflowGraph,
        inputs: Value,
    ) -> Result<ExecutionState, EngineError> {
        self.scheduler.run(graph, inputs).await
    }

    pub async fn run_with_cancel(
        &self,
        graph: &WorkflowGraph,
        inputs: Value,
        cancel: CancellationToken,
    ) -> Result<ExecutionState, EngineError> {
        self.scheduler.run_with_cancel(graph, inputs, cancel).await
    }

    pub async fn resume(
        &self,
        saved: ExecutionState,
        graph: &WorkflowGraph,
        form_data: Value,
    ) -> Result<ExecutionState, EngineError> {
        self.scheduler.resume(saved, graph, form_data).await
    }

    /// Subscribe to execution events
    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<wfcore::ExecutionEvent> {
        self.event_bus.subscribe()
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }
}

pub struct GraphRuntimeBuilder {
    registry: Arc<ExecutorRegistry>,
    config: RuntimeConfig,
    evaluator: Option<Arc<dyn ScriptEvaluator>>,
    store: Option<Arc<dyn WorkflowStore>>,
}

impl GraphRuntimeBuilder {
    pub fn evaluator(mut self, evaluator: Arc<dyn ScriptEvaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    pub fn store(mut self, store: Arc<dyn WorkflowStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> GraphRuntime {
        let event_bus = Arc::new(EventBus::new(self.config.event_buffer_size));
        let evaluator = self
            .evaluator
            .unwrap_or_else(|| Arc::new(RhaiEvaluator::new()) as Arc<dyn ScriptEvaluator>);
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryWorkflowStore::new()) as Arc<dyn WorkflowStore>);
        let scheduler = Scheduler::new(self.registry, evaluator, event_bus.clone(), self.config)
            .with_store(store.clone());

        GraphRuntime {
            scheduler,
            store,
            event_bus,
        }
    }
}

/// Configuration for the runtime
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Node visits allowed per run, across resumes
    pub max_steps: usize,
    pub max_subgraph_depth: usize,
    pub event_buffer_size: usize,
    pub default_node_timeout_ms: u64,
}

impl RuntimeConfig {
    /// Defaults overridden by `WF_MAX_STEPS`, `WF_MAX_SUBGRAPH_DEPTH`,
    /// `WF_EVENT_BUFFER` and `WF_NODE_TIMEOUT_MS`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_steps: env_or("WF_MAX_STEPS", defaults.max_steps),
            max_subgraph_depth: env_or("WF_MAX_SUBGRAPH_DEPTH", defaults.max_subgraph_depth),
            event_buffer_size: env_or("WF_EVENT_BUFFER", defaults.event_buffer_size),
            default_node_timeout_ms: env_or("WF_NODE_TIMEOUT_MS", defaults.default_node_timeout_ms),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_steps: 1000,
            max_subgraph_depth: 8,
            event_buffer_size: 1000,
            default_node_timeout_ms: 30_000,
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring invalid {}={}", key, raw);
            default
        }),
        Err(_) => default,
    }
}

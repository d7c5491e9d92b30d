use std::collections::BTreeMap;
use std::sync::Arc;
use wfcore::{GraphError, NodeExecutor, NodeKind};

/// Metadata about a node kind
#[derive(Debug, Clone)]
pub struct KindMetadata {
    pub kind: NodeKind,
    pub description: &'static str,
}

/// Registry of executors, one per node kind
pub struct ExecutorRegistry {
    executors: BTreeMap<NodeKind, Arc<dyn NodeExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self {
            executors: BTreeMap::new(),
        }
    }

    /// Register an executor, replacing any previous one for its kind
    pub fn register(&mut self, executor: Arc<dyn NodeExecutor>) {
        let kind = executor.kind();
        tracing::info!("Registering executor for node kind: {}", kind);
        self.executors.insert(kind, executor);
    }

    pub fn get(&self, kind: NodeKind) -> Result<&Arc<dyn NodeExecutor>, GraphError> {
        self.executors
            .get(&kind)
            .ok_or_else(|| GraphError::MissingExecutor(kind.to_string()))
    }

    pub fn contains(&self, kind: NodeKind) -> bool {
        self.executors.contains_key(&kind)
    }

    /// Registered kinds, in a stable order
    pub fn list_kinds(&self) -> Vec<NodeKind> {
        self.executors.keys().copied().collect()
    }

    pub fn metadata(&self, kind: NodeKind) -> Option<KindMetadata> {
        self.contains(kind).then(|| KindMetadata {
            kind,
            description: describe(kind),
        })
    }
}

impl Default for ExecutorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn describe(kind: NodeKind) -> &'static str {
    match kind {
        NodeKind::Service => "Calls an HTTP endpoint with a templated body",
        NodeKind::Decision => "Evaluates a script and routes along matching edges",
        NodeKind::Llm => "Sends a templated prompt to a language model",
        NodeKind::Form => "Pauses the run until a form submission arrives",
        NodeKind::Workflow => "Runs another workflow as a sub-graph",
    }
}

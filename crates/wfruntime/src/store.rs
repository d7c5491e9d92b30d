use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use wfcore::{EngineError, GraphError, WorkflowGraph};

/// Named, versioned workflow definitions.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    async fn get_by_name(&self, name: &str) -> Result<Option<WorkflowGraph>, EngineError>;

    /// Store a new workflow at version 1.
    async fn create(&self, name: &str, graph: WorkflowGraph) -> Result<WorkflowGraph, EngineError>;

    /// Replace an existing workflow, bumping its version.
    async fn update(&self, name: &str, graph: WorkflowGraph) -> Result<WorkflowGraph, EngineError>;

    async fn delete(&self, name: &str) -> Result<(), EngineError>;

    async fn list_all(&self) -> Result<Vec<WorkflowGraph>, EngineError>;
}

#[derive(Default)]
pub struct InMemoryWorkflowStore {
    graphs: RwLock<BTreeMap<String, WorkflowGraph>>,
}

impl InMemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowStore for InMemoryWorkflowStore {
    async fn get_by_name(&self, name: &str) -> Result<Option<WorkflowGraph>, EngineError> {
        Ok(self.graphs.read().await.get(name).cloned())
    }

    async fn create(
        &self,
        name: &str,
        mut graph: WorkflowGraph,
    ) -> Result<WorkflowGraph, EngineError> {
        let mut graphs = self.graphs.write().await;
        if graphs.contains_key(name) {
            return Err(GraphError::AlreadyExists(name.to_string()).into());
        }
        graph.name = name.to_string();
        graph.version = 1;
        graphs.insert(name.to_string(), graph.clone());
        tracing::info!("Created workflow {}", graph.label());
        Ok(graph)
    }

    async fn update(
        &self,
        name: &str,
        mut graph: WorkflowGraph,
    ) -> Result<WorkflowGraph, EngineError> {
        let mut graphs = self.graphs.write().await;
        let existing = graphs
            .get_mut(name)
            .ok_or_else(|| GraphError::NotFound(name.to_string()))?;
        graph.name = name.to_string();
        graph.version = existing.version + 1;
        *existing = graph.clone();
        tracing::info!("Updated workflow {}", graph.label());
        Ok(graph)
    }

    async fn delete(&self, name: &str) -> Result<(), EngineError> {
        self.graphs
            .write()
            .await
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| GraphError::NotFound(name.to_string()).into())
    }

    async fn list_all(&self) -> Result<Vec<WorkflowGraph>, EngineError> {
        Ok(self.graphs.read().await.values().cloned().collect())
    }
}

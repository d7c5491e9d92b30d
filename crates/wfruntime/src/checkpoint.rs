//! Checkpoints for paused runs.
//!
//! A checkpoint is a JSON envelope around an [`ExecutionState`], optionally
//! carrying the graph snapshot the run was started against so a resume can
//! use exactly that definition.

use crate::state::ExecutionState;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use wfcore::{EngineError, ExecutionId, WorkflowGraph};

/// Envelope format understood by this build.
pub const CHECKPOINT_FORMAT: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub format: u32,
    pub state: ExecutionState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph: Option<WorkflowGraph>,
}

impl Checkpoint {
    pub fn new(state: ExecutionState) -> Self {
        Self {
            format: CHECKPOINT_FORMAT,
            state,
            graph: None,
        }
    }

    /// Pin the graph snapshot the run uses.
    pub fn with_graph(mut self, graph: WorkflowGraph) -> Self {
        self.graph = Some(graph);
        self
    }

    pub fn execution_id(&self) -> ExecutionId {
        self.state.execution_id()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, EngineError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EngineError> {
        let checkpoint: Checkpoint = serde_json::from_slice(bytes)
            .map_err(|e| EngineError::Checkpoint(format!("invalid checkpoint: {}", e)))?;
        if checkpoint.format != CHECKPOINT_FORMAT {
            return Err(EngineError::Checkpoint(format!(
                "unsupported checkpoint format {} (expected {})",
                checkpoint.format, CHECKPOINT_FORMAT
            )));
        }
        checkpoint
            .state
            .check_invariants()
            .map_err(EngineError::Checkpoint)?;
        if let Some(graph) = &checkpoint.graph {
            if graph.name != checkpoint.state.graph_name()
                || graph.version != checkpoint.state.graph_version()
            {
                return Err(EngineError::Checkpoint(format!(
                    "pinned graph {} does not match state for {}@v{}",
                    graph.label(),
                    checkpoint.state.graph_name(),
                    checkpoint.state.graph_version()
                )));
            }
        }
        Ok(checkpoint)
    }
}

/// Serialize a run's state.
pub fn serialize(state: &ExecutionState) -> Result<Vec<u8>, EngineError> {
    Checkpoint::new(state.clone()).to_bytes()
}

/// Restore a run's state.
pub fn deserialize(bytes: &[u8]) -> Result<ExecutionState, EngineError> {
    Checkpoint::from_bytes(bytes).map(|c| c.state)
}

/// Where paused runs wait for their form submission.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), EngineError>;

    async fn load(&self, execution_id: ExecutionId) -> Result<Option<Checkpoint>, EngineError>;

    async fn remove(&self, execution_id: ExecutionId) -> Result<(), EngineError>;

    /// Load and remove in one step. Of several concurrent callers at most
    /// one gets the checkpoint.
    async fn take(&self, execution_id: ExecutionId) -> Result<Option<Checkpoint>, EngineError>;

    async fn list(&self) -> Result<Vec<ExecutionId>, EngineError>;
}

#[derive(Default)]
pub struct InMemoryCheckpointStore {
    checkpoints: RwLock<HashMap<ExecutionId, Vec<u8>>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), EngineError> {
        // Stored encoded so a load never aliases a live state.
        let bytes = checkpoint.to_bytes()?;
        self.checkpoints
            .write()
            .await
            .insert(checkpoint.execution_id(), bytes);
        Ok(())
    }

    async fn load(&self, execution_id: ExecutionId) -> Result<Option<Checkpoint>, EngineError> {
        match self.checkpoints.read().await.get(&execution_id) {
            Some(bytes) => Checkpoint::from_bytes(bytes).map(Some),
            None => Ok(None),
        }
    }

    async fn remove(&self, execution_id: ExecutionId) -> Result<(), EngineError> {
        self.checkpoints.write().await.remove(&execution_id);
        Ok(())
    }

    async fn take(&self, execution_id: ExecutionId) -> Result<Option<Checkpoint>, EngineError> {
        match self.checkpoints.write().await.remove(&execution_id) {
            Some(bytes) => Checkpoint::from_bytes(&bytes).map(Some),
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<ExecutionId>, EngineError> {
        Ok(self.checkpoints.read().await.keys().copied().collect())
    }
}

/// One `<execution_id>.json` file per checkpoint.
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, execution_id: ExecutionId) -> PathBuf {
        self.dir.join(format!("{}.json", execution_id))
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), EngineError> {
        save_to_file(&self.path_for(checkpoint.execution_id()), checkpoint).await
    }

    async fn load(&self, execution_id: ExecutionId) -> Result<Option<Checkpoint>, EngineError> {
        let path = self.path_for(execution_id);
        if !tokio::fs::try_exists(&path).await? {
            return Ok(None);
        }
        load_from_file(&path).await.map(Some)
    }

    async fn remove(&self, execution_id: ExecutionId) -> Result<(), EngineError> {
        match tokio::fs::remove_file(self.path_for(execution_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn take(&self, execution_id: ExecutionId) -> Result<Option<Checkpoint>, EngineError> {
        // The rename is the claim; a concurrent caller finds nothing to rename.
        let claimed = self.dir.join(format!("{}.claimed", execution_id));
        match tokio::fs::rename(self.path_for(execution_id), &claimed).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        let checkpoint = load_from_file(&claimed).await;
        tokio::fs::remove_file(&claimed).await?;
        checkpoint.map(Some)
    }

    async fn list(&self) -> Result<Vec<ExecutionId>, EngineError> {
        let mut ids = Vec::new();
        if !tokio::fs::try_exists(&self.dir).await? {
            return Ok(ids);
        }
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension() != Some("json".as_ref()) {
                continue;
            }
            if let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse().ok())
            {
                ids.push(id);
            }
        }
        Ok(ids)
    }
}

/// Write a checkpoint as JSON, creating parent directories.
pub async fn save_to_file(path: &Path, checkpoint: &Checkpoint) -> Result<(), EngineError> {
    let bytes = checkpoint.to_bytes()?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, bytes).await?;
    Ok(())
}

pub async fn load_from_file(path: &Path) -> Result<Checkpoint, EngineError> {
    let bytes = tokio::fs::read(path).await?;
    Checkpoint::from_bytes(&bytes)
}

use crate::store::WorkflowStore;
use std::path::Path;
use wfcore::{EngineError, WorkflowGraph};

/// Read a single graph definition from a JSON file.
pub fn load_graph_file(path: &Path) -> Result<WorkflowGraph, EngineError> {
    let graph: WorkflowGraph = serde_json::from_reader(std::fs::File::open(path)?)?;
    Ok(graph)
}

/// Seed a store with every `*.json` graph in `dir`.
///
/// Files are loaded in name order; a graph whose name is already stored
/// replaces the stored one as a new version. Returns the loaded names.
pub async fn load_graphs_from_dir(
    dir: &Path,
    store: &dyn WorkflowStore,
) -> Result<Vec<String>, EngineError> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension() == Some("json".as_ref()) {
            paths.push(path);
        }
    }
    paths.sort();

    let mut loaded = Vec::with_capacity(paths.len());
    for path in paths {
        let graph = load_graph_file(&path)?;
        let name = graph.name.clone();
        if store.get_by_name(&name).await?.is_some() {
            store.update(&name, graph).await?;
        } else {
            store.create(&name, graph).await?;
        }
        tracing::info!("Loaded workflow '{}' from {}", name, path.display());
        loaded.push(name);
    }
    Ok(loaded)
}

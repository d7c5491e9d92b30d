use crate::registry::ExecutorRegistry;
use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use petgraph::Direction;
use serde_json::Value;
use std::collections::HashMap;
use wfcore::template::check_value;
use wfcore::{AuthConfig, GraphError, Node, NodeConfig, NodeId, WorkflowGraph};

/// Facts about a graph that passed validation.
#[derive(Debug, Clone)]
pub struct GraphPlan {
    pub entry: NodeId,
    pub cyclic: bool,
    pub unreachable: Vec<NodeId>,
}

/// Reject graphs that must never reach `running`.
pub fn validate_graph(
    graph: &WorkflowGraph,
    registry: &ExecutorRegistry,
) -> Result<GraphPlan, GraphError> {
    let mut dag: DiGraph<&str, ()> = DiGraph::new();
    let mut index: HashMap<&str, NodeIndex> = HashMap::new();

    for node in &graph.nodes {
        if index.contains_key(node.id.as_str()) {
            return Err(GraphError::DuplicateNodeId(node.id.clone()));
        }
        index.insert(node.id.as_str(), dag.add_node(node.id.as_str()));
    }

    for edge in &graph.edges {
        let lookup = |id: &str| {
            index.get(id).copied().ok_or_else(|| GraphError::DanglingEdge {
                from: edge.source.clone(),
                to: edge.target.clone(),
                missing: id.to_string(),
            })
        };
        let from = lookup(&edge.source)?;
        let to = lookup(&edge.target)?;
        dag.add_edge(from, to, ());
    }

    for node in &graph.nodes {
        let executor = registry.get(node.kind())?;
        check_templates(node)?;
        executor.validate(node).map_err(|e| GraphError::InvalidNode {
            node_id: node.id.clone(),
            message: e.to_string(),
        })?;
    }

    let entries: Vec<NodeIndex> = dag
        .node_indices()
        .filter(|idx| dag.neighbors_directed(*idx, Direction::Incoming).next().is_none())
        .collect();

    let entry = match entries.as_slice() {
        [] => return Err(GraphError::NoEntryNode),
        [only] => *only,
        many => {
            return Err(GraphError::MultipleEntryNodes(
                many.iter().map(|idx| dag[*idx].to_string()).collect(),
            ))
        }
    };

    let mut reachable = vec![false; dag.node_count()];
    let mut dfs = Dfs::new(&dag, entry);
    while let Some(idx) = dfs.next(&dag) {
        reachable[idx.index()] = true;
    }
    let unreachable: Vec<NodeId> = dag
        .node_indices()
        .filter(|idx| !reachable[idx.index()])
        .map(|idx| dag[idx].to_string())
        .collect();
    if !unreachable.is_empty() {
        tracing::warn!(graph = %graph.name, "Unreachable nodes: {}", unreachable.join(", "));
    }

    let cyclic = is_cyclic_directed(&dag);
    if cyclic {
        tracing::debug!(graph = %graph.name, "Graph contains cycles; relying on the step budget");
    }

    Ok(GraphPlan {
        entry: dag[entry].to_string(),
        cyclic,
        unreachable,
    })
}

fn check_templates(node: &Node) -> Result<(), GraphError> {
    let strings: Vec<Value> = match &node.config {
        NodeConfig::Service(cfg) => {
            let mut values: Vec<Value> = vec![Value::String(cfg.url.clone())];
            values.extend(cfg.headers.values().cloned().map(Value::String));
            values.extend(cfg.body.clone());
            match &cfg.auth {
                Some(AuthConfig::Bearer { token }) => values.push(Value::String(token.clone())),
                Some(AuthConfig::Basic { username, password }) => {
                    values.push(Value::String(username.clone()));
                    values.extend(password.clone().map(Value::String));
                }
                Some(AuthConfig::ApiKey { value, .. }) => values.push(Value::String(value.clone())),
                None => {}
            }
            values
        }
        NodeConfig::Llm(cfg) => {
            let mut values: Vec<Value> = vec![Value::String(cfg.prompt.clone())];
            values.extend(cfg.system.clone().map(Value::String));
            values
        }
        NodeConfig::Workflow(cfg) => {
            let mut values: Vec<Value> = cfg.input_mapping.values().cloned().collect();
            values.extend(cfg.url.clone().map(Value::String));
            values
        }
        NodeConfig::Decision(_) | NodeConfig::Form(_) => Vec::new(),
    };

    strings.iter().try_for_each(check_value).map_err(|e| GraphError::InvalidNode {
        node_id: node.id.clone(),
        message: e.to_string(),
    })
}

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

pub type NodeId = String;

/// Condition string that marks an edge as the failure route of its source.
pub const ERROR_CONDITION: &str = "error";

/// Immutable workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowGraph {
    pub name: String,
    #[serde(default)]
    pub version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl WorkflowGraph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: 0,
            description: None,
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn add_node(&mut self, node: Node) -> NodeId {
        let id = node.id.clone();
        self.nodes.push(node);
        id
    }

    pub fn connect(&mut self, source: impl Into<String>, target: impl Into<String>) {
        self.edges.push(Edge::new(source, target));
    }

    pub fn connect_when(
        &mut self,
        source: impl Into<String>,
        target: impl Into<String>,
        condition: impl Into<String>,
    ) {
        self.edges.push(Edge::new(source, target).with_condition(condition));
    }

    pub fn find_node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Outgoing edges of `id` in declaration order.
    pub fn outgoing<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| e.source == id)
    }

    /// `name@vN`, used when pinning checkpoints.
    pub fn label(&self) -> String {
        format!("{}@v{}", self.name, self.version)
    }
}

/// A node in a workflow graph.
///
/// On the wire a node is `{"id", "kind", "name"?, "config"}`; in memory the
/// kind and its config are one tagged value so every consumer matches
/// exhaustively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawNode", into = "RawNode")]
pub struct Node {
    pub id: NodeId,
    pub name: Option<String>,
    pub config: NodeConfig,
}

impl Node {
    pub fn new(id: impl Into<String>, config: NodeConfig) -> Self {
        Self {
            id: id.into(),
            name: None,
            config,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn kind(&self) -> NodeKind {
        self.config.kind()
    }
}

#[derive(Serialize, Deserialize)]
struct RawNode {
    id: String,
    kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default)]
    config: Value,
}

impl TryFrom<RawNode> for Node {
    type Error = String;

    fn try_from(raw: RawNode) -> Result<Self, Self::Error> {
        // A missing config is an empty one for kinds whose fields are optional.
        let config = if raw.config.is_null() {
            Value::Object(Default::default())
        } else {
            raw.config
        };
        let parsed = match raw.kind {
            NodeKind::Service => serde_json::from_value(config).map(NodeConfig::Service),
            NodeKind::Decision => serde_json::from_value(config).map(NodeConfig::Decision),
            NodeKind::Llm => serde_json::from_value(config).map(NodeConfig::Llm),
            NodeKind::Form => serde_json::from_value(config).map(NodeConfig::Form),
            NodeKind::Workflow => serde_json::from_value(config).map(NodeConfig::Workflow),
        }
        .map_err(|e| format!("invalid {} config for node '{}': {}", raw.kind, raw.id, e))?;

        Ok(Node {
            id: raw.id,
            name: raw.name,
            config: parsed,
        })
    }
}

impl From<Node> for RawNode {
    fn from(node: Node) -> Self {
        let kind = node.kind();
        let config = match node.config {
            NodeConfig::Service(c) => serde_json::to_value(c),
            NodeConfig::Decision(c) => serde_json::to_value(c),
            NodeConfig::Llm(c) => serde_json::to_value(c),
            NodeConfig::Form(c) => serde_json::to_value(c),
            NodeConfig::Workflow(c) => serde_json::to_value(c),
        }
        .unwrap_or(Value::Null);

        RawNode {
            id: node.id,
            kind,
            name: node.name,
            config,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Service,
    Decision,
    Llm,
    Form,
    Workflow,
}

impl NodeKind {
    pub const ALL: [NodeKind; 5] = [
        NodeKind::Service,
        NodeKind::Decision,
        NodeKind::Llm,
        NodeKind::Form,
        NodeKind::Workflow,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Service => "service",
            NodeKind::Decision => "decision",
            NodeKind::Llm => "llm",
            NodeKind::Form => "form",
            NodeKind::Workflow => "workflow",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind-specific node configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeConfig {
    Service(ServiceConfig),
    Decision(DecisionConfig),
    Llm(LlmConfig),
    Form(FormConfig),
    Workflow(SubWorkflowConfig),
}

impl NodeConfig {
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeConfig::Service(_) => NodeKind::Service,
            NodeConfig::Decision(_) => NodeKind::Decision,
            NodeConfig::Llm(_) => NodeKind::Llm,
            NodeConfig::Form(_) => NodeKind::Form,
            NodeConfig::Workflow(_) => NodeKind::Workflow,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthConfig>,
    #[serde(default)]
    pub tls: TlsConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl ServiceConfig {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: method.into(),
            headers: BTreeMap::new(),
            body: None,
            auth: None,
            tls: TlsConfig::default(),
            timeout_ms: None,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_body(mut self, body: impl Into<Value>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn with_retry(mut self, max_retries: u32, retry_delay_ms: u64) -> Self {
        self.retry = RetryPolicy {
            enabled: true,
            max_retries,
            retry_delay_ms,
        };
        self
    }
}

fn default_method() -> String {
    "GET".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthConfig {
    Bearer { token: String },
    Basic { username: String, password: Option<String> },
    ApiKey { header: String, value: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TlsConfig {
    #[serde(default = "default_true")]
    pub verify: bool,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self { verify: true }
    }
}

fn default_true() -> bool {
    true
}

/// Retry policy for service calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
}

impl RetryPolicy {
    /// Total attempts including the first one.
    pub fn attempts(&self) -> u32 {
        if self.enabled {
            self.max_retries.saturating_add(1)
        } else {
            1
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    1000
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    pub model: String,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormConfig {
    /// JSON-Schema-like `{title, type: "object", properties, required}`.
    #[serde(default = "empty_object_schema")]
    pub schema: Value,
}

fn empty_object_schema() -> Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubWorkflowConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph_name: Option<String>,
    /// External workflow endpoint; takes precedence over `graph_name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub input_mapping: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// Directed edge. An absent or blank condition is unconditional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub source: NodeId,
    pub target: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

impl Edge {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            condition: None,
        }
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    /// Trimmed condition, `None` when unconditional.
    pub fn condition(&self) -> Option<&str> {
        self.condition
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }

    pub fn is_failure_edge(&self) -> bool {
        self.condition()
            .is_some_and(|c| c.eq_ignore_ascii_case(ERROR_CONDITION))
    }
}

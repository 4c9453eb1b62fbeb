use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Free-form per-node configuration. Keys are interpreted only by the
/// handler bound to the node's type.
pub type ConfigBag = serde_json::Map<String, serde_json::Value>;

/// Unique execution identifier.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct ExecutionId(pub String);

impl ExecutionId {
    pub fn new() -> Self {
        Self(format!("exec_{}", Uuid::new_v4().simple()))
    }

    pub fn from_str(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Canvas coordinate. Never consulted during execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// Display and configuration data attached to a node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeData {
    #[serde(default)]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<ConfigBag>,
}

/// A typed unit of work in a flow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: NodeData,
    #[serde(default)]
    pub position: Position,
}

impl Node {
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        let kind = kind.into();
        Self {
            id: id.into(),
            data: NodeData {
                label: kind.clone(),
                ..Default::default()
            },
            kind,
            position: Position::default(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.data.label = label.into();
        self
    }

    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.data.config = match config {
            serde_json::Value::Object(map) => Some(map),
            _ => None,
        };
        self
    }

    /// Look up a configuration key.
    pub fn config_value(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.config.as_ref().and_then(|c| c.get(key))
    }

    /// Look up a configuration key as a string.
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config_value(key).and_then(|v| v.as_str())
    }
}

/// A directed edge between two node ids. Ports are opaque.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    #[serde(default)]
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
}

impl Connection {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        let source = source.into();
        let target = target.into();
        Self {
            id: format!("{}-{}", source, target),
            source,
            target,
            source_handle: None,
            target_handle: None,
        }
    }

    pub fn with_handles(
        mut self,
        source_handle: impl Into<String>,
        target_handle: impl Into<String>,
    ) -> Self {
        self.source_handle = Some(source_handle.into());
        self.target_handle = Some(target_handle.into());
        self
    }
}

/// Lifecycle of a single node within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Error,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// Transient run record for one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStep {
    pub node_id: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionStep {
    pub fn pending(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            status: StepStatus::Pending,
            input: None,
            output: None,
            error: None,
        }
    }
}

/// Overall status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Error,
}

/// Top-level record of one run of a graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    pub id: ExecutionId,
    pub flow_id: String,
    pub status: RunStatus,
    pub input: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Execution {
    pub fn start(flow_id: impl Into<String>, input: serde_json::Value) -> Self {
        Self {
            id: ExecutionId::new(),
            flow_id: flow_id.into(),
            status: RunStatus::Running,
            input,
            output: None,
            error: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status != RunStatus::Running
    }
}

/// Options handed to the model service alongside the serialized input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelOptions {
    pub prompt: String,
    pub temperature: f64,
    pub max_tokens: u32,
    /// Every other configuration key, passed through untouched.
    #[serde(flatten)]
    pub extra: ConfigBag,
}

/// Flow event broadcast to all subscribers.
#[derive(Debug, Clone)]
pub enum FlowEvent {
    /// A run started.
    RunStarted {
        execution_id: ExecutionId,
        node_count: usize,
    },
    /// A step changed status.
    StepChanged {
        execution_id: ExecutionId,
        step: ExecutionStep,
    },
    /// A run finished successfully.
    RunCompleted {
        execution_id: ExecutionId,
        output: Option<serde_json::Value>,
    },
    /// A run finished with an error.
    RunFailed {
        execution_id: ExecutionId,
        error: String,
    },
}

impl FlowEvent {
    pub fn execution_id(&self) -> &ExecutionId {
        match self {
            Self::RunStarted { execution_id, .. }
            | Self::StepChanged { execution_id, .. }
            | Self::RunCompleted { execution_id, .. }
            | Self::RunFailed { execution_id, .. } => execution_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::RunCompleted { .. } | Self::RunFailed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn node_deserializes_from_canvas_shape() {
        let node: Node = serde_json::from_value(json!({
            "id": "llm-1",
            "type": "llm",
            "data": {
                "label": "Generate Response",
                "config": { "temperature": 0.2 }
            },
            "position": { "x": 700, "y": 100 }
        }))
        .unwrap();

        assert_eq!(node.kind, "llm");
        assert_eq!(node.data.label, "Generate Response");
        assert_eq!(node.config_value("temperature"), Some(&json!(0.2)));
        assert_eq!(node.position, Position { x: 700.0, y: 100.0 });
    }

    #[test]
    fn connection_uses_camel_case_handles() {
        let conn = Connection::new("a", "b").with_handles("out", "in");
        let value = serde_json::to_value(&conn).unwrap();
        assert_eq!(value["sourceHandle"], "out");
        assert_eq!(value["targetHandle"], "in");
    }

    #[test]
    fn step_serializes_status_lowercase() {
        let step = ExecutionStep::pending("n1");
        let value = serde_json::to_value(&step).unwrap();
        assert_eq!(value, json!({ "nodeId": "n1", "status": "pending" }));
    }

    #[test]
    fn execution_starts_running() {
        let exec = Execution::start("flow_1", json!("hi"));
        assert_eq!(exec.status, RunStatus::Running);
        assert!(exec.id.0.starts_with("exec_"));
        assert!(!exec.is_finished());

        let value = serde_json::to_value(&exec).unwrap();
        assert_eq!(value["flowId"], "flow_1");
        assert!(value.get("createdAt").is_some());
        assert!(value.get("output").is_none());
    }

    #[test]
    fn model_options_flatten_extra_keys() {
        let mut extra = ConfigBag::new();
        extra.insert("topK".into(), json!(40));
        let opts = ModelOptions {
            prompt: "p".into(),
            temperature: 0.7,
            max_tokens: 1024,
            extra,
        };
        let value = serde_json::to_value(&opts).unwrap();
        assert_eq!(value["maxTokens"], 1024);
        assert_eq!(value["topK"], 40);
    }
}

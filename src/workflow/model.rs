//! Workflow Data Model
//!
//! Core data structures describing a workflow graph and the records an
//! execution produces for it.
//!
//! # Example JSON Format
//!
//! ```json
//! {
//!   "nodes": [
//!     { "id": "trigger", "kind": "trigger", "label": "Start",
//!       "config": { "triggerType": "Manual" } },
//!     { "id": "fetch", "kind": "action", "label": "Fetch",
//!       "config": { "actionType": "HTTP Request",
//!                   "endpoint": "https://example.com/{{@trigger:Start.path}}" } }
//!   ],
//!   "edges": [
//!     { "id": "e1", "source": "trigger", "target": "fetch" }
//!   ]
//! }
//! ```

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Configuration mapping attached to a node.
pub type ConfigMap = Map<String, Value>;

/// Configuration key naming the action type of an action node.
pub const ACTION_TYPE_KEY: &str = "actionType";

/// Configuration key naming the trigger type of a trigger node.
pub const TRIGGER_TYPE_KEY: &str = "triggerType";

/// Replaces every character that is not an ASCII letter or digit with `_`.
///
/// Outputs are keyed by the sanitized id so that template references can
/// name them with a restricted character set.
///
/// ```
/// use nodeflow::workflow::model::sanitize_node_id;
///
/// assert_eq!(sanitize_node_id("node-1.a"), "node_1_a");
/// ```
pub fn sanitize_node_id(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Kind of a workflow node.
///
/// Unrecognized kinds are kept verbatim so the engine can report them
/// instead of refusing the whole definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeKind {
    Trigger,
    Action,
    Other(String),
}

impl NodeKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Trigger => "trigger",
            Self::Action => "action",
            Self::Other(kind) => kind,
        }
    }
}

impl From<String> for NodeKind {
    fn from(kind: String) -> Self {
        match kind.as_str() {
            "trigger" => Self::Trigger,
            "action" => Self::Action,
            _ => Self::Other(kind),
        }
    }
}

impl From<NodeKind> for String {
    fn from(kind: NodeKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single node of a workflow graph.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Node {
    /// Unique identifier within the graph
    pub id: String,

    /// Trigger or action
    #[serde(alias = "type")]
    pub kind: NodeKind,

    /// Display label, also used in template references
    #[serde(default)]
    pub label: String,

    /// Step configuration (action type, step fields, templates)
    #[serde(default)]
    pub config: ConfigMap,

    /// Disabled nodes are skipped but still pass control to their successors
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl Node {
    /// Creates an enabled node with an empty configuration.
    pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            kind,
            label: String::new(),
            config: ConfigMap::new(),
            enabled: true,
        }
    }

    /// Creates a trigger node.
    pub fn trigger(id: impl Into<String>) -> Self {
        Self::new(id, NodeKind::Trigger)
    }

    /// Creates an action node running the given action type.
    ///
    /// ```
    /// use nodeflow::workflow::Node;
    ///
    /// let node = Node::action("fetch", "HTTP Request")
    ///     .with_label("Fetch")
    ///     .with_config("endpoint", "https://example.com");
    /// assert_eq!(node.action_type(), Some("HTTP Request"));
    /// ```
    pub fn action(id: impl Into<String>, action_type: impl Into<String>) -> Self {
        let action_type: String = action_type.into();
        Self::new(id, NodeKind::Action).with_config(ACTION_TYPE_KEY, action_type)
    }

    /// Sets the display label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Sets one configuration entry.
    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    /// Marks the node as disabled.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Configured action type, if any. Empty strings count as missing.
    pub fn action_type(&self) -> Option<&str> {
        self.config
            .get(ACTION_TYPE_KEY)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Configured trigger type, if any.
    pub fn trigger_type(&self) -> Option<&str> {
        self.config
            .get(TRIGGER_TYPE_KEY)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Label, or the id when no label was authored.
    pub fn display_label(&self) -> &str {
        if self.label.is_empty() {
            &self.id
        } else {
            &self.label
        }
    }

    /// Id used as the key of this node's output.
    pub fn sanitized_id(&self) -> String {
        sanitize_node_id(&self.id)
    }
}

/// A directed dependency between two nodes.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    #[serde(default)]
    pub id: String,
    pub source: String,
    pub target: String,
}

impl Edge {
    /// Creates an edge with an id derived from its endpoints.
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        let source = source.into();
        let target = target.into();
        Self {
            id: format!("{}->{}", source, target),
            source,
            target,
        }
    }
}

/// Everything one run needs. Read-only while the run is in progress.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionInput {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_input: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,
}

impl ExecutionInput {
    pub fn new(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        Self {
            nodes,
            edges,
            ..Self::default()
        }
    }

    pub fn with_trigger_input(mut self, input: Value) -> Self {
        self.trigger_input = Some(input);
        self
    }

    pub fn with_execution_id(mut self, id: impl Into<String>) -> Self {
        self.execution_id = Some(id.into());
        self
    }

    pub fn with_workflow_id(mut self, id: impl Into<String>) -> Self {
        self.workflow_id = Some(id.into());
        self
    }
}

/// Data produced by a node, keyed by its sanitized id in the output map.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NodeOutput {
    pub label: String,
    pub data: Value,
}

/// Outputs of a run keyed by sanitized node id.
pub type OutputMap = HashMap<String, NodeOutput>;

/// Terminal state of one executed node.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NodeResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl NodeResult {
    pub fn succeeded(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

/// Per-invocation context handed to every step.
///
/// Carries identifiers only; credentials never travel through it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct StepContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<String>,
    pub node_id: String,
    pub node_name: String,
    /// Node kind for triggers, action type for actions
    pub node_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loop_iteration: Option<usize>,
}

/// A workflow as authored: nodes, edges and optional identity.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct WorkflowDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl WorkflowDefinition {
    pub fn new(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        Self {
            nodes,
            edges,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Builds the input of one run; the workflow id is the definition id.
    pub fn into_input(
        self,
        trigger_input: Option<Value>,
        execution_id: Option<String>,
    ) -> ExecutionInput {
        ExecutionInput {
            nodes: self.nodes,
            edges: self.edges,
            trigger_input,
            execution_id,
            workflow_id: self.id,
        }
    }
}

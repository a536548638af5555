//! Shared state of one run.
//!
//! Every branch of the traversal holds an `Arc<ExecutionContext>`: the graph
//! is read-only, while results, outputs and the timeline sit behind locks
//! that are only held for a single read or write.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{Mutex, RwLock};

use crate::monitoring::{EventType, ExecutionTimeline};
use crate::workflow::graph::{build_adjacency, root_triggers, Adjacency};
use crate::workflow::model::{ExecutionInput, Node, NodeOutput, NodeResult, OutputMap};

use super::aggregator::{ExecutionResult, ResultBook};

pub struct ExecutionContext {
    nodes: HashMap<String, Node>,
    roots: Vec<String>,
    adjacency: Adjacency,
    trigger_input: Option<Value>,
    execution_id: Option<String>,
    workflow_id: Option<String>,
    results: Mutex<ResultBook>,
    outputs: RwLock<OutputMap>,
    timeline: Option<Mutex<ExecutionTimeline>>,
}

impl ExecutionContext {
    pub fn new(input: ExecutionInput, record_timeline: bool) -> Self {
        let adjacency = build_adjacency(&input.nodes, &input.edges);

        let mut roots = root_triggers(&input.nodes, &adjacency);
        let mut seen = HashSet::new();
        roots.retain(|id| seen.insert(id.clone()));

        let nodes = input
            .nodes
            .into_iter()
            .map(|node| (node.id.clone(), node))
            .collect();

        Self {
            nodes,
            roots,
            adjacency,
            trigger_input: input.trigger_input,
            execution_id: input.execution_id,
            workflow_id: input.workflow_id,
            results: Mutex::new(ResultBook::new()),
            outputs: RwLock::new(OutputMap::new()),
            timeline: record_timeline.then(|| Mutex::new(ExecutionTimeline::new())),
        }
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Trigger nodes the run starts from.
    pub fn roots(&self) -> &[String] {
        &self.roots
    }

    pub fn adjacency(&self) -> &Adjacency {
        &self.adjacency
    }

    pub fn trigger_input(&self) -> Option<&Value> {
        self.trigger_input.as_ref()
    }

    pub fn execution_id(&self) -> Option<&str> {
        self.execution_id.as_deref()
    }

    pub fn workflow_id(&self) -> Option<&str> {
        self.workflow_id.as_deref()
    }

    pub async fn record(&self, node_id: &str, result: NodeResult) {
        self.results.lock().await.record(node_id, result);
    }

    pub async fn set_output(&self, sanitized_id: String, output: NodeOutput) {
        self.outputs.write().await.insert(sanitized_id, output);
    }

    /// Copy of the outputs produced so far.
    pub async fn outputs_snapshot(&self) -> OutputMap {
        self.outputs.read().await.clone()
    }

    pub async fn timeline_event(&self, node_id: &str, event_type: EventType) {
        if let Some(timeline) = &self.timeline {
            timeline.lock().await.add_event(node_id, event_type);
        }
    }

    /// Moves the collected state out into the run result.
    pub async fn finish(&self) -> ExecutionResult {
        let results = std::mem::take(&mut *self.results.lock().await);
        let outputs = std::mem::take(&mut *self.outputs.write().await);
        let timeline = match &self.timeline {
            Some(timeline) => Some(timeline.lock().await.clone()),
            None => None,
        };
        ExecutionResult::aggregate(results, outputs, timeline)
    }
}

/// Nodes already entered on a traversal.
///
/// Clones share the same set; branches fanned out from one node see each
/// other's visits.
#[derive(Debug, Clone, Default)]
pub struct VisitedSet(Arc<Mutex<HashSet<String>>>);

impl VisitedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh set already containing `node_id`.
    pub fn seeded(node_id: &str) -> Self {
        let mut set = HashSet::new();
        set.insert(node_id.to_string());
        Self(Arc::new(Mutex::new(set)))
    }

    /// Marks a node visited. Returns false if it already was.
    pub async fn insert(&self, node_id: &str) -> bool {
        self.0.lock().await.insert(node_id.to_string())
    }
}

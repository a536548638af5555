//! Execution Aggregator
//!
//! Collects node results in the order nodes first finished and folds them
//! into the run's overall outcome.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;

use crate::monitoring::ExecutionTimeline;
use crate::workflow::model::{NodeResult, OutputMap};

use super::hooks::{CompletionRecord, ExecutionStatus};

/// Node results keyed by raw node id.
///
/// Re-recording a node (a loop body on a later batch) replaces its result
/// but keeps the position it was first recorded at.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultBook {
    entries: Vec<(String, NodeResult)>,
    index: HashMap<String, usize>,
}

impl ResultBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, node_id: &str, result: NodeResult) {
        match self.index.get(node_id) {
            Some(&i) => self.entries[i].1 = result,
            None => {
                self.index.insert(node_id.to_string(), self.entries.len());
                self.entries.push((node_id.to_string(), result));
            }
        }
    }

    pub fn get(&self, node_id: &str) -> Option<&NodeResult> {
        self.index.get(node_id).map(|&i| &self.entries[i].1)
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.index.contains_key(node_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &NodeResult)> {
        self.entries.iter().map(|(id, r)| (id.as_str(), r))
    }

    /// True when every recorded result succeeded (vacuously for none).
    pub fn all_succeeded(&self) -> bool {
        self.entries.iter().all(|(_, r)| r.success)
    }

    /// Error of the first failed result.
    pub fn first_error(&self) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, r)| !r.success)
            .and_then(|(_, r)| r.error.as_deref())
    }

    /// Data of the most recently added node.
    pub fn last_output(&self) -> Option<&Value> {
        self.entries.last().and_then(|(_, r)| r.data.as_ref())
    }
}

impl Serialize for ResultBook {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (id, result) in &self.entries {
            map.serialize_entry(id, result)?;
        }
        map.end()
    }
}

/// What a run returns.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub results: ResultBook,
    pub outputs: OutputMap,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Node timings, when timeline recording was enabled
    #[serde(skip)]
    pub timeline: Option<ExecutionTimeline>,
}

impl ExecutionResult {
    /// Folds recorded results and outputs into the run outcome.
    pub fn aggregate(
        results: ResultBook,
        outputs: OutputMap,
        timeline: Option<ExecutionTimeline>,
    ) -> Self {
        let success = results.all_succeeded();
        let error = results.first_error().map(str::to_string);
        Self {
            success,
            results,
            outputs,
            error,
            timeline,
        }
    }

    /// Completion record handed to the hook of a run with an execution id.
    pub fn completion_record(
        &self,
        execution_id: &str,
        workflow_id: Option<&str>,
        start_time: DateTime<Utc>,
    ) -> CompletionRecord {
        CompletionRecord {
            execution_id: execution_id.to_string(),
            workflow_id: workflow_id.map(str::to_string),
            status: if self.success {
                ExecutionStatus::Success
            } else {
                ExecutionStatus::Error
            },
            output: self.results.last_output().cloned(),
            error: self.error.clone(),
            start_time,
            end_time: Utc::now(),
        }
    }
}

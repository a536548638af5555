//! Execution Timeline
//!
//! Tracks node start/end times of a run for timing reports and Gantt
//! charts. Nodes inside a loop body run once per batch, so a node id can
//! own several spans.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Type of timeline event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    /// Node started executing
    Started,
    /// Node finished with a successful result
    Completed,
    /// Node finished with a failed result
    Failed,
    /// Node was disabled and passed control on without running
    Skipped,
}

/// A single event in the execution timeline.
#[derive(Debug, Clone)]
pub struct TimelineEvent {
    pub node_id: String,
    pub event_type: EventType,
    pub timestamp: Instant,
}

/// One execution of a node, in milliseconds since the run started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSpan {
    pub node_id: String,
    pub start_ms: u128,
    pub end_ms: u128,
    pub failed: bool,
}

impl NodeSpan {
    pub fn duration_ms(&self) -> u128 {
        self.end_ms.saturating_sub(self.start_ms)
    }
}

/// Tracks the execution timeline of a run.
#[derive(Debug, Clone)]
pub struct ExecutionTimeline {
    events: Vec<TimelineEvent>,
    start_time: Instant,
}

impl ExecutionTimeline {
    /// Creates a new timeline starting now.
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            start_time: Instant::now(),
        }
    }

    /// Records an event for a node.
    pub fn add_event(&mut self, node_id: impl Into<String>, event_type: EventType) {
        self.events.push(TimelineEvent {
            node_id: node_id.into(),
            event_type,
            timestamp: Instant::now(),
        });
    }

    pub fn events(&self) -> &[TimelineEvent] {
        &self.events
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    fn offset_ms(&self, at: Instant) -> u128 {
        at.duration_since(self.start_time).as_millis()
    }

    /// Pairs every start with the next finish of the same node.
    pub fn spans(&self) -> Vec<NodeSpan> {
        let mut open: HashMap<&str, Vec<u128>> = HashMap::new();
        let mut spans = Vec::new();

        for event in &self.events {
            let at = self.offset_ms(event.timestamp);
            match event.event_type {
                EventType::Started => open.entry(&event.node_id).or_default().push(at),
                EventType::Completed | EventType::Failed => {
                    if let Some(start) = open.get_mut(event.node_id.as_str()).and_then(Vec::pop) {
                        spans.push(NodeSpan {
                            node_id: event.node_id.clone(),
                            start_ms: start,
                            end_ms: at,
                            failed: event.event_type == EventType::Failed,
                        });
                    }
                }
                EventType::Skipped => {}
            }
        }

        spans.sort_by_key(|s| s.start_ms);
        spans
    }

    /// Ids of nodes that were skipped, in the order they were reached.
    pub fn skipped(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = Vec::new();
        for event in &self.events {
            if event.event_type == EventType::Skipped && !ids.contains(&event.node_id.as_str()) {
                ids.push(&event.node_id);
            }
        }
        ids
    }

    /// Total time spent in each node across all of its runs.
    pub fn durations(&self) -> HashMap<String, u128> {
        let mut durations: HashMap<String, u128> = HashMap::new();
        for span in self.spans() {
            *durations.entry(span.node_id.clone()).or_default() += span.duration_ms();
        }
        durations
    }

    /// Generates an ASCII Gantt chart, one row per node run.
    ///
    /// Failed runs are drawn with `x`, successful ones with `#`.
    pub fn gantt_chart(&self) -> String {
        let mut output = String::from("\nExecution Timeline:\n\n");

        let spans = self.spans();
        let total_time = spans
            .iter()
            .map(|s| s.end_ms)
            .max()
            .unwrap_or(0)
            .max(self.elapsed().as_millis());

        // Scale to 50 characters width
        let scale = if total_time == 0 {
            0.0
        } else {
            50.0 / total_time as f64
        };

        for span in &spans {
            let start_pos = (span.start_ms as f64 * scale) as usize;
            let width = ((span.duration_ms() as f64 * scale).max(1.0)) as usize;
            let mark = if span.failed { "x" } else { "#" };

            output.push_str(&format!(
                "{:12} |{}{}| ({} ms)\n",
                truncate(&span.node_id, 12),
                " ".repeat(start_pos),
                mark.repeat(width),
                span.duration_ms()
            ));
        }

        let skipped = self.skipped();
        if !skipped.is_empty() {
            output.push_str(&format!("\nSkipped: {}\n", skipped.join(", ")));
        }
        output.push_str(&format!("\nTotal: {} ms\n", total_time));
        output
    }
}

impl Default for ExecutionTimeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Pads or cuts a label to exactly `max_len` characters.
fn truncate(s: &str, max_len: usize) -> String {
    let count = s.chars().count();
    if count <= max_len {
        format!("{:width$}", s, width = max_len)
    } else {
        let kept: String = s.chars().take(max_len - 3).collect();
        format!("{}...", kept)
    }
}

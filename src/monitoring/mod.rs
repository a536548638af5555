//! Run Monitoring Module
//!
//! - [`ExecutionTimeline`]: per-node start/end timing for Gantt charts

pub mod timeline;

pub use timeline::{EventType, ExecutionTimeline, NodeSpan, TimelineEvent};

//! Workflow Definition Module
//!
//! Data structures for workflow graphs and the tools to load and check
//! them.
//!
//! # Structure
//!
//! - [`model`]: Nodes, edges and execution records
//! - [`graph`]: Adjacency maps and root trigger discovery
//! - [`parser`]: YAML/JSON loading
//! - [`validator`]: Non-fatal definition checks

pub mod graph;
pub mod model;
pub mod parser;
pub mod validator;

pub use graph::{build_adjacency, find_root_triggers, Adjacency};
pub use model::{
    Edge, ExecutionInput, Node, NodeKind, NodeOutput, NodeResult, OutputMap, StepContext,
    WorkflowDefinition,
};
pub use parser::{load_workflow, parse_workflow};
pub use validator::{validate_workflow, ValidationWarning};

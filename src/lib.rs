//! Nodeflow - Graph Workflow Execution Engine
//!
//! Executes automation workflows drawn as directed graphs of trigger and
//! action nodes. Actions call pluggable steps; data flows between nodes
//! through `{{@nodeId:Label.field}}` template references.
//!
//! # Architecture
//!
//! The library is organized into six modules:
//!
//! - [`workflow`]: Graph model and definition loading
//! - [`execution`]: Node executor, step dispatch and result aggregation
//! - [`expression`]: The restricted condition expression language
//! - [`steps`]: Built-in steps (condition, loop, switch, HTTP request)
//! - [`monitoring`]: Execution timeline
//! - [`error`]: Engine error taxonomy
//!
//! # Example
//!
//! ```rust,no_run
//! use nodeflow::execution::Engine;
//! use nodeflow::load_workflow;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Load a workflow from YAML or JSON
//!     let workflow = load_workflow("workflow.yaml")?;
//!
//!     // Run it once with a trigger payload
//!     let engine = Engine::with_builtins();
//!     let input = workflow.into_input(Some(json!({ "user": "ada" })), None);
//!     let result = engine.run(input).await;
//!
//!     println!("{}", serde_json::to_string_pretty(&result)?);
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod execution;
pub mod expression;
pub mod monitoring;
pub mod steps;
pub mod workflow;

// Re-export commonly used types
pub use error::EngineError;
pub use execution::engine::Engine;
pub use execution::ExecutionResult;
pub use workflow::model::{Edge, ExecutionInput, Node, WorkflowDefinition};
pub use workflow::parser::load_workflow;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "nodeflow";

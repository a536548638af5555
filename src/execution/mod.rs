//! Workflow Execution Module
//!
//! Runs a workflow graph from its root triggers and collects per-node
//! results and outputs.
//!
//! # Architecture
//!
//! - [`engine`]: Node executor driving the traversal
//! - [`context`]: Shared per-run state and visited sets
//! - [`dispatcher`]: Step registry and action-type dispatch
//! - [`template`]: `{{@nodeId:Label.field}}` reference resolution
//! - [`condition`]: Condition evaluation against upstream outputs
//! - [`aggregator`]: Folding node results into the run outcome
//! - [`hooks`]: Trigger and completion callbacks
//! - [`step`]: The step contract

pub mod aggregator;
pub mod condition;
pub mod context;
pub mod dispatcher;
pub mod engine;
pub mod hooks;
pub mod step;
pub mod template;

pub use aggregator::{ExecutionResult, ResultBook};
pub use dispatcher::{Dispatcher, Plugin, StepDescriptor, StepRegistry};
pub use engine::Engine;
pub use hooks::{
    CompletionRecord, ExecutionHook, ExecutionStatus, HookEvent, LoggingHook, StateFileHook,
    TriggerNotice,
};
pub use step::{step_fn, StepHandler, StepInput};

//! Engine error taxonomy.
//!
//! Every variant that can occur while a node runs is turned into a failed
//! [`NodeResult`](crate::workflow::NodeResult) using its `Display` text; a
//! run as a whole never returns one of these.

use thiserror::Error;

/// Error type returned by step implementations and hooks.
pub type StepError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Action node without an action type.
    #[error("Action node \"{node}\" has no action type configured")]
    Configuration { node: String },

    /// Condition expression rejected by the expression grammar.
    #[error("Invalid condition expression: {0}")]
    Validation(String),

    #[error(
        "Unknown action type: \"{action_type}\". This action is not registered in the plugin system. Available system actions: {available}."
    )]
    UnknownAction {
        action_type: String,
        available: String,
    },

    #[error(
        "Step function \"{function}\" not found in module for action \"{action_type}\". Check that the plugin exports the correct function name."
    )]
    StepExport {
        function: String,
        action_type: String,
    },

    #[error("{0}")]
    StepExecution(String),

    #[error("Unknown node type \"{kind}\" in node \"{node}\". Expected \"trigger\" or \"action\".")]
    UnknownNodeKind { kind: String, node: String },

    #[error("Hook failed: {0}")]
    Hook(String),

    #[error("Failed to load workflow definition: {0}")]
    Definition(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;

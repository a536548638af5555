//! Workflow Parser
//!
//! Loads workflow definitions from YAML or JSON files. JSON is read
//! through the YAML parser, so either format works with any extension.

use std::fs;
use std::path::Path;

use log::{debug, info, warn};

use crate::error::EngineError;

use super::model::WorkflowDefinition;
use super::validator::validate_workflow;

/// Loads a workflow definition from a file.
///
/// Validation problems are logged as warnings and never fail the load.
///
/// # Example
///
/// ```rust,no_run
/// use nodeflow::workflow::load_workflow;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let workflow = load_workflow("workflow.yaml")?;
///     println!("Loaded {} nodes", workflow.nodes.len());
///     Ok(())
/// }
/// ```
pub fn load_workflow(path: impl AsRef<Path>) -> Result<WorkflowDefinition, EngineError> {
    let path = path.as_ref();
    info!("Loading workflow from: {}", path.display());

    let content = fs::read_to_string(path).map_err(|e| {
        EngineError::Definition(format!(
            "cannot read '{}': {}. Check that the file exists and is readable.",
            path.display(),
            e
        ))
    })?;
    debug!("Workflow file loaded ({} bytes)", content.len());

    parse_workflow(&content)
}

/// Parses a workflow definition from YAML or JSON text.
pub fn parse_workflow(content: &str) -> Result<WorkflowDefinition, EngineError> {
    let workflow: WorkflowDefinition = serde_yaml::from_str(content)
        .map_err(|e| EngineError::Definition(format!("invalid workflow document: {}", e)))?;

    info!(
        "Parsed workflow {}: {} nodes, {} edges",
        workflow.name.as_deref().or(workflow.id.as_deref()).unwrap_or("(unnamed)"),
        workflow.nodes.len(),
        workflow.edges.len()
    );

    for warning in validate_workflow(&workflow) {
        warn!("{}", warning);
    }

    Ok(workflow)
}

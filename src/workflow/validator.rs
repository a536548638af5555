//! Workflow Validation
//!
//! Non-fatal checks over a workflow definition:
//! - Duplicate node ids
//! - Edges pointing at unknown nodes
//! - Distinct ids that collide once sanitized
//! - Action nodes without an action type
//! - Missing root trigger
//!
//! The engine tolerates every one of these; they are reported so authors
//! can spot definitions that will not behave as drawn.

use std::collections::{HashMap, HashSet};

use log::{debug, info};

use super::graph::find_root_triggers;
use super::model::{sanitize_node_id, NodeKind, WorkflowDefinition};

/// Problems found in a definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationWarning {
    EmptyWorkflow,
    DuplicateNodeId(String),
    DanglingEdge {
        edge: String,
        missing: String,
    },
    SanitizedIdCollision {
        sanitized: String,
        ids: Vec<String>,
    },
    MissingActionType(String),
    NoRootTrigger,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyWorkflow => write!(f, "Workflow has no nodes"),
            Self::DuplicateNodeId(id) => write!(f, "Duplicate node ID: '{}'", id),
            Self::DanglingEdge { edge, missing } => {
                write!(f, "Edge '{}' references unknown node '{}'", edge, missing)
            }
            Self::SanitizedIdCollision { sanitized, ids } => write!(
                f,
                "Node IDs {} share the output key '{}'; their outputs overwrite each other",
                ids.join(", "),
                sanitized
            ),
            Self::MissingActionType(id) => {
                write!(f, "Action node '{}' has no action type configured", id)
            }
            Self::NoRootTrigger => write!(
                f,
                "Workflow has no trigger without incoming edges; nothing will run"
            ),
        }
    }
}

/// Checks a definition and returns every warning found.
pub fn validate_workflow(def: &WorkflowDefinition) -> Vec<ValidationWarning> {
    info!(
        "Validating workflow with {} nodes and {} edges",
        def.nodes.len(),
        def.edges.len()
    );

    let mut warnings = Vec::new();
    if def.is_empty() {
        warnings.push(ValidationWarning::EmptyWorkflow);
        return warnings;
    }

    let mut seen: HashSet<&str> = HashSet::new();
    for node in &def.nodes {
        if !seen.insert(&node.id) {
            warnings.push(ValidationWarning::DuplicateNodeId(node.id.clone()));
        }
        if node.kind == NodeKind::Action && node.action_type().is_none() {
            warnings.push(ValidationWarning::MissingActionType(node.id.clone()));
        }
    }

    for edge in &def.edges {
        for endpoint in [&edge.source, &edge.target] {
            if !seen.contains(endpoint.as_str()) {
                warnings.push(ValidationWarning::DanglingEdge {
                    edge: edge.id.clone(),
                    missing: endpoint.clone(),
                });
            }
        }
    }

    let mut by_key: HashMap<String, Vec<String>> = HashMap::new();
    for id in &seen {
        by_key
            .entry(sanitize_node_id(id))
            .or_default()
            .push(id.to_string());
    }
    let mut collisions: Vec<ValidationWarning> = by_key
        .into_iter()
        .filter(|(_, ids)| ids.len() > 1)
        .map(|(sanitized, mut ids)| {
            ids.sort();
            ValidationWarning::SanitizedIdCollision { sanitized, ids }
        })
        .collect();
    collisions.sort_by(|a, b| a.to_string().cmp(&b.to_string()));
    warnings.extend(collisions);

    let roots = find_root_triggers(&def.nodes, &def.edges);
    if roots.is_empty() {
        warnings.push(ValidationWarning::NoRootTrigger);
    } else {
        debug!("Root triggers: {:?}", roots);
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::model::{Edge, Node};

    fn def(nodes: Vec<Node>, edges: Vec<Edge>) -> WorkflowDefinition {
        WorkflowDefinition::new(nodes, edges)
    }

    #[test]
    fn test_valid_workflow_has_no_warnings() {
        let workflow = def(
            vec![Node::trigger("t"), Node::action("a", "HTTP Request")],
            vec![Edge::new("t", "a")],
        );
        assert!(validate_workflow(&workflow).is_empty());
    }

    #[test]
    fn test_empty_workflow() {
        assert_eq!(
            validate_workflow(&WorkflowDefinition::default()),
            vec![ValidationWarning::EmptyWorkflow]
        );
    }

    #[test]
    fn test_duplicate_ids() {
        let workflow = def(vec![Node::trigger("t"), Node::trigger("t")], vec![]);
        let warnings = validate_workflow(&workflow);
        assert!(warnings.contains(&ValidationWarning::DuplicateNodeId("t".to_string())));
    }

    #[test]
    fn test_dangling_edge() {
        let workflow = def(vec![Node::trigger("t")], vec![Edge::new("t", "ghost")]);
        let warnings = validate_workflow(&workflow);
        assert_eq!(
            warnings,
            vec![ValidationWarning::DanglingEdge {
                edge: "t->ghost".to_string(),
                missing: "ghost".to_string(),
            }]
        );
    }

    #[test]
    fn test_sanitized_collision() {
        let workflow = def(
            vec![
                Node::trigger("t"),
                Node::action("node-1", "X"),
                Node::action("node.1", "X"),
            ],
            vec![],
        );
        let warnings = validate_workflow(&workflow);
        let collision = ValidationWarning::SanitizedIdCollision {
            sanitized: "node_1".to_string(),
            ids: vec!["node-1".to_string(), "node.1".to_string()],
        };
        assert!(warnings.contains(&collision));
        assert!(collision.to_string().contains("'node_1'"));
    }

    #[test]
    fn test_missing_action_type_and_no_root() {
        let workflow = def(
            vec![
                Node::trigger("t"),
                Node::new("a", NodeKind::Action),
            ],
            vec![Edge::new("a", "t")],
        );
        let warnings = validate_workflow(&workflow);
        assert!(warnings.contains(&ValidationWarning::MissingActionType("a".to_string())));
        assert!(warnings.contains(&ValidationWarning::NoRootTrigger));
    }
}

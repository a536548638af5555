//! Condition Evaluator
//!
//! Evaluates a Condition node's expression against the outputs produced so
//! far. Reference tokens are never spliced into the expression text: each
//! one is replaced by a generated variable name and its resolved value is
//! bound to that variable.

use std::collections::HashSet;

use log::{debug, error};
use regex::Captures;
use serde_json::{Map, Value as JsonValue};

use crate::error::EngineError;
use crate::expression::{self, Bindings, Scope, Value, REFERENCE_PATTERN};
use crate::workflow::model::OutputMap;

use super::template::{lookup_field, Reference};

/// Outcome of a condition evaluation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConditionOutcome {
    pub result: bool,
    /// Resolved reference values keyed by the token's `Label.field` text
    pub resolved_values: Map<String, JsonValue>,
}

impl ConditionOutcome {
    fn rejected() -> Self {
        Self::default()
    }
}

/// Evaluates a condition. Never fails: every error yields `false`.
pub fn evaluate_condition(condition: Option<&JsonValue>, outputs: &OutputMap) -> ConditionOutcome {
    match condition {
        Some(JsonValue::Bool(b)) => ConditionOutcome {
            result: *b,
            resolved_values: Map::new(),
        },
        Some(JsonValue::String(source)) => match evaluate_expression(source, outputs) {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Condition rejected: {} (expression: {})", e, source);
                ConditionOutcome::rejected()
            }
        },
        other => ConditionOutcome {
            result: Value::from_json(other).truthy(),
            resolved_values: Map::new(),
        },
    }
}

fn evaluate_expression(source: &str, outputs: &OutputMap) -> Result<ConditionOutcome, EngineError> {
    expression::parse(source, Scope::References).map_err(validation)?;

    let mut bindings = Bindings::new();
    let mut resolved_values = Map::new();
    let substituted = REFERENCE_PATTERN.replace_all(source, |caps: &Captures| {
        let token = caps[0].to_string();
        let Some(reference) = Reference::from_captures(caps) else {
            return token;
        };
        // Left in place so the re-validation below rejects it
        let Some(output) = reference.output(outputs) else {
            debug!("No output for node '{}' referenced by condition", reference.node_id);
            return token;
        };

        let value = match reference.field_path {
            None => Value::from_json(Some(&output.data)),
            Some(_) if output.data.is_null() => Value::Undefined,
            Some(path) => Value::from_json(lookup_field(&output.data, path).as_ref()),
        };

        let name = format!("__v{}", bindings.len());
        resolved_values.insert(reference.display.to_string(), value.to_json());
        bindings.insert(name.clone(), value);
        name
    });

    let declared: HashSet<String> = bindings.keys().cloned().collect();
    let expr = expression::parse(&substituted, Scope::Variables(&declared)).map_err(validation)?;
    let value = expression::evaluate(&expr, &bindings).map_err(validation)?;

    debug!("Condition '{}' evaluated to {:?}", substituted, value);
    Ok(ConditionOutcome {
        result: value.truthy(),
        resolved_values,
    })
}

fn validation(e: expression::ExpressionError) -> EngineError {
    EngineError::Validation(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::model::NodeOutput;
    use serde_json::json;

    fn outputs(entries: Vec<(&str, JsonValue)>) -> OutputMap {
        entries
            .into_iter()
            .map(|(id, data)| {
                (
                    id.to_string(),
                    NodeOutput {
                        label: id.to_string(),
                        data,
                    },
                )
            })
            .collect()
    }

    fn eval(source: &str, outs: &OutputMap) -> ConditionOutcome {
        evaluate_condition(Some(&json!(source)), outs)
    }

    #[test]
    fn test_boolean_literal_short_circuits() {
        let outs = outputs(vec![]);
        assert!(evaluate_condition(Some(&json!(true)), &outs).result);
        assert!(!evaluate_condition(Some(&json!(false)), &outs).result);
        assert!(!evaluate_condition(None, &outs).result);
    }

    #[test]
    fn test_reference_comparison() {
        let outs = outputs(vec![("fetch_1", json!({ "status": 200 }))]);
        let outcome = eval("{{@fetch-1:Fetch.status}} === 200", &outs);
        assert!(outcome.result);
        assert_eq!(outcome.resolved_values["Fetch.status"], json!(200));
    }

    #[test]
    fn test_wrapped_output_unwraps() {
        let outs = outputs(vec![("a", json!({ "success": true, "data": { "count": 3 } }))]);
        assert!(eval("{{@a:A.count}} > 2 && {{@a:A.success}}", &outs).result);
    }

    #[test]
    fn test_string_methods_on_reference() {
        let outs = outputs(vec![("a", json!({ "email": "Ann@Example.com" }))]);
        assert!(eval("{{@a:A.email}}.toLowerCase().endsWith('@example.com')", &outs).result);
    }

    #[test]
    fn test_injection_through_values_is_inert() {
        let outs = outputs(vec![("a", json!({ "text": "1) || (true" }))]);
        let outcome = eval("{{@a:A.text}} === 'safe'", &outs);
        assert!(!outcome.result);
        assert_eq!(outcome.resolved_values["A.text"], json!("1) || (true"));
    }

    #[test]
    fn test_invalid_expression_fails_closed() {
        let outs = outputs(vec![("a", json!({ "x": 1 }))]);
        for source in [
            "{{@a:A.x}} = 1",
            "process.exit()",
            "(() => true)()",
            "{{@a:A.x}}.constructor('return 1')",
            "",
        ] {
            let outcome = eval(source, &outs);
            assert!(!outcome.result, "accepted: {}", source);
            assert!(outcome.resolved_values.is_empty());
        }
    }

    #[test]
    fn test_missing_output_fails_closed() {
        let outs = outputs(vec![]);
        let outcome = eval("{{@ghost:G.x}} === undefined", &outs);
        assert!(!outcome.result);
        assert!(outcome.resolved_values.is_empty());
    }

    #[test]
    fn test_failed_traversal_binds_undefined() {
        let outs = outputs(vec![("a", json!({ "x": 1 }))]);
        assert!(eval("{{@a:A.y.z}} === undefined", &outs).result);

        let disabled = outputs(vec![("d", JsonValue::Null)]);
        assert!(eval("{{@d:D.field}} === undefined", &disabled).result);
    }

    #[test]
    fn test_runtime_error_fails_closed() {
        let outs = outputs(vec![("a", json!({ "x": null }))]);
        assert!(!eval("{{@a:A.x}}.includes('y')", &outs).result);
    }

    #[test]
    fn test_non_string_values_use_truthiness() {
        let outs = outputs(vec![]);
        assert!(evaluate_condition(Some(&json!(1)), &outs).result);
        assert!(!evaluate_condition(Some(&json!(0)), &outs).result);
    }
}

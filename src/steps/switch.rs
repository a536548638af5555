//! `switch/route` plugin: picks an output index from rules or an expression.
//!
//! The engine does not route on the result; downstream nodes read
//! `matchedOutput` through templates or conditions.

use std::sync::Arc;

use futures::future::BoxFuture;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StepError;
use crate::execution::dispatcher::{Plugin, StepDescriptor, StepRegistry};
use crate::execution::step::{StepHandler, StepInput};
use crate::execution::template::stringify;
use crate::expression::value::parse_number;

pub const SWITCH_ACTION: &str = "switch/route";
const SWITCH_FUNCTION: &str = "switchStep";

/// Registers the switch plugin's actions.
pub fn register(registry: &mut StepRegistry) {
    registry.register(StepDescriptor {
        action_type: SWITCH_ACTION.to_string(),
        label: "Switch".to_string(),
        step_function: SWITCH_FUNCTION.to_string(),
        plugin: Arc::new(SwitchPlugin),
    });
}

pub struct SwitchPlugin;

impl Plugin for SwitchPlugin {
    fn name(&self) -> &str {
        "switch"
    }

    fn step(&self, function: &str) -> Option<Arc<dyn StepHandler>> {
        match function {
            SWITCH_FUNCTION => Some(Arc::new(SwitchStep)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SwitchRule {
    #[serde(default)]
    pub output: i64,
    #[serde(default)]
    pub operator: String,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchResult {
    pub matched_output: i64,
    pub matched_rule_index: i64,
    pub matched_rule_name: String,
    pub value: String,
    pub output_count: i64,
}

/// Applies one rule operator to the evaluated value.
pub fn apply_operator(value: &str, operator: &str, operand: &str) -> bool {
    match operator {
        "equals" => value == operand,
        "notEquals" => value != operand,
        "contains" => value.contains(operand),
        "notContains" => !value.contains(operand),
        "greaterThan" => parse_number(value) > parse_number(operand),
        "lessThan" => parse_number(value) < parse_number(operand),
        "startsWith" => value.starts_with(operand),
        "endsWith" => value.ends_with(operand),
        "regex" => regex::Regex::new(operand)
            .map(|re| re.is_match(value))
            .unwrap_or(false),
        "isEmpty" => value.is_empty(),
        "isNotEmpty" => !value.is_empty(),
        _ => false,
    }
}

fn parse_rules(raw: Option<&Value>) -> Vec<SwitchRule> {
    let parsed = match raw {
        Some(Value::Array(_)) => raw.cloned(),
        Some(Value::String(text)) if !text.trim().is_empty() => serde_json::from_str(text).ok(),
        _ => None,
    };
    match parsed.map(serde_json::from_value::<Vec<SwitchRule>>) {
        Some(Ok(rules)) => rules,
        Some(Err(e)) => {
            warn!("Ignoring malformed switch rules: {}", e);
            Vec::new()
        }
        None => Vec::new(),
    }
}

fn output_index(input: &StepInput) -> Option<i64> {
    let raw = input
        .get("outputIndex")
        .or_else(|| input.get("outputExpression"))?;
    match raw {
        Value::Number(n) => n.as_f64().map(|f| f as i64),
        Value::String(text) => {
            let n = parse_number(text);
            (!text.trim().is_empty() && n.is_finite()).then_some(n as i64)
        }
        _ => None,
    }
}

/// Evaluates the switch for one input.
pub fn evaluate_switch(input: &StepInput) -> SwitchResult {
    let mode = input.get_str("mode").unwrap_or("rules");

    if mode == "expression" {
        let index = output_index(input).unwrap_or(-1);
        let value = input
            .get("outputIndex")
            .or_else(|| input.get("outputExpression"))
            .map(stringify)
            .unwrap_or_default();
        return SwitchResult {
            matched_output: index,
            matched_rule_index: -1,
            matched_rule_name: String::new(),
            value,
            output_count: if index >= 0 { index.saturating_add(1) } else { 0 },
        };
    }

    let value = input.get("value").map(stringify).unwrap_or_default();
    let rules = parse_rules(input.get("rules"));
    let output_count = rules
        .iter()
        .map(|r| r.output)
        .max()
        .unwrap_or(0)
        .max(0)
        .saturating_add(1);

    let matched = rules
        .iter()
        .enumerate()
        .find(|(_, rule)| apply_operator(&value, &rule.operator, &stringify(&rule.value)));

    match matched {
        Some((index, rule)) => SwitchResult {
            matched_output: rule.output,
            matched_rule_index: index as i64,
            matched_rule_name: rule.name.clone().unwrap_or_default(),
            value,
            output_count,
        },
        None => SwitchResult {
            matched_output: -1,
            matched_rule_index: -1,
            matched_rule_name: String::new(),
            value,
            output_count,
        },
    }
}

pub struct SwitchStep;

impl StepHandler for SwitchStep {
    fn call(&self, input: StepInput) -> BoxFuture<'_, Result<Value, StepError>> {
        Box::pin(async move {
            let result = evaluate_switch(&input);
            debug!(
                "Switch '{}' matched output {}",
                input.context.node_name, result.matched_output
            );
            Ok(serde_json::to_value(result)?)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::model::{ConfigMap, StepContext};
    use serde_json::json;

    fn input(entries: Vec<(&str, Value)>) -> StepInput {
        let config: ConfigMap = entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        StepInput::new(config, StepContext::default())
    }

    #[test]
    fn test_operators() {
        assert!(apply_operator("active", "equals", "active"));
        assert!(apply_operator("active", "notEquals", "idle"));
        assert!(apply_operator("hello world", "contains", "lo w"));
        assert!(apply_operator("10", "greaterThan", "9"));
        assert!(!apply_operator("abc", "lessThan", "9"));
        assert!(apply_operator("order-123", "regex", r"^order-\d+$"));
        assert!(!apply_operator("x", "regex", "("));
        assert!(apply_operator("", "isEmpty", ""));
        assert!(!apply_operator("x", "unknownOp", "x"));
    }

    #[test]
    fn test_rules_mode_first_match() {
        let result = evaluate_switch(&input(vec![
            ("value", json!("inactive")),
            (
                "rules",
                json!(r#"[{"output":0,"operator":"equals","value":"active","name":"Active"},
                          {"output":2,"operator":"contains","value":"active","name":"Any"}]"#),
            ),
        ]));
        assert_eq!(result.matched_output, 2);
        assert_eq!(result.matched_rule_index, 1);
        assert_eq!(result.matched_rule_name, "Any");
        assert_eq!(result.output_count, 3);
    }

    #[test]
    fn test_rules_mode_no_match() {
        let result = evaluate_switch(&input(vec![
            ("value", json!(5)),
            ("rules", json!([{ "output": 1, "operator": "lessThan", "value": 3 }])),
        ]));
        assert_eq!(result.matched_output, -1);
        assert_eq!(result.value, "5");
        assert_eq!(result.output_count, 2);
    }

    #[test]
    fn test_expression_mode() {
        let result = evaluate_switch(&input(vec![
            ("mode", json!("expression")),
            ("outputIndex", json!("2")),
        ]));
        assert_eq!(result.matched_output, 2);
        assert_eq!(result.output_count, 3);

        let missing = evaluate_switch(&input(vec![("mode", json!("expression"))]));
        assert_eq!(missing.matched_output, -1);
        assert_eq!(missing.output_count, 0);
    }

    #[test]
    fn test_output_count_saturates() {
        let expression = evaluate_switch(&input(vec![
            ("mode", json!("expression")),
            ("outputIndex", json!(i64::MAX)),
        ]));
        assert_eq!(expression.matched_output, i64::MAX);
        assert_eq!(expression.output_count, i64::MAX);

        let rules = evaluate_switch(&input(vec![
            ("value", json!("a")),
            ("rules", json!([{ "output": i64::MAX, "operator": "equals", "value": "a" }])),
        ]));
        assert_eq!(rules.matched_output, i64::MAX);
        assert_eq!(rules.output_count, i64::MAX);
    }

    #[tokio::test]
    async fn test_switch_step_serializes_camel_case() {
        let out = SwitchStep
            .call(input(vec![("value", json!("a"))]))
            .await
            .unwrap();
        assert_eq!(out["matchedOutput"], json!(-1));
        assert_eq!(out["outputCount"], json!(1));
    }
}

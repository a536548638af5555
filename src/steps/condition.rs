//! `Condition` system action.
//!
//! The expression has already been evaluated when this step runs; it only
//! shapes the result that gates the node's successors.

use futures::future::BoxFuture;
use log::info;
use serde_json::{Map, Value};

use crate::error::StepError;
use crate::execution::step::{StepHandler, StepInput};

pub const CONDITION_ACTION: &str = "Condition";

pub struct ConditionStep;

impl StepHandler for ConditionStep {
    fn call(&self, input: StepInput) -> BoxFuture<'_, Result<Value, StepError>> {
        Box::pin(async move {
            let condition = input
                .get("condition")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            info!(
                "Condition '{}' evaluated to {}",
                input.context.node_name, condition
            );

            let mut result = Map::new();
            result.insert("condition".into(), Value::Bool(condition));
            for key in ["expression", "values"] {
                if let Some(value) = input.get(key) {
                    result.insert(key.into(), value.clone());
                }
            }
            Ok(Value::Object(result))
        })
    }
}

/// Reads the gate decision back out of a Condition step's result.
pub fn condition_passed(data: Option<&Value>) -> bool {
    data.and_then(|d| d.get("condition"))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::model::{ConfigMap, StepContext};
    use serde_json::json;

    #[tokio::test]
    async fn test_condition_step_shapes_result() {
        let mut config = ConfigMap::new();
        config.insert("condition".into(), json!(true));
        config.insert("expression".into(), json!("1 < 2"));

        let out = ConditionStep
            .call(StepInput::new(config, StepContext::default()))
            .await
            .unwrap();
        assert_eq!(out, json!({ "condition": true, "expression": "1 < 2" }));
        assert!(condition_passed(Some(&out)));
    }

    #[test]
    fn test_condition_passed_requires_true() {
        assert!(!condition_passed(None));
        assert!(!condition_passed(Some(&json!({ "condition": "true" }))));
        assert!(!condition_passed(Some(&json!({ "condition": false }))));
    }
}

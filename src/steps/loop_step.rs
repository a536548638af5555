//! `Loop` system action.
//!
//! The step itself only describes the batches; the engine walks them.

use futures::future::BoxFuture;
use log::{error, info};
use serde_json::{json, Map, Value};

use crate::error::StepError;
use crate::execution::step::{StepHandler, StepInput};
use crate::expression::Value as ExprValue;

pub const LOOP_ACTION: &str = "Loop";

/// Object keys searched, in order, for the array to iterate.
const ARRAY_KEYS: [&str; 4] = ["rows", "data", "items", "results"];

/// Turns the configured item source into a concrete list.
///
/// Accepts an array, JSON text holding an array or an object, or an object;
/// objects yield the first populated of `rows`, `data`, `items`, `results`.
/// Anything else is an empty list.
pub fn resolve_loop_items(raw: Option<&Value>) -> Vec<Value> {
    match raw {
        Some(Value::Array(items)) => items.clone(),
        Some(Value::String(text)) => {
            let trimmed = text.trim();
            if !trimmed.starts_with('[') && !trimmed.starts_with('{') {
                return Vec::new();
            }
            match serde_json::from_str::<Value>(trimmed) {
                Ok(Value::Array(items)) => items,
                Ok(Value::Object(map)) => array_field(&map),
                Ok(_) => Vec::new(),
                Err(e) => {
                    error!("Failed to parse loop items as JSON: {}", e);
                    Vec::new()
                }
            }
        }
        Some(Value::Object(map)) => array_field(map),
        _ => Vec::new(),
    }
}

fn array_field(map: &Map<String, Value>) -> Vec<Value> {
    let populated = ARRAY_KEYS
        .iter()
        .filter_map(|key| map.get(*key))
        .find(|value| ExprValue::from_json(Some(value)).truthy());
    match populated {
        Some(Value::Array(items)) => items.clone(),
        _ => Vec::new(),
    }
}

/// Batch size from a number or numeric text. Defaults to 1, never below 1.
pub fn resolve_batch_size(raw: Option<&Value>) -> usize {
    let size = match raw {
        Some(Value::Number(n)) => n.as_f64().map(f64::trunc),
        Some(Value::String(text)) => parse_leading_int(text),
        _ => None,
    };
    match size {
        Some(n) if n >= 1.0 && n.is_finite() => n as usize,
        _ => 1,
    }
}

/// Integer prefix of a string (`"12px"` is 12), as `parseInt` reads it.
fn parse_leading_int(text: &str) -> Option<f64> {
    let trimmed = text.trim_start();
    let (sign, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (-1.0, rest),
        None => (1.0, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    digits[..end].parse::<f64>().ok().map(|n| sign * n)
}

pub fn batch_count(item_count: usize, batch_size: usize) -> usize {
    item_count.div_ceil(batch_size.max(1))
}

pub struct LoopStep;

impl StepHandler for LoopStep {
    fn call(&self, input: StepInput) -> BoxFuture<'_, Result<Value, StepError>> {
        Box::pin(async move {
            let items = resolve_loop_items(input.get("items"));
            let batch_size = resolve_batch_size(input.get("batchSize"));
            let total_items = items.len();
            let total_batches = batch_count(total_items, batch_size);
            info!(
                "Loop '{}': {} items in {} batches of {}",
                input.context.node_name, total_items, total_batches, batch_size
            );

            Ok(json!({
                "totalItems": total_items,
                "items": items,
                "totalBatches": total_batches,
                "batchSize": batch_size,
                "currentBatchIndex": input.get("currentBatchIndex").cloned().unwrap_or(json!(0)),
            }))
        })
    }
}

/// Batches a loop node drives, read back from its step result.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopPlan {
    base: Map<String, Value>,
    items: Vec<Value>,
    batch_size: usize,
    total_batches: usize,
}

impl LoopPlan {
    pub fn from_step_output(data: Option<&Value>) -> Self {
        let base = data
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let items = base
            .get("items")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let batch_size = resolve_batch_size(base.get("batchSize"));
        let total_batches = base
            .get("totalBatches")
            .and_then(Value::as_u64)
            .filter(|n| *n > 0)
            .map(|n| n as usize)
            .unwrap_or_else(|| batch_count(items.len(), batch_size));

        Self {
            base,
            items,
            batch_size,
            total_batches,
        }
    }

    pub fn total_batches(&self) -> usize {
        self.total_batches
    }

    /// One-based `(first, last)` item positions of a batch, for logging.
    pub fn item_range(&self, index: usize) -> (usize, usize) {
        let start = (index * self.batch_size).min(self.items.len());
        let end = (start + self.batch_size).min(self.items.len());
        (start + 1, end)
    }

    /// Loop node output while batch `index` runs.
    pub fn batch_output(&self, index: usize) -> Value {
        let start = (index * self.batch_size).min(self.items.len());
        let end = (start + self.batch_size).min(self.items.len());
        let batch = self.items[start..end].to_vec();

        let mut data = self.base.clone();
        data.insert("currentBatchIndex".into(), json!(index));
        data.insert(
            "currentItem".into(),
            batch.first().cloned().unwrap_or(Value::Null),
        );
        data.insert("currentBatch".into(), Value::Array(batch));
        data.insert("currentIndex".into(), json!(start));
        data.insert("hasMore".into(), json!(index + 1 < self.total_batches));
        Value::Object(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::model::{ConfigMap, StepContext};

    #[test]
    fn test_resolve_items_sources() {
        assert_eq!(resolve_loop_items(Some(&json!([1, 2]))), vec![json!(1), json!(2)]);
        assert_eq!(resolve_loop_items(Some(&json!(" [3] "))), vec![json!(3)]);
        assert_eq!(
            resolve_loop_items(Some(&json!(r#"{"results": ["a"]}"#))),
            vec![json!("a")]
        );
        assert_eq!(
            resolve_loop_items(Some(&json!({ "rows": [1], "items": [2] }))),
            vec![json!(1)]
        );
        assert!(resolve_loop_items(Some(&json!("not json"))).is_empty());
        assert!(resolve_loop_items(Some(&json!("[broken"))).is_empty());
        assert!(resolve_loop_items(Some(&json!(5))).is_empty());
        assert!(resolve_loop_items(None).is_empty());
    }

    #[test]
    fn test_first_populated_key_wins() {
        // empty string is not populated, an empty array is
        let items = resolve_loop_items(Some(&json!({ "rows": "", "data": [9] })));
        assert_eq!(items, vec![json!(9)]);
        let items = resolve_loop_items(Some(&json!({ "rows": [], "data": [9] })));
        assert!(items.is_empty());
        let items = resolve_loop_items(Some(&json!({ "rows": "x", "data": [9] })));
        assert!(items.is_empty());
    }

    #[test]
    fn test_resolve_batch_size() {
        assert_eq!(resolve_batch_size(None), 1);
        assert_eq!(resolve_batch_size(Some(&json!(3))), 3);
        assert_eq!(resolve_batch_size(Some(&json!("4"))), 4);
        assert_eq!(resolve_batch_size(Some(&json!("12px"))), 12);
        assert_eq!(resolve_batch_size(Some(&json!("abc"))), 1);
        assert_eq!(resolve_batch_size(Some(&json!(0))), 1);
        assert_eq!(resolve_batch_size(Some(&json!(-2))), 1);
        assert_eq!(resolve_batch_size(Some(&json!(2.7))), 2);
    }

    #[test]
    fn test_batch_count() {
        assert_eq!(batch_count(5, 2), 3);
        assert_eq!(batch_count(4, 2), 2);
        assert_eq!(batch_count(0, 3), 0);
    }

    #[tokio::test]
    async fn test_loop_step_output() {
        let mut config = ConfigMap::new();
        config.insert("items".into(), json!([1, 2, 3, 4, 5]));
        config.insert("batchSize".into(), json!(2));

        let out = LoopStep
            .call(StepInput::new(config, StepContext::default()))
            .await
            .unwrap();
        assert_eq!(out["totalItems"], json!(5));
        assert_eq!(out["totalBatches"], json!(3));
        assert_eq!(out["currentBatchIndex"], json!(0));
    }

    #[test]
    fn test_loop_plan_batches() {
        let data = json!({ "items": [1, 2, 3, 4, 5], "batchSize": 2, "totalBatches": 3 });
        let plan = LoopPlan::from_step_output(Some(&data));
        assert_eq!(plan.total_batches(), 3);

        let first = plan.batch_output(0);
        assert_eq!(first["currentBatch"], json!([1, 2]));
        assert_eq!(first["currentItem"], json!(1));
        assert_eq!(first["currentIndex"], json!(0));
        assert_eq!(first["hasMore"], json!(true));
        assert_eq!(first["totalItems"], Value::Null);

        let last = plan.batch_output(2);
        assert_eq!(last["currentBatch"], json!([5]));
        assert_eq!(last["currentIndex"], json!(4));
        assert_eq!(last["hasMore"], json!(false));
        assert_eq!(plan.item_range(2), (5, 5));
    }

    #[test]
    fn test_loop_plan_without_step_output() {
        let plan = LoopPlan::from_step_output(None);
        assert_eq!(plan.total_batches(), 0);
    }
}

//! Step contract
//!
//! A step is the pluggable unit of work behind an action type. It receives
//! its resolved configuration plus a [`StepContext`] and returns either a
//! raw value (success data) or a `{success, data | error}` result object.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::error::{EngineError, StepError};
use crate::workflow::model::{ConfigMap, NodeResult, StepContext};

/// Executable step implementation.
pub trait StepHandler: Send + Sync {
    fn call(&self, input: StepInput) -> BoxFuture<'_, Result<Value, StepError>>;
}

/// Wraps an async function as a [`StepHandler`].
pub struct FnStep<F>(F);

impl<F, Fut> StepHandler for FnStep<F>
where
    F: Fn(StepInput) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, StepError>> + Send + 'static,
{
    fn call(&self, input: StepInput) -> BoxFuture<'_, Result<Value, StepError>> {
        Box::pin((self.0)(input))
    }
}

/// Builds a shareable handler from an async function or closure.
///
/// ```
/// use nodeflow::execution::step::{step_fn, StepInput};
/// use serde_json::json;
///
/// let echo = step_fn(|input: StepInput| async move {
///     Ok(json!({ "success": true, "data": input.get("message").cloned() }))
/// });
/// # let _ = echo;
/// ```
pub fn step_fn<F, Fut>(f: F) -> Arc<dyn StepHandler>
where
    F: Fn(StepInput) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, StepError>> + Send + 'static,
{
    Arc::new(FnStep(f))
}

/// Input of one step invocation.
#[derive(Debug, Clone, Default)]
pub struct StepInput {
    pub config: ConfigMap,
    pub context: StepContext,
}

impl StepInput {
    pub fn new(config: ConfigMap, context: StepContext) -> Self {
        Self { config, context }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.config.get(key)
    }

    /// String field, treating an empty string as absent.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
    }
}

/// Turns what a step returned into a node result.
///
/// `{success: false, error}` becomes a failure carrying the error text
/// (a string, or the `message` of an error object). Everything else is
/// success data, stored as returned.
pub fn translate_step_value(value: Value, action_type: &str, node_label: &str) -> NodeResult {
    let failed = value
        .as_object()
        .is_some_and(|map| map.get("success") == Some(&Value::Bool(false)));
    if !failed {
        return NodeResult::succeeded(value);
    }

    let message = match value.get("error") {
        Some(Value::String(text)) => Some(text.clone()),
        Some(Value::Object(err)) => err.get("message").and_then(Value::as_str).map(str::to_string),
        _ => None,
    };
    NodeResult::failed(message.unwrap_or_else(|| {
        format!(
            "Step \"{}\" in node \"{}\" failed without a specific error message.",
            action_type, node_label
        )
    }))
}

/// Result for a step that returned `Err`.
pub fn step_error_result(err: StepError) -> NodeResult {
    NodeResult::failed(EngineError::StepExecution(err.to_string()).to_string())
}

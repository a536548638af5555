//! Step Dispatcher
//!
//! Maps action types to step implementations. Plugins are resolved once, when
//! they are registered; dispatching an action type is a table lookup.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, warn};
use serde_json::{json, Value};

use crate::error::{EngineError, StepError};
use crate::steps::condition::{ConditionStep, CONDITION_ACTION};
use crate::steps::loop_step::{resolve_batch_size, resolve_loop_items, LoopStep, LOOP_ACTION};
use crate::workflow::model::{ConfigMap, OutputMap, StepContext};

use super::condition::evaluate_condition;
use super::step::{StepHandler, StepInput};

/// Action types handled by the engine itself rather than a registered step.
pub const SYSTEM_ACTIONS: [&str; 2] = [CONDITION_ACTION, LOOP_ACTION];

/// A bundle of step functions looked up by name.
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    /// Step function exported under `function`, if the plugin has one.
    fn step(&self, function: &str) -> Option<Arc<dyn StepHandler>>;
}

/// Declares that `action_type` is implemented by `step_function` of `plugin`.
pub struct StepDescriptor {
    pub action_type: String,
    pub label: String,
    pub step_function: String,
    pub plugin: Arc<dyn Plugin>,
}

/// Registered implementation of an action type.
#[derive(Clone)]
pub enum StepEntry {
    Ready {
        label: String,
        handler: Arc<dyn StepHandler>,
    },
    /// The plugin was registered but does not export the declared function
    MissingExport { label: String, function: String },
}

impl StepEntry {
    pub fn label(&self) -> &str {
        match self {
            Self::Ready { label, .. } | Self::MissingExport { label, .. } => label,
        }
    }
}

/// Table from action type to step implementation.
#[derive(Clone, Default)]
pub struct StepRegistry {
    steps: HashMap<String, StepEntry>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with the built-in steps registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::steps::register_builtins(&mut registry);
        registry
    }

    /// Registers a step handler directly.
    pub fn register_step(
        &mut self,
        action_type: impl Into<String>,
        label: impl Into<String>,
        handler: Arc<dyn StepHandler>,
    ) {
        let action_type = action_type.into();
        let label = label.into();
        debug!("Registering step '{}' ({})", action_type, label);
        self.steps
            .insert(action_type, StepEntry::Ready { label, handler });
    }

    /// Registers a plugin-provided step, resolving its function now.
    pub fn register(&mut self, descriptor: StepDescriptor) {
        let StepDescriptor {
            action_type,
            label,
            step_function,
            plugin,
        } = descriptor;

        let entry = match plugin.step(&step_function) {
            Some(handler) => StepEntry::Ready { label, handler },
            None => {
                warn!(
                    "Plugin '{}' does not export '{}' for action '{}'",
                    plugin.name(),
                    step_function,
                    action_type
                );
                StepEntry::MissingExport {
                    label,
                    function: step_function,
                }
            }
        };
        self.steps.insert(action_type, entry);
    }

    /// Removes an action type. Returns true if it was registered.
    pub fn unregister(&mut self, action_type: &str) -> bool {
        self.steps.remove(action_type).is_some()
    }

    pub fn get(&self, action_type: &str) -> Option<&StepEntry> {
        self.steps.get(action_type)
    }

    pub fn contains(&self, action_type: &str) -> bool {
        self.steps.contains_key(action_type)
    }

    /// Human-readable label of an action type.
    pub fn action_label(&self, action_type: &str) -> Option<&str> {
        self.steps.get(action_type).map(StepEntry::label)
    }

    /// Registered action types, sorted.
    pub fn action_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.steps.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Runs the step behind an action type.
pub struct Dispatcher {
    registry: StepRegistry,
    condition: ConditionStep,
    looping: LoopStep,
}

impl Dispatcher {
    pub fn new(registry: StepRegistry) -> Self {
        Self {
            registry,
            condition: ConditionStep,
            looping: LoopStep,
        }
    }

    pub fn registry(&self) -> &StepRegistry {
        &self.registry
    }

    /// Human-readable label of an action type, system actions included.
    pub fn action_label(&self, action_type: &str) -> Option<&str> {
        match action_type {
            CONDITION_ACTION => Some(CONDITION_ACTION),
            LOOP_ACTION => Some(LOOP_ACTION),
            other => self.registry.action_label(other),
        }
    }

    /// Invokes the step for `action_type`.
    ///
    /// Unknown action types and missing plugin exports are reported as a
    /// `{success: false, error}` value rather than an `Err`.
    pub async fn dispatch(
        &self,
        action_type: &str,
        config: ConfigMap,
        outputs: &OutputMap,
        context: StepContext,
    ) -> Result<Value, StepError> {
        match action_type {
            CONDITION_ACTION => {
                let input = condition_input(&config, outputs);
                self.condition.call(StepInput::new(input, context)).await
            }
            LOOP_ACTION => {
                let input = loop_input(&config);
                self.looping.call(StepInput::new(input, context)).await
            }
            _ => match self.registry.get(action_type) {
                Some(StepEntry::Ready { handler, .. }) => {
                    handler.call(StepInput::new(config, context)).await
                }
                Some(StepEntry::MissingExport { function, .. }) => {
                    Ok(failure(EngineError::StepExport {
                        function: function.clone(),
                        action_type: action_type.to_string(),
                    }))
                }
                None => Ok(failure(EngineError::UnknownAction {
                    action_type: action_type.to_string(),
                    available: self.available_actions(),
                })),
            },
        }
    }

    fn available_actions(&self) -> String {
        let mut names: Vec<&str> = SYSTEM_ACTIONS.to_vec();
        names.extend(self.registry.action_types());
        names.join(", ")
    }
}

fn failure(err: EngineError) -> Value {
    json!({ "success": false, "error": err.to_string() })
}

/// Evaluates the raw `condition` field and hands the outcome to the step.
fn condition_input(config: &ConfigMap, outputs: &OutputMap) -> ConfigMap {
    let raw = config.get("condition");
    let outcome = evaluate_condition(raw, outputs);
    debug!("Condition result: {}", outcome.result);

    let mut input = ConfigMap::new();
    input.insert("condition".into(), Value::Bool(outcome.result));
    if let Some(Value::String(expression)) = raw {
        input.insert("expression".into(), Value::String(expression.clone()));
    }
    if !outcome.resolved_values.is_empty() {
        input.insert("values".into(), Value::Object(outcome.resolved_values));
    }
    input
}

/// Normalizes the loop's item source and batch size.
fn loop_input(config: &ConfigMap) -> ConfigMap {
    let raw_items = config.get("items");
    let items = resolve_loop_items(raw_items);
    let batch_size = resolve_batch_size(config.get("batchSize"));
    debug!("Loop resolved {} items, batch size {}", items.len(), batch_size);

    let mut input = ConfigMap::new();
    input.insert("items".into(), Value::Array(items));
    input.insert("batchSize".into(), Value::from(batch_size));
    input.insert(
        "currentBatchIndex".into(),
        config.get("currentBatchIndex").cloned().unwrap_or(json!(0)),
    );
    if let Some(Value::String(expression)) = raw_items {
        input.insert("expression".into(), Value::String(expression.clone()));
    }
    input
}

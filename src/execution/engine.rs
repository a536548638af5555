//! Workflow Execution Engine
//!
//! Walks the graph from every root trigger:
//! - Triggers build their payload and notify the hook
//! - Actions resolve templates, merge predecessor data and dispatch a step
//! - Successful nodes fan out to their successors concurrently
//! - Conditions prune their successors when false
//! - Loops re-run their successors once per batch, batches in order
//!
//! A failing node never aborts the run: its failure is recorded and only its
//! own branch stops.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use log::{debug, error, info, warn};
use serde_json::Value;

use crate::error::EngineError;
use crate::monitoring::EventType;
use crate::steps::condition::{condition_passed, CONDITION_ACTION};
use crate::steps::loop_step::{LoopPlan, LOOP_ACTION};
use crate::steps::trigger::build_trigger_data;
use crate::workflow::model::{
    sanitize_node_id, ConfigMap, ExecutionInput, Node, NodeKind, NodeOutput, NodeResult, OutputMap,
    StepContext,
};

use super::aggregator::ExecutionResult;
use super::context::{ExecutionContext, VisitedSet};
use super::dispatcher::{Dispatcher, StepRegistry};
use super::hooks::{ExecutionHook, HookEvent, LoggingHook, TriggerNotice};
use super::step::{step_error_result, translate_step_value};
use super::template::process_templates;

/// Config key whose raw text the condition evaluator needs.
const CONDITION_KEY: &str = "condition";

/// Workflow execution engine.
///
/// # Example
///
/// ```rust,no_run
/// use nodeflow::execution::Engine;
/// use nodeflow::load_workflow;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let workflow = load_workflow("workflow.yaml")?;
///     let mut engine = Engine::with_builtins();
///     engine.set_record_timeline(true);
///
///     let result = engine.run(workflow.into_input(None, None)).await;
///     println!("success: {}", result.success);
///     Ok(())
/// }
/// ```
pub struct Engine {
    dispatcher: Arc<Dispatcher>,
    hook: Arc<dyn ExecutionHook>,
    record_timeline: bool,
}

/// What to do after a node has been recorded.
enum Continuation {
    Halt,
    FanOut,
    Loop(LoopPlan),
}

/// Outcome of a node's own work.
struct NodeStep {
    result: NodeResult,
    /// Output data to store, `None` when the node must not produce one
    output: Option<Value>,
    next: Continuation,
}

impl NodeStep {
    /// Recorded and stored; failed results store null data.
    fn completed(result: NodeResult, next: Continuation) -> Self {
        let output = Some(result.data.clone().unwrap_or(Value::Null));
        Self {
            result,
            output,
            next,
        }
    }

    /// Recorded only.
    fn aborted(result: NodeResult) -> Self {
        Self {
            result,
            output: None,
            next: Continuation::Halt,
        }
    }
}

impl Engine {
    /// Creates an engine dispatching to the given registry.
    pub fn new(registry: StepRegistry) -> Self {
        Self {
            dispatcher: Arc::new(Dispatcher::new(registry)),
            hook: Arc::new(LoggingHook),
            record_timeline: false,
        }
    }

    /// Creates an engine with the built-in steps registered.
    pub fn with_builtins() -> Self {
        Self::new(StepRegistry::with_builtins())
    }

    /// Replaces the hook notified of triggers and completions.
    pub fn set_hook(&mut self, hook: Arc<dyn ExecutionHook>) {
        self.hook = hook;
    }

    /// Enables or disables timeline recording.
    pub fn set_record_timeline(&mut self, enabled: bool) {
        self.record_timeline = enabled;
    }

    /// Executes one workflow run.
    ///
    /// Never fails as a whole: node failures are collected into the
    /// returned [`ExecutionResult`].
    pub async fn run(&self, input: ExecutionInput) -> ExecutionResult {
        let started = Instant::now();
        let start_time = Utc::now();

        info!(
            "Starting execution ({} nodes, {} edges, execution id: {}, workflow: {})",
            input.nodes.len(),
            input.edges.len(),
            input.execution_id.as_deref().unwrap_or("none"),
            input.workflow_id.as_deref().unwrap_or("none"),
        );

        let ctx = Arc::new(ExecutionContext::new(input, self.record_timeline));
        let roots = ctx.roots().to_vec();
        info!("Found {} trigger nodes", roots.len());

        join_all(
            roots
                .into_iter()
                .map(|id| self.execute_node(Arc::clone(&ctx), id, VisitedSet::new(), None)),
        )
        .await;

        let result = ctx.finish().await;
        info!(
            "Execution completed: success={}, {} node results in {:.2?}",
            result.success,
            result.results.len(),
            started.elapsed()
        );
        if let Some(err) = &result.error {
            debug!("First failure: {}", err);
        }

        if let Some(execution_id) = ctx.execution_id() {
            let record = result.completion_record(execution_id, ctx.workflow_id(), start_time);
            if let Err(e) = self.hook.notify(HookEvent::Complete(record)).await {
                warn!(
                    "Completion of {} not recorded: {}",
                    execution_id,
                    EngineError::Hook(e.to_string())
                );
            }
        }

        result
    }

    /// Enters a node on a traversal, records it and continues to its
    /// successors.
    fn execute_node(
        &self,
        ctx: Arc<ExecutionContext>,
        node_id: String,
        visited: VisitedSet,
        loop_iteration: Option<usize>,
    ) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            debug!("Entering node '{}'", node_id);

            if !visited.insert(&node_id).await {
                debug!("Node '{}' already visited, skipping", node_id);
                return;
            }

            let Some(node) = ctx.node(&node_id) else {
                debug!("Node '{}' not found, skipping", node_id);
                return;
            };

            if !node.enabled {
                info!("Node '{}' is disabled, skipping", node_id);
                ctx.set_output(
                    node.sanitized_id(),
                    NodeOutput {
                        label: node.display_label().to_string(),
                        data: Value::Null,
                    },
                )
                .await;
                ctx.timeline_event(&node_id, EventType::Skipped).await;
                self.fan_out(&ctx, &node_id, &visited, loop_iteration).await;
                return;
            }

            ctx.timeline_event(&node_id, EventType::Started).await;

            let step = match AssertUnwindSafe(self.run_node(&ctx, node, loop_iteration))
                .catch_unwind()
                .await
            {
                Ok(step) => step,
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    error!("Node '{}' panicked: {}", node_id, message);
                    NodeStep::aborted(NodeResult::failed(
                        EngineError::StepExecution(format!("node panicked: {}", message))
                            .to_string(),
                    ))
                }
            };

            let success = step.result.success;
            if let Some(err) = &step.result.error {
                warn!("Node '{}' failed: {}", node_id, err);
            }
            ctx.record(&node_id, step.result).await;
            if let Some(data) = step.output {
                ctx.set_output(
                    node.sanitized_id(),
                    NodeOutput {
                        label: node.display_label().to_string(),
                        data,
                    },
                )
                .await;
            }
            let event = if success {
                EventType::Completed
            } else {
                EventType::Failed
            };
            ctx.timeline_event(&node_id, event).await;
            info!("Node '{}' completed (success: {})", node_id, success);

            if !success {
                return;
            }
            match step.next {
                Continuation::Halt => {}
                Continuation::FanOut => {
                    self.fan_out(&ctx, &node_id, &visited, loop_iteration).await;
                }
                Continuation::Loop(plan) => self.run_batches(&ctx, node, plan).await,
            }
        })
    }

    /// Runs every successor of a node concurrently on the same traversal.
    async fn fan_out(
        &self,
        ctx: &Arc<ExecutionContext>,
        node_id: &str,
        visited: &VisitedSet,
        loop_iteration: Option<usize>,
    ) {
        let successors = ctx.adjacency().successors(node_id);
        if successors.is_empty() {
            return;
        }
        debug!("Node '{}' fans out to {} successors", node_id, successors.len());

        join_all(successors.iter().map(|next| {
            self.execute_node(Arc::clone(ctx), next.clone(), visited.clone(), loop_iteration)
        }))
        .await;
    }

    /// Re-runs the loop's successors once per batch.
    ///
    /// Each batch starts a fresh traversal that only knows the loop node, so
    /// body nodes run again; the loop's output is swapped for the batch view
    /// before the body starts.
    async fn run_batches(&self, ctx: &Arc<ExecutionContext>, node: &Node, plan: LoopPlan) {
        let successors = ctx.adjacency().successors(&node.id);
        let total = plan.total_batches();

        for index in 0..total {
            let (first, last) = plan.item_range(index);
            info!(
                "Loop '{}' batch {}/{} (items {}-{})",
                node.display_label(),
                index + 1,
                total,
                first,
                last
            );

            ctx.set_output(
                node.sanitized_id(),
                NodeOutput {
                    label: node.display_label().to_string(),
                    data: plan.batch_output(index),
                },
            )
            .await;

            let visited = VisitedSet::seeded(&node.id);
            join_all(successors.iter().map(|next| {
                self.execute_node(Arc::clone(ctx), next.clone(), visited.clone(), Some(index))
            }))
            .await;
        }

        info!("Loop '{}' finished {} batches", node.display_label(), total);
    }

    /// The node's own work, without recording or continuation.
    async fn run_node(
        &self,
        ctx: &ExecutionContext,
        node: &Node,
        loop_iteration: Option<usize>,
    ) -> NodeStep {
        match &node.kind {
            NodeKind::Trigger => self.run_trigger(ctx, node).await,
            NodeKind::Action => self.run_action(ctx, node, loop_iteration).await,
            NodeKind::Other(kind) => NodeStep::completed(
                NodeResult::failed(
                    EngineError::UnknownNodeKind {
                        kind: kind.clone(),
                        node: node.id.clone(),
                    }
                    .to_string(),
                ),
                Continuation::Halt,
            ),
        }
    }

    async fn run_trigger(&self, ctx: &ExecutionContext, node: &Node) -> NodeStep {
        let data = build_trigger_data(node, ctx.trigger_input(), Utc::now().timestamp_millis());

        let notice = TriggerNotice {
            execution_id: ctx.execution_id().map(str::to_string),
            workflow_id: ctx.workflow_id().map(str::to_string),
            node_id: node.id.clone(),
            node_name: self.node_name(node),
            trigger_data: data.clone(),
        };
        if let Err(e) = self.hook.notify(HookEvent::Trigger(notice)).await {
            warn!(
                "Trigger '{}' not recorded: {}",
                node.id,
                EngineError::Hook(e.to_string())
            );
        }

        NodeStep::completed(NodeResult::succeeded(data), Continuation::FanOut)
    }

    async fn run_action(
        &self,
        ctx: &ExecutionContext,
        node: &Node,
        loop_iteration: Option<usize>,
    ) -> NodeStep {
        let Some(action_type) = node.action_type() else {
            return NodeStep::aborted(NodeResult::failed(
                EngineError::Configuration {
                    node: node.display_label().to_string(),
                }
                .to_string(),
            ));
        };

        let outputs = ctx.outputs_snapshot().await;
        let mut config = process_templates(&node.config, &outputs);
        if let Some(raw) = node.config.get(CONDITION_KEY) {
            config.insert(CONDITION_KEY.to_string(), raw.clone());
        }
        merge_predecessor_data(&mut config, ctx.adjacency().predecessors(&node.id), &outputs);

        let context = StepContext {
            execution_id: ctx.execution_id().map(str::to_string),
            node_id: node.id.clone(),
            node_name: self.node_name(node),
            node_type: action_type.to_string(),
            loop_iteration,
        };

        debug!("Dispatching '{}' for node '{}'", action_type, node.id);
        let value = match self
            .dispatcher
            .dispatch(action_type, config, &outputs, context)
            .await
        {
            Ok(value) => value,
            Err(e) => return NodeStep::aborted(step_error_result(e)),
        };

        let result = translate_step_value(value, action_type, node.display_label());
        let next = match action_type {
            CONDITION_ACTION => {
                let passed = condition_passed(result.data.as_ref());
                info!("Condition '{}' evaluated to {}", node.display_label(), passed);
                if passed {
                    Continuation::FanOut
                } else {
                    Continuation::Halt
                }
            }
            LOOP_ACTION => Continuation::Loop(LoopPlan::from_step_output(result.data.as_ref())),
            _ => Continuation::FanOut,
        };
        NodeStep::completed(result, next)
    }

    /// Name handed to steps and hooks.
    fn node_name(&self, node: &Node) -> String {
        if !node.label.is_empty() {
            return node.label.clone();
        }
        let name = match &node.kind {
            NodeKind::Action => node
                .action_type()
                .and_then(|t| self.dispatcher.action_label(t))
                .unwrap_or("Action"),
            NodeKind::Trigger => node.trigger_type().unwrap_or("Trigger"),
            NodeKind::Other(kind) => kind.as_str(),
        };
        name.to_string()
    }
}

/// Copies fields of predecessor outputs that the config does not set.
///
/// Only object data is merged; earlier predecessors win over later ones.
/// `condition` is never inherited: a node's gate comes from its own config.
fn merge_predecessor_data(config: &mut ConfigMap, predecessors: &[String], outputs: &OutputMap) {
    for pred in predecessors {
        let key = sanitize_node_id(pred);
        let Some(Value::Object(fields)) = outputs.get(&key).map(|o| &o.data) else {
            continue;
        };
        for (field, value) in fields {
            if field != CONDITION_KEY && !config.contains_key(field) {
                config.insert(field.clone(), value.clone());
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

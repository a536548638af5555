//! Built-in steps
//!
//! - [`trigger`]: payload assembly for trigger nodes
//! - [`condition`]: the `Condition` system action
//! - [`loop_step`]: the `Loop` system action and batch planning
//! - [`switch`]: the `switch/route` plugin
//! - [`http_request`]: the `HTTP Request` system action

pub mod condition;
pub mod http_request;
pub mod loop_step;
pub mod switch;
pub mod trigger;

use std::sync::Arc;

use crate::execution::dispatcher::StepRegistry;

/// Registers every built-in step that goes through the registry.
///
/// `Condition` and `Loop` are dispatched by the engine directly.
pub fn register_builtins(registry: &mut StepRegistry) {
    registry.register_step(
        http_request::HTTP_REQUEST_ACTION,
        http_request::HTTP_REQUEST_ACTION,
        Arc::new(http_request::HttpRequestStep::new()),
    );
    switch::register(registry);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_registered() {
        let registry = StepRegistry::with_builtins();
        assert!(registry.contains("HTTP Request"));
        assert!(registry.contains("switch/route"));
        assert_eq!(registry.action_label("switch/route"), Some("Switch"));
        assert!(!registry.contains("Condition"));
    }
}

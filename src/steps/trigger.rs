//! Trigger payload assembly.

use log::{debug, warn};
use serde_json::{Map, Value};

use crate::workflow::model::Node;

/// Trigger type whose mock request is used for test runs.
pub const WEBHOOK_TRIGGER: &str = "Webhook";

/// Config key holding a sample webhook request body.
pub const MOCK_REQUEST_KEY: &str = "webhookMockRequest";

/// Builds the data a trigger node produces.
///
/// Starts from `{triggered: true, timestamp}`. A webhook trigger with a mock
/// request uses it when no trigger input was supplied; otherwise a non-empty
/// trigger input object is merged in.
pub fn build_trigger_data(node: &Node, trigger_input: Option<&Value>, timestamp_ms: i64) -> Value {
    let mut data = Map::new();
    data.insert("triggered".into(), Value::Bool(true));
    data.insert("timestamp".into(), Value::from(timestamp_ms));

    let input_fields = trigger_input.and_then(Value::as_object).filter(|m| !m.is_empty());
    let mock = node
        .config
        .get(MOCK_REQUEST_KEY)
        .filter(|v| !is_blank(v));

    match (node.trigger_type(), mock, input_fields) {
        (Some(WEBHOOK_TRIGGER), Some(mock), None) => match parse_mock(mock) {
            Some(fields) => {
                debug!("Trigger '{}' using webhook mock request", node.id);
                data.extend(fields);
            }
            None => warn!(
                "Ignoring webhook mock request of trigger '{}': not a JSON object",
                node.id
            ),
        },
        (_, _, Some(fields)) => data.extend(fields.clone()),
        _ => {}
    }

    Value::Object(data)
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn parse_mock(mock: &Value) -> Option<Map<String, Value>> {
    match mock {
        Value::Object(map) => Some(map.clone()),
        Value::String(text) => match serde_json::from_str(text) {
            Ok(Value::Object(map)) => Some(map),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::model::TRIGGER_TYPE_KEY;
    use serde_json::json;

    fn webhook() -> Node {
        Node::trigger("t")
            .with_config(TRIGGER_TYPE_KEY, WEBHOOK_TRIGGER)
            .with_config(MOCK_REQUEST_KEY, r#"{"event":"push"}"#)
    }

    #[test]
    fn test_base_payload() {
        let data = build_trigger_data(&Node::trigger("t"), None, 42);
        assert_eq!(data, json!({ "triggered": true, "timestamp": 42 }));
    }

    #[test]
    fn test_trigger_input_merged() {
        let input = json!({ "user": "ann", "triggered": "overridden" });
        let data = build_trigger_data(&Node::trigger("t"), Some(&input), 1);
        assert_eq!(data["user"], json!("ann"));
        assert_eq!(data["triggered"], json!("overridden"));
    }

    #[test]
    fn test_webhook_mock_used_without_input() {
        let data = build_trigger_data(&webhook(), Some(&json!({})), 1);
        assert_eq!(data["event"], json!("push"));
        assert_eq!(data["triggered"], json!(true));
    }

    #[test]
    fn test_webhook_mock_ignored_with_input() {
        let input = json!({ "event": "real" });
        let data = build_trigger_data(&webhook(), Some(&input), 1);
        assert_eq!(data["event"], json!("real"));
    }

    #[test]
    fn test_unparsable_mock_ignored() {
        let node = Node::trigger("t")
            .with_config(TRIGGER_TYPE_KEY, WEBHOOK_TRIGGER)
            .with_config(MOCK_REQUEST_KEY, "{oops");
        let data = build_trigger_data(&node, None, 1);
        assert_eq!(data, json!({ "triggered": true, "timestamp": 1 }));
    }

    #[test]
    fn test_mock_only_for_webhooks() {
        let node = Node::trigger("t").with_config(MOCK_REQUEST_KEY, r#"{"event":"push"}"#);
        let data = build_trigger_data(&node, None, 1);
        assert!(data.get("event").is_none());
    }
}

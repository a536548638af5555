//! Template Resolver
//!
//! Substitutes `{{@nodeId:Label.field}}` references in string configuration
//! values with data produced by earlier nodes.

use regex::Captures;
use serde_json::Value;

use crate::expression::value::format_number;
use crate::expression::REFERENCE_PATTERN;
use crate::workflow::model::{sanitize_node_id, ConfigMap, NodeOutput, OutputMap};

/// Top-level keys of the `{success, data, error}` step result wrapper.
const WRAPPER_KEYS: [&str; 3] = ["success", "data", "error"];

/// A reference token split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference<'a> {
    /// Raw node id as written in the token
    pub node_id: &'a str,
    /// Label plus field path, the text after the colon
    pub display: &'a str,
    /// Field path after the label, if any
    pub field_path: Option<&'a str>,
}

impl<'a> Reference<'a> {
    pub fn from_captures(caps: &Captures<'a>) -> Option<Self> {
        let node_id = caps.get(1)?.as_str();
        let display = caps.get(2)?.as_str();
        let field_path = display.find('.').map(|dot| &display[dot + 1..]);
        Some(Self {
            node_id,
            display,
            field_path,
        })
    }

    /// Output this reference points at, if it was produced.
    pub fn output<'o>(&self, outputs: &'o OutputMap) -> Option<&'o NodeOutput> {
        outputs.get(&sanitize_node_id(self.node_id))
    }
}

/// Walks a dotted field path through output data.
///
/// Step results shaped like `{success, data, ...}` are looked through
/// transparently unless the first field names one of the wrapper keys.
/// Returns `None` as soon as a segment cannot be followed.
pub fn lookup_field(data: &Value, field_path: &str) -> Option<Value> {
    let fields: Vec<&str> = field_path.split('.').collect();
    let mut current = data;

    if let Value::Object(map) = data {
        let is_wrapper = map.contains_key("success") && map.contains_key("data");
        if is_wrapper && !WRAPPER_KEYS.contains(&fields[0]) {
            current = &map["data"];
        }
    }

    let (last, parents) = fields.split_last()?;
    for field in parents {
        current = child(current, field)?;
    }

    match current {
        Value::Array(items) if *last == "length" => Some(Value::from(items.len())),
        other => child(other, last).cloned(),
    }
}

fn child<'v>(value: &'v Value, field: &str) -> Option<&'v Value> {
    match value {
        Value::Object(map) => map.get(field),
        Value::Array(items) => field.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

/// Renders a value the way it appears inside a resolved string.
///
/// `null` renders empty, objects and arrays as compact JSON.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                n.to_string()
            } else {
                format_number(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

/// Replaces every reference token in `text`.
///
/// Tokens naming a node with no output are left as written.
pub fn resolve_template(text: &str, outputs: &OutputMap) -> String {
    REFERENCE_PATTERN
        .replace_all(text, |caps: &Captures| {
            let token = caps[0].to_string();
            let Some(reference) = Reference::from_captures(caps) else {
                return token;
            };
            let Some(output) = reference.output(outputs) else {
                return token;
            };

            match reference.field_path {
                None => stringify(&output.data),
                Some(_) if output.data.is_null() => String::new(),
                Some(path) => lookup_field(&output.data, path)
                    .map(|v| stringify(&v))
                    .unwrap_or_default(),
            }
        })
        .into_owned()
}

/// Resolves templates in every string value of a configuration map.
///
/// Non-string values pass through unchanged.
pub fn process_templates(config: &ConfigMap, outputs: &OutputMap) -> ConfigMap {
    config
        .iter()
        .map(|(key, value)| {
            let resolved = match value {
                Value::String(text) if text.contains("{{@") => {
                    Value::String(resolve_template(text, outputs))
                }
                other => other.clone(),
            };
            (key.clone(), resolved)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn outputs(entries: Vec<(&str, Value)>) -> OutputMap {
        entries
            .into_iter()
            .map(|(id, data)| {
                (
                    id.to_string(),
                    NodeOutput {
                        label: "Label".to_string(),
                        data,
                    },
                )
            })
            .collect()
    }

    #[test]
    fn test_wrapped_output_is_unwrapped() {
        let outs = outputs(vec![("A", json!({ "success": true, "data": { "field": "x" } }))]);
        assert_eq!(resolve_template("{{@A:Label.field}}", &outs), "x");
        assert_eq!(resolve_template("{{@A:Label.success}}", &outs), "true");
        assert_eq!(
            resolve_template("{{@A:Label.data}}", &outs),
            r#"{"field":"x"}"#
        );
    }

    #[test]
    fn test_missing_output_leaves_token() {
        let outs = outputs(vec![]);
        assert_eq!(
            resolve_template("id={{@later:Later.id}}", &outs),
            "id={{@later:Later.id}}"
        );
    }

    #[test]
    fn test_null_output_renders_empty() {
        let outs = outputs(vec![("node_1", Value::Null)]);
        assert_eq!(resolve_template("[{{@node-1:Off.field}}]", &outs), "[]");
        assert_eq!(resolve_template("[{{@node-1:Off}}]", &outs), "[]");
    }

    #[test]
    fn test_whole_output_rendering() {
        let outs = outputs(vec![
            ("obj", json!({ "a": 1 })),
            ("num", json!(2.0)),
            ("text", json!("hi")),
        ]);
        assert_eq!(resolve_template("{{@obj:O}}", &outs), r#"{"a":1}"#);
        assert_eq!(resolve_template("{{@num:N}}", &outs), "2");
        assert_eq!(resolve_template("{{@text:T}}!", &outs), "hi!");
    }

    #[test]
    fn test_traversal_failure_renders_empty() {
        let outs = outputs(vec![("A", json!({ "user": { "name": "ann" } }))]);
        assert_eq!(resolve_template("{{@A:L.user.name}}", &outs), "ann");
        assert_eq!(resolve_template("{{@A:L.user.age}}", &outs), "");
        assert_eq!(resolve_template("{{@A:L.user.name.first}}", &outs), "");
    }

    #[test]
    fn test_array_fields() {
        let outs = outputs(vec![("A", json!({ "rows": [{ "id": 7 }, { "id": 8 }] }))]);
        assert_eq!(resolve_template("{{@A:L.rows.1.id}}", &outs), "8");
        assert_eq!(resolve_template("{{@A:L.rows.length}}", &outs), "2");
    }

    #[test]
    fn test_multiple_tokens() {
        let outs = outputs(vec![("a", json!({ "x": 1 })), ("b", json!({ "y": "z" }))]);
        assert_eq!(
            resolve_template("{{@a:A.x}}-{{@b:B.y}}", &outs),
            "1-z"
        );
    }

    #[test]
    fn test_process_templates_only_touches_strings() {
        let outs = outputs(vec![("a", json!({ "x": "v" }))]);
        let mut config = ConfigMap::new();
        config.insert("text".into(), json!("{{@a:A.x}}"));
        config.insert("count".into(), json!(3));
        config.insert("nested".into(), json!({ "t": "{{@a:A.x}}" }));

        let resolved = process_templates(&config, &outs);
        assert_eq!(resolved["text"], json!("v"));
        assert_eq!(resolved["count"], json!(3));
        assert_eq!(resolved["nested"], json!({ "t": "{{@a:A.x}}" }));
    }

    #[test]
    fn test_lookup_field_values() {
        let data = json!({ "success": true, "data": { "n": 5 }, "error": null });
        assert_eq!(lookup_field(&data, "n"), Some(json!(5)));
        assert_eq!(lookup_field(&data, "success"), Some(json!(true)));
        assert_eq!(lookup_field(&data, "missing"), None);
    }
}

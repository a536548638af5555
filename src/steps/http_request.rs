//! `HTTP Request` system action.

use std::time::Duration;

use futures::future::BoxFuture;
use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use serde_json::{json, Map, Value};

use crate::error::StepError;
use crate::execution::step::{StepHandler, StepInput};

pub const HTTP_REQUEST_ACTION: &str = "HTTP Request";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpRequestStep {
    client: reqwest::Client,
}

impl HttpRequestStep {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("nodeflow/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|e| {
                warn!("Falling back to default HTTP client: {}", e);
                reqwest::Client::new()
            });
        Self { client }
    }
}

impl Default for HttpRequestStep {
    fn default() -> Self {
        Self::new()
    }
}

/// Parses a field that may hold a JSON object or JSON text.
fn object_field(input: &StepInput, key: &str) -> Result<Option<Map<String, Value>>, String> {
    match input.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map.clone())),
        Some(Value::String(text)) if text.trim().is_empty() => Ok(None),
        Some(Value::String(text)) => match serde_json::from_str(text) {
            Ok(Value::Object(map)) => Ok(Some(map)),
            Ok(_) => Err(format!("{} must be a JSON object", key)),
            Err(e) => Err(format!("{} is not valid JSON: {}", key, e)),
        },
        Some(_) => Err(format!("{} must be a JSON object", key)),
    }
}

fn header_map(headers: &Map<String, Value>) -> Result<HeaderMap, String> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let text = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| format!("Invalid header name '{}': {}", name, e))?;
        let value = HeaderValue::from_str(&text)
            .map_err(|e| format!("Invalid value for header '{}': {}", name, e))?;
        map.insert(name, value);
    }
    Ok(map)
}

fn failure(message: impl Into<String>) -> Value {
    json!({ "success": false, "error": message.into() })
}

impl HttpRequestStep {
    async fn send(&self, input: StepInput) -> Value {
        let Some(endpoint) = input.get_str("endpoint") else {
            return failure("HTTP request requires an endpoint");
        };
        let method = input
            .get_str("httpMethod")
            .unwrap_or("GET")
            .to_ascii_uppercase();
        let method = match Method::from_bytes(method.as_bytes()) {
            Ok(method) => method,
            Err(_) => return failure(format!("Invalid HTTP method: {}", method)),
        };

        let headers = match object_field(&input, "httpHeaders").and_then(|h| {
            h.map(|h| header_map(&h)).transpose()
        }) {
            Ok(headers) => headers.unwrap_or_default(),
            Err(e) => return failure(e),
        };
        let body = match object_field(&input, "httpBody") {
            Ok(body) => body,
            Err(e) => return failure(e),
        };

        debug!("{} {}", method, endpoint);
        let mut request = self.client.request(method.clone(), endpoint).headers(headers);
        if let Some(body) = body.filter(|_| method != Method::GET) {
            request = request.json(&body);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return failure(format!("HTTP request failed: {}", e)),
        };

        let status = response.status();
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => return failure(format!("Failed to read response body: {}", e)),
        };

        if !status.is_success() {
            return failure(format!("HTTP request failed with status {}: {}", status.as_u16(), text));
        }

        let body = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));
        json!({
            "success": true,
            "data": { "status": status.as_u16(), "body": body },
        })
    }
}

impl StepHandler for HttpRequestStep {
    fn call(&self, input: StepInput) -> BoxFuture<'_, Result<Value, StepError>> {
        Box::pin(async move { Ok(self.send(input).await) })
    }
}

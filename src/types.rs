//! Chat completion request and listing types.

use crate::config::{RequestDefaults, DEFAULT_MODEL};
use serde::Serialize;
use serde_json::{json, Map, Value};

/// Request body sent to the NIM chat completions endpoint.
///
/// Fields are kept as raw JSON so that whatever the caller sent is forwarded
/// unchanged; only missing keys are replaced with defaults.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatCompletionRequest {
    pub model: Value,
    pub messages: Value,
    pub temperature: Value,
    pub top_p: Value,
    pub max_tokens: Value,
    pub stream: Value,
}

impl ChatCompletionRequest {
    /// Build the upstream request from an inbound OpenAI-style body.
    pub fn from_inbound(body: &Map<String, Value>, defaults: &RequestDefaults) -> Self {
        let field = |key: &str, default: Value| body.get(key).cloned().unwrap_or(default);

        Self {
            model: field("model", json!(defaults.model)),
            messages: field("messages", json!([])),
            temperature: field("temperature", json!(defaults.temperature)),
            top_p: field("top_p", json!(defaults.top_p)),
            max_tokens: field("max_tokens", json!(defaults.max_tokens)),
            stream: field("stream", json!(defaults.stream)),
        }
    }

    /// Whether the request asks for a streamed response.
    pub fn is_stream(&self) -> bool {
        is_truthy(&self.stream)
    }

    /// Model name for logging.
    pub fn model_name(&self) -> String {
        match &self.model {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Response for `GET /v1/models`
#[derive(Debug, Serialize)]
pub struct ModelList {
    pub object: &'static str,
    pub data: Vec<ModelCard>,
}

#[derive(Debug, Serialize)]
pub struct ModelCard {
    pub id: String,
    pub object: &'static str,
    pub created: u64,
    pub owned_by: &'static str,
}

impl Default for ModelList {
    fn default() -> Self {
        Self {
            object: "list",
            data: vec![ModelCard {
                id: DEFAULT_MODEL.to_string(),
                object: "model",
                created: 1686935002,
                owned_by: "nvidia",
            }],
        }
    }
}

/// Response for `GET /health`
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub api_key_configured: bool,
    pub base_url: String,
    pub model: String,
}

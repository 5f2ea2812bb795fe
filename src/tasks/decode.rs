//! Structured-output decoding.
//!
//! Tasks are asked to answer with an envelope
//!
//! ```json
//! { "agent_name": "Router", "response": { "issue_type": "billing", ... } }
//! ```
//!
//! Models often wrap it in a markdown code fence; one leading ```` ```json ````
//! (or bare ```` ``` ````) line and one trailing fence are stripped before
//! parsing.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use thiserror::Error;

/// Why a raw completion could not be used
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// Not a JSON object with a `response` mapping
    #[error("output is not a structured envelope: {0}")]
    NotAnEnvelope(String),

    /// Envelope parsed but `response` lacks the expected key
    #[error("envelope response is missing key '{0}'")]
    MissingKey(String),
}

impl DecodeError {
    /// Short tag fed back to the model
    pub fn kind(&self) -> &'static str {
        match self {
            DecodeError::NotAnEnvelope(_) => "NotAnEnvelope",
            DecodeError::MissingKey(_) => "MissingKey",
        }
    }
}

/// Decoded task output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
    pub response: Map<String, JsonValue>,
}

impl Envelope {
    /// Value under `response[key]`; strings verbatim, anything else as JSON text
    pub fn extract(&self, key: &str) -> Result<String, DecodeError> {
        match self.response.get(key) {
            Some(JsonValue::String(s)) => Ok(s.clone()),
            Some(other) => Ok(other.to_string()),
            None => Err(DecodeError::MissingKey(key.to_string())),
        }
    }
}

/// Remove one surrounding markdown code fence, if present
pub fn strip_code_fence(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```") {
        // Drop the info string (e.g. "json") up to the first newline
        text = match rest.find('\n') {
            Some(pos) => &rest[pos + 1..],
            None => rest.trim_start_matches("json"),
        };
    }
    if let Some(rest) = text.trim_end().strip_suffix("```") {
        text = rest;
    }
    text.trim()
}

/// Parse raw model text into an [`Envelope`]
pub fn decode(raw: &str) -> Result<Envelope, DecodeError> {
    let body = strip_code_fence(raw);
    let value: JsonValue =
        serde_json::from_str(body).map_err(|e| DecodeError::NotAnEnvelope(e.to_string()))?;

    let object = match value {
        JsonValue::Object(object) => object,
        other => {
            return Err(DecodeError::NotAnEnvelope(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            )))
        }
    };

    let agent_name = object
        .get("agent_name")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    let response = match object.get("response") {
        Some(JsonValue::Object(response)) => response.clone(),
        Some(other) => {
            return Err(DecodeError::NotAnEnvelope(format!(
                "'response' must be an object, got {}",
                json_kind(other)
            )))
        }
        None => return Err(DecodeError::NotAnEnvelope("missing 'response'".to_string())),
    };

    Ok(Envelope {
        agent_name,
        response,
    })
}

/// Decode and pull out `response[key]` in one step
pub fn decode_key(raw: &str, key: &str) -> Result<String, DecodeError> {
    decode(raw)?.extract(key)
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}

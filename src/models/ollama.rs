//! Ollama generation client
//!
//! Non-streaming completions from a local Ollama server:
//! - Endpoint: POST /api/generate
//! - `stream: false`, the whole completion arrives in one JSON body

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::TextGenerator;
use crate::errors::{AgentError, Result};

/// Default Ollama API endpoint
pub const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Default model
pub const DEFAULT_MODEL: &str = "qwen2.5:7b-instruct";

/// Connection-level timeout; per-call deadlines are applied by the caller
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

const BACKEND: &str = "ollama";

/// Ollama generation client
#[derive(Debug, Clone)]
pub struct OllamaGenerator {
    client: Client,
    base_url: String,
    model: String,
    temperature: f32,
}

impl OllamaGenerator {
    /// Create Ollama client with default settings
    pub fn new() -> Result<Self> {
        Self::with_config(DEFAULT_OLLAMA_URL, DEFAULT_MODEL, 0.2)
    }

    /// Create Ollama client with custom configuration
    pub fn with_config(base_url: &str, model: &str, temperature: f32) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(AgentError::HttpError)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            temperature,
        })
    }

    /// Check if Ollama is available
    pub async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/api/version", self.base_url);

        match self.client.get(&url).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, prompt: &str) -> OllamaGenerateRequest {
        OllamaGenerateRequest {
            model: self.model.clone(),
            prompt: prompt.to_string(),
            stream: false,
            options: Some(serde_json::json!({ "temperature": self.temperature })),
        }
    }
}

#[async_trait]
impl TextGenerator for OllamaGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&self.request(prompt))
            .send()
            .await
            .map_err(|e| AgentError::generation(BACKEND, format!("Failed to send request: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AgentError::generation(
                BACKEND,
                format!("HTTP {}: {}", status, error_text),
            ));
        }

        let body: OllamaGenerateResponse = response
            .json()
            .await
            .map_err(|e| AgentError::generation(BACKEND, format!("Failed to parse response: {}", e)))?;

        tracing::debug!(model = %self.model, chars = body.response.len(), "ollama completion");
        Ok(body.response)
    }

    fn name(&self) -> &str {
        BACKEND
    }
}

/// Ollama generate request
#[derive(Debug, Clone, Serialize)]
struct OllamaGenerateRequest {
    model: String,
    prompt: String,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<serde_json::Value>,
}

/// Ollama generate response (non-streaming)
#[derive(Debug, Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = OllamaGenerator::new().unwrap();
        assert_eq!(client.model(), DEFAULT_MODEL);
        assert_eq!(client.base_url(), DEFAULT_OLLAMA_URL);
        assert_eq!(client.name(), "ollama");
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let client = OllamaGenerator::with_config("http://localhost:11434/", "llama3.1:8b", 0.0).unwrap();
        assert_eq!(client.base_url(), "http://localhost:11434");
    }

    #[test]
    fn test_request_is_non_streaming() {
        let client = OllamaGenerator::new().unwrap();
        let json = serde_json::to_value(client.request("hello")).unwrap();
        assert_eq!(json["stream"], false);
        assert_eq!(json["prompt"], "hello");
        assert_eq!(json["model"], DEFAULT_MODEL);
    }

    #[test]
    fn test_response_parsing() {
        let body = r#"{"model":"qwen2.5:7b-instruct","response":"{\"a\":1}","done":true}"#;
        let parsed: OllamaGenerateResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.response, "{\"a\":1}");
    }

    #[tokio::test]
    #[ignore] // Integration test - requires a running Ollama
    async fn test_generate_live() {
        let client = OllamaGenerator::new().unwrap();
        let text = client.generate("Reply with the word ok").await.unwrap();
        assert!(!text.is_empty());
    }
}

//! Text-generation backends
//!
//! Tasks depend only on [`TextGenerator`]. Two implementations exist:
//! - [`OllamaGenerator`]: a locally hosted quantized model behind Ollama
//! - [`GeminiGenerator`]: the cloud-hosted Gemini API
//!
//! The backend is picked at runtime from `[generation]` in the config.

pub mod gemini;
pub mod ollama;

pub use gemini::GeminiGenerator;
pub use ollama::OllamaGenerator;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{Config, GeneratorBackend};
use crate::errors::{AgentError, Result};

/// Prompt in, text out
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Backend name for logs and errors
    fn name(&self) -> &str;
}

/// Build the configured generation backend
pub fn build_generator(config: &Config) -> Result<Arc<dyn TextGenerator>> {
    let generation = &config.generation;
    match generation.backend {
        GeneratorBackend::Ollama => Ok(Arc::new(OllamaGenerator::with_config(
            &generation.base_url,
            &generation.model,
            generation.temperature,
        )?)),
        GeneratorBackend::Gemini => {
            let api_key = config.generation_api_key().ok_or_else(|| {
                AgentError::ConfigError(format!(
                    "Gemini backend needs an API key in ${}",
                    generation.api_key_env
                ))
            })?;
            Ok(Arc::new(GeminiGenerator::new(
                &api_key,
                &generation.model,
                generation.temperature,
            )?))
        }
    }
}

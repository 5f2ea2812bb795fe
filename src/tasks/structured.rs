//! A single text-generation step.
//!
//! The prompt is the persona, the instructions and the context mapping,
//! joined by blank lines. Empty parts are left out.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::time::{Duration, Instant};

use crate::errors::{with_timeout, Result};
use crate::models::TextGenerator;

/// Role prompt prepended to a task's instructions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Persona {
    pub role: String,
    pub prompt: String,
}

impl Persona {
    pub fn new(role: &str, prompt: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            prompt: prompt.into(),
        }
    }
}

/// Keyed data passed to the model alongside the instructions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskContext(Map<String, JsonValue>);

impl TaskContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<JsonValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<JsonValue>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Unit of generation work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredTask {
    pub name: String,
    pub persona: Option<Persona>,
    pub instructions: String,
    pub context: TaskContext,
}

impl StructuredTask {
    pub fn new(name: &str, instructions: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            persona: None,
            instructions: instructions.into(),
            context: TaskContext::new(),
        }
    }

    pub fn with_persona(mut self, persona: Persona) -> Self {
        self.persona = Some(persona);
        self
    }

    pub fn with_context(mut self, context: TaskContext) -> Self {
        self.context = context;
        self
    }

    /// Full prompt text sent to the generator
    pub fn render(&self) -> Result<String> {
        let mut parts: Vec<String> = Vec::with_capacity(3);
        if let Some(persona) = &self.persona {
            if !persona.prompt.trim().is_empty() {
                parts.push(persona.prompt.trim_end().to_string());
            }
        }
        if !self.instructions.trim().is_empty() {
            parts.push(self.instructions.trim_end().to_string());
        }
        if !self.context.is_empty() {
            parts.push(format!(
                "Context:\n{}",
                serde_json::to_string_pretty(&self.context)?
            ));
        }
        Ok(parts.join("\n\n"))
    }

    /// Render and generate; returns the raw completion
    pub async fn execute(&self, generator: &dyn TextGenerator, timeout: Duration) -> Result<String> {
        let prompt = self.render()?;
        let start = Instant::now();
        let output = with_timeout(timeout, generator.generate(&prompt)).await?;
        tracing::debug!(
            task = %self.name,
            backend = generator.name(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "task generated"
        );
        Ok(output)
    }
}

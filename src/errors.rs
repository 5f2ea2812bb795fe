//! Error types for DeskPilot
//!
//! One error enum for the retrieval, cache and orchestration layers. Missing
//! data (no hit, no customer record) is never an error; it travels as
//! sentinel text instead.

use thiserror::Error;

use crate::tasks::decode::DecodeError;

/// Main error type for the support engine
#[derive(Error, Debug)]
pub enum AgentError {
    /// A query reached the engine without a tenant partition
    #[error("Tenant identifier is required for every query")]
    MissingTenant,

    /// A customer-scoped lookup was issued without a customer id
    #[error("Customer identifier is required for customer-scoped lookups")]
    MissingCustomer,

    /// The query lacks something the requested operation needs
    #[error("Query is missing required input: {0}")]
    MissingInput(String),

    /// Embedding provider failures
    #[error("Embedding failed: {0}")]
    EmbeddingError(String),

    /// Vector store failures
    #[error("Vector store error: {0}")]
    VectorStoreError(String),

    /// Text-generation backend failures
    #[error("Generation backend '{backend}' failed: {reason}")]
    GenerationError { backend: String, reason: String },

    /// Model output did not match the structured envelope
    #[error("Structured output error: {0}")]
    Decode(#[from] DecodeError),

    /// Pipeline references an upstream task that is not in the graph
    #[error("Task '{task}' depends on unknown task '{dependency}'")]
    UnknownDependency { task: String, dependency: String },

    /// Caller-declared order runs a task before one of its upstreams
    #[error("Task '{task}' is declared before its upstream '{dependency}'")]
    DependencyOrder { task: String, dependency: String },

    /// Dependency edges form a cycle
    #[error("Dependency cycle detected among tasks: {0:?}")]
    DependencyCycle(Vec<String>),

    /// Two tasks share a name
    #[error("Duplicate task name: {0}")]
    DuplicateTask(String),

    /// Pipeline has no tasks to run
    #[error("Pipeline is empty")]
    EmptyPipeline,

    /// A task failed and aborted the run
    #[error("Task '{task}' failed: {reason}")]
    TaskFailed { task: String, reason: String },

    /// Task state machine violations
    #[error("Invalid state transition from {from:?} to {to:?}: {reason}")]
    InvalidTransition {
        from: String,
        to: String,
        reason: String,
    },

    /// HTTP client errors
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Timeout errors
    #[error("Operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Generic errors with context
    #[error("Agent error: {0}")]
    Generic(String),
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, AgentError>;

impl AgentError {
    /// Network, quota and timeout failures from external capabilities.
    pub fn is_transient(&self) -> bool {
        match self {
            AgentError::Timeout { .. } => true,
            AgentError::HttpError(_) => true,
            AgentError::GenerationError { .. } => true,
            AgentError::VectorStoreError(_) => true,
            AgentError::EmbeddingError(_) => true,

            AgentError::MissingTenant => false,
            AgentError::MissingCustomer => false,
            AgentError::MissingInput(_) => false,
            AgentError::Decode(_) => false,
            AgentError::UnknownDependency { .. } => false,
            AgentError::DependencyOrder { .. } => false,
            AgentError::DependencyCycle(_) => false,
            AgentError::ConfigError(_) => false,

            _ => false,
        }
    }

    pub(crate) fn generation(backend: &str, reason: impl ToString) -> Self {
        AgentError::GenerationError {
            backend: backend.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Convert anyhow errors to AgentError
impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        AgentError::Generic(format!("{:#}", err))
    }
}

impl From<qdrant_client::QdrantError> for AgentError {
    fn from(err: qdrant_client::QdrantError) -> Self {
        AgentError::VectorStoreError(err.to_string())
    }
}

/// Run an external call under a deadline, mapping expiry to [`AgentError::Timeout`].
pub async fn with_timeout<T, F>(duration: std::time::Duration, fut: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    match tokio::time::timeout(duration, fut).await {
        Ok(result) => result,
        Err(_) => Err(AgentError::Timeout {
            duration_ms: duration.as_millis() as u64,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_error_display() {
        let err = AgentError::DependencyOrder {
            task: "GenerateResponse".to_string(),
            dependency: "AnalyzeSentiment".to_string(),
        };
        assert!(err.to_string().contains("GenerateResponse"));
        assert!(err.to_string().contains("AnalyzeSentiment"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(AgentError::Timeout { duration_ms: 10 }.is_transient());
        assert!(AgentError::generation("ollama", "503").is_transient());
        assert!(!AgentError::MissingTenant.is_transient());
        assert!(!AgentError::MissingCustomer.is_transient());
        assert!(!AgentError::ConfigError("bad".to_string()).is_transient());
    }

    #[tokio::test]
    async fn test_with_timeout_expires() {
        let result: Result<()> = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(AgentError::Timeout { duration_ms: 10 })));
    }

    #[tokio::test]
    async fn test_with_timeout_passes_through() {
        let result = with_timeout(Duration::from_secs(1), async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}

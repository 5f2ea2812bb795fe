//! Feedback-loop retry for structured tasks.
//!
//! Each attempt builds a fresh task (with the previous failure attached as
//! context), generates, decodes the envelope and extracts one key. Any
//! failure is fed back on the next attempt. After `max_attempts` failures the
//! caller's fallback text is returned instead of an error.
//!
//! Attempts are sequential and unbounded in wall time only by the per-call
//! generation timeout.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::decode::decode_key;
use super::structured::StructuredTask;
use crate::errors::AgentError;
use crate::models::TextGenerator;
use crate::telemetry::TelemetryCollector;

/// Default attempt budget
pub const MAX_ATTEMPTS: u32 = 5;

/// Context key under which feedback is injected
pub const FEEDBACK_KEY: &str = "error_in_prev_generated_response";

const FEEDBACK_INSTRUCTION: &str = "fix the above error by generating correct response";

/// Description of the previous attempt's failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    #[serde(rename = "type")]
    pub kind: String,
    pub instruction: String,
    pub previous_response: Option<String>,
}

impl Feedback {
    fn from_error(error: &AgentError, previous_response: Option<String>) -> Self {
        let kind = match error {
            AgentError::Decode(decode) => format!("{}: {}", decode.kind(), decode),
            other => other.to_string(),
        };
        Self {
            kind,
            instruction: FEEDBACK_INSTRUCTION.to_string(),
            previous_response,
        }
    }

    /// Attach to a task's context
    pub fn attach(&self, task: &mut StructuredTask) {
        // Feedback is plain data; serialising it cannot fail
        if let Ok(value) = serde_json::to_value(self) {
            task.context.insert(FEEDBACK_KEY, value);
        }
    }
}

/// Result of a feedback-wrapped run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackOutcome {
    /// Extracted value, or the fallback text
    pub value: String,
    /// Raw text of the last attempt that produced any
    pub last_raw: Option<String>,
    pub attempts: u32,
    /// True only when every attempt failed and `value` is the fallback
    pub need_decoding: bool,
}

impl FeedbackOutcome {
    pub fn used_fallback(&self) -> bool {
        self.need_decoding
    }
}

/// Bounded self-correcting executor
#[derive(Clone)]
pub struct FeedbackLoop {
    generator: Arc<dyn TextGenerator>,
    max_attempts: u32,
    timeout: Duration,
    telemetry: Option<TelemetryCollector>,
}

impl FeedbackLoop {
    pub fn new(generator: Arc<dyn TextGenerator>, timeout: Duration) -> Self {
        Self {
            generator,
            max_attempts: MAX_ATTEMPTS,
            timeout,
            telemetry: None,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_telemetry(mut self, telemetry: TelemetryCollector) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run `factory`'s task until `response[expected_key]` decodes.
    ///
    /// `factory` receives the previous attempt's failure (None on the first
    /// attempt) and must return the task to execute.
    pub async fn run<F>(&self, mut factory: F, expected_key: &str, fallback: &str) -> FeedbackOutcome
    where
        F: FnMut(Option<&Feedback>) -> StructuredTask,
    {
        let mut feedback: Option<Feedback> = None;
        let mut last_raw: Option<String> = None;
        let mut task_name = String::new();

        for attempt in 1..=self.max_attempts {
            let task = factory(feedback.as_ref());
            task_name.clone_from(&task.name);

            let raw = match task.execute(self.generator.as_ref(), self.timeout).await {
                Ok(raw) => raw,
                Err(err) => {
                    feedback = Some(self.record_failure(&task_name, attempt, &err, last_raw.clone()));
                    continue;
                }
            };

            match decode_key(&raw, expected_key) {
                Ok(value) => {
                    return FeedbackOutcome {
                        value,
                        last_raw: Some(raw),
                        attempts: attempt,
                        need_decoding: false,
                    }
                }
                Err(err) => {
                    let err = AgentError::from(err);
                    last_raw = Some(raw);
                    feedback = Some(self.record_failure(&task_name, attempt, &err, last_raw.clone()));
                }
            }
        }

        tracing::warn!(
            task = %task_name,
            attempts = self.max_attempts,
            "structured output never decoded; using fallback"
        );
        if let Some(telemetry) = &self.telemetry {
            telemetry.feedback_fallback(&task_name);
        }

        FeedbackOutcome {
            value: fallback.to_string(),
            last_raw,
            attempts: self.max_attempts,
            need_decoding: true,
        }
    }

    fn record_failure(
        &self,
        task: &str,
        attempt: u32,
        error: &AgentError,
        previous_response: Option<String>,
    ) -> Feedback {
        tracing::warn!(task, attempt, error = %error, "retrying with feedback");
        if let Some(telemetry) = &self.telemetry {
            telemetry.feedback_retry(task, attempt);
        }
        Feedback::from_error(error, previous_response)
    }
}

/// One-shot form of [`FeedbackLoop::run`]
pub async fn run_with_feedback<F>(
    generator: Arc<dyn TextGenerator>,
    timeout: Duration,
    factory: F,
    expected_key: &str,
    fallback: &str,
    max_attempts: u32,
) -> FeedbackOutcome
where
    F: FnMut(Option<&Feedback>) -> StructuredTask,
{
    FeedbackLoop::new(generator, timeout)
        .with_max_attempts(max_attempts)
        .run(factory, expected_key, fallback)
        .await
}

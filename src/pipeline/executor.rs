//! Sequential pipeline executor.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::graph::TaskGraph;
use super::state::{TaskEvent, TaskState};
use crate::errors::{AgentError, Result};
use crate::models::TextGenerator;
use crate::tasks::decode::decode_key;
use crate::telemetry::TelemetryCollector;

/// Final state of one task in a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRun {
    pub name: String,
    pub state: TaskState,
    /// Value handed to downstream tasks
    pub output: Option<String>,
    /// Raw completion, kept when `output` was decoded from it
    pub raw: Option<String>,
    pub duration_ms: u64,
}

/// Outcome of a successful pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    /// Tasks in the order they ran
    pub runs: Vec<TaskRun>,
    /// Output of the last task in execution order
    pub result: String,
}

impl PipelineReport {
    pub fn output(&self, task: &str) -> Option<&str> {
        self.runs
            .iter()
            .find(|r| r.name == task)
            .and_then(|r| r.output.as_deref())
    }

    pub fn order(&self) -> Vec<&str> {
        self.runs.iter().map(|r| r.name.as_str()).collect()
    }
}

/// Runs a [`TaskGraph`] one task at a time in dependency order
#[derive(Clone)]
pub struct PipelineExecutor {
    generator: Arc<dyn TextGenerator>,
    timeout: Duration,
    strict_order: bool,
    telemetry: Option<TelemetryCollector>,
}

impl PipelineExecutor {
    pub fn new(generator: Arc<dyn TextGenerator>, timeout: Duration) -> Self {
        Self {
            generator,
            timeout,
            strict_order: false,
            telemetry: None,
        }
    }

    /// Refuse graphs whose declaration list is not already a valid order
    pub fn with_strict_order(mut self, strict: bool) -> Self {
        self.strict_order = strict;
        self
    }

    pub fn with_telemetry(mut self, telemetry: TelemetryCollector) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Execute every task; the first failure aborts the run.
    pub async fn run(&self, graph: &TaskGraph) -> Result<PipelineReport> {
        if self.strict_order {
            graph.validate_declared_order()?;
        }
        let order = graph.topological_order()?;

        let mut outputs: HashMap<String, String> = HashMap::with_capacity(order.len());
        let mut runs: Vec<TaskRun> = Vec::with_capacity(order.len());

        for node in order {
            let mut state = TaskState::Pending.transition(TaskEvent::Start)?;
            let task = node.bind_upstream(&outputs);
            let start = Instant::now();

            let result = task.execute(self.generator.as_ref(), self.timeout).await;
            let duration_ms = start.elapsed().as_millis() as u64;

            match result {
                Ok(raw) => {
                    state = state.transition(TaskEvent::Succeed)?;
                    tracing::debug!(task = %node.name, duration_ms, "task completed");
                    self.record(&node.name, duration_ms, true);

                    let (output, raw) = match node.output_key.as_deref() {
                        None => (raw, None),
                        Some(key) => match decode_key(&raw, key) {
                            Ok(value) => (value, Some(raw)),
                            Err(err) => {
                                tracing::warn!(task = %node.name, error = %err, "output not decodable; passing raw text downstream");
                                (raw, None)
                            }
                        },
                    };
                    outputs.insert(node.name.clone(), output.clone());
                    runs.push(TaskRun {
                        name: node.name.clone(),
                        state,
                        output: Some(output),
                        raw,
                        duration_ms,
                    });
                }
                Err(err) => {
                    state = state.transition(TaskEvent::Fail)?;
                    tracing::warn!(task = %node.name, %state, error = %err, "task failed; aborting pipeline");
                    self.record(&node.name, duration_ms, false);
                    return Err(AgentError::TaskFailed {
                        task: node.name.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        let result = runs
            .last()
            .and_then(|r| r.output.clone())
            .ok_or(AgentError::EmptyPipeline)?;

        Ok(PipelineReport { runs, result })
    }

    fn record(&self, task: &str, duration_ms: u64, success: bool) {
        if let Some(telemetry) = &self.telemetry {
            telemetry.task_completed(task, duration_ms, success);
        }
    }
}

//! Per-task state machine
//!
//! Valid transitions:
//! 1. Pending → Running   (on: Start)
//! 2. Running → Completed (on: Succeed)
//! 3. Running → Failed    (on: Fail)
//!
//! Completed and Failed are terminal; any event on them is rejected.

use serde::{Deserialize, Serialize};

use crate::errors::{AgentError, Result};

/// Task execution states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskState {
    /// Waiting for upstream tasks
    Pending,
    /// Generation in flight
    Running,
    /// Output available (terminal)
    Completed,
    /// Aborted the run (terminal)
    Failed,
}

/// Events that trigger state transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskEvent {
    Start,
    Succeed,
    Fail,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed)
    }

    /// Attempt state transition with validation
    pub fn transition(&self, event: TaskEvent) -> Result<TaskState> {
        use TaskEvent::*;
        use TaskState::*;

        let next_state = match (self, event) {
            (Pending, Start) => Running,
            (Running, Succeed) => Completed,
            (Running, Fail) => Failed,

            (from, event) => {
                return Err(AgentError::InvalidTransition {
                    from: format!("{:?}", from),
                    to: format!("(via {:?})", event),
                    reason: format!("No valid transition from {:?} on {:?}", from, event),
                });
            }
        };

        Ok(next_state)
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            TaskState::Pending => "pending",
            TaskState::Running => "running",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
        };
        write!(f, "{}", label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let state = TaskState::Pending;
        let state = state.transition(TaskEvent::Start).unwrap();
        assert_eq!(state, TaskState::Running);
        let state = state.transition(TaskEvent::Succeed).unwrap();
        assert_eq!(state, TaskState::Completed);
        assert!(state.is_terminal());
    }

    #[test]
    fn test_failure_path() {
        let state = TaskState::Running.transition(TaskEvent::Fail).unwrap();
        assert_eq!(state, TaskState::Failed);
        assert!(state.is_terminal());
    }

    #[test]
    fn test_invalid_transitions() {
        assert!(TaskState::Pending.transition(TaskEvent::Succeed).is_err());
        assert!(TaskState::Running.transition(TaskEvent::Start).is_err());
        assert!(TaskState::Completed.transition(TaskEvent::Start).is_err());
        assert!(TaskState::Failed.transition(TaskEvent::Succeed).is_err());
    }
}

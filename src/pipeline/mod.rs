//! Dependency-aware task pipeline
//!
//! - `graph`: declared nodes and Kahn scheduling
//! - `executor`: sequential execution with abort-on-failure
//! - `state`: per-task state machine

pub mod executor;
pub mod graph;
pub mod state;

pub use executor::{PipelineExecutor, PipelineReport, TaskRun};
pub use graph::{TaskGraph, TaskNode};
pub use state::{TaskEvent, TaskState};

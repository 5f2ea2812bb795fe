//! Structured generation tasks
//!
//! - `structured`: one persona-driven generation step
//! - `decode`: envelope parsing with typed failures
//! - `feedback`: bounded self-correcting retry around a task
//! - `catalog`: the support personas

pub mod catalog;
pub mod decode;
pub mod feedback;
pub mod structured;

pub use decode::{decode, DecodeError, Envelope};
pub use feedback::{run_with_feedback, Feedback, FeedbackLoop, FeedbackOutcome, MAX_ATTEMPTS};
pub use structured::{Persona, StructuredTask, TaskContext};

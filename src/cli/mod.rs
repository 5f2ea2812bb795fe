//! CLI module for DeskPilot
//!
//! Handles command-line argument parsing and chat input.

pub mod args;
pub mod input;

pub use args::{Args, Commands, Verbosity};
pub use input::{Input, InputHandler};

//! DeskPilot - multi-tenant customer support engine
//!
//! Retrieval-and-orchestration core for a support assistant backed by a
//! vector store and a text-generation model.
//!
//! # Architecture
//!
//! - **Retrieval**: hybrid dense + sparse search fused by reciprocal rank,
//!   always filtered to one tenant (`rag`)
//! - **Cache**: semantic response cache keyed by query embedding (`cache`)
//! - **Orchestration**: structured tasks, self-correcting retries and a
//!   dependency-ordered pipeline (`tasks`, `pipeline`, `support`)

pub mod errors;

// Re-export commonly used types
pub use errors::{AgentError, Result};

// Capabilities
pub mod config;
pub mod memory;
pub mod models;
pub mod telemetry;

// Engine
pub mod cache;
pub mod pipeline;
pub mod rag;
pub mod tasks;

// Turn handling and CLI
pub mod cli;
pub mod support;

//! Storage capabilities
//!
//! Components:
//! - Embedding: dense and sparse text vectors, product-image vectors
//! - Vector DB: tenant-partitioned points with named vectors
//! - History: per-session conversation turns

pub mod embedding;
pub mod history;
pub mod vector_db;

pub use embedding::{Embedder, ImageEmbedder, LocalEmbedder, LocalImageEmbedder};
pub use history::{HistoryStore, InMemoryHistory, Message, Role};
pub use vector_db::{InMemoryStore, QdrantStore, Record, ScoredRecord, VectorStore};

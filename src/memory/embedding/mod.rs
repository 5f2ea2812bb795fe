//! Embedding providers.
//!
//! The [`Embedder`] trait is the capability the retriever and cache depend
//! on. [`LocalEmbedder`] runs a Candle BERT model for dense vectors and a
//! tokenizer-based lexical encoder for sparse vectors, both on the blocking
//! pool.
//!
//! [`ImageEmbedder`] maps a product photo into the `image` vector space of
//! the orders collection. [`LocalImageEmbedder`] runs a Candle CLIP vision
//! tower for it.

pub mod engine;
pub mod vision;
pub mod sparse;

pub use engine::{DenseEmbeddingEngine, DEFAULT_DENSE_MODEL};
pub use vision::{ImageEmbeddingEngine, DEFAULT_IMAGE_MODEL};
pub use sparse::{term_weights, SparseEncoder, DEFAULT_SPARSE_TOKENIZER};

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::errors::{with_timeout, AgentError, Result};
use crate::memory::vector_db::SparseVector;

/// Text to dense and sparse vectors
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_dense(&self, text: &str) -> Result<Vec<f32>>;

    async fn embed_sparse(&self, text: &str) -> Result<SparseVector>;

    /// Dense vector dimension
    fn dimension(&self) -> usize;
}

/// Image file to a vector in the orders collection's `image` field
#[async_trait]
pub trait ImageEmbedder: Send + Sync {
    async fn embed_image(&self, path: &Path) -> Result<Vec<f32>>;

    /// Image vector dimension
    fn dimension(&self) -> usize;
}

/// Local dense + sparse embedder
pub struct LocalEmbedder {
    dense: Arc<DenseEmbeddingEngine>,
    sparse: Arc<SparseEncoder>,
    timeout: Duration,
}

impl LocalEmbedder {
    /// Load both models (downloads on first use; blocking)
    pub fn load(config: &EmbeddingConfig, timeout: Duration) -> Result<Self> {
        let dense = DenseEmbeddingEngine::new(&config.dense_model)?;
        let sparse = SparseEncoder::new(&config.sparse_tokenizer)?;
        Ok(Self {
            dense: Arc::new(dense),
            sparse: Arc::new(sparse),
            timeout,
        })
    }
}

fn join_error(err: tokio::task::JoinError) -> AgentError {
    AgentError::EmbeddingError(format!("embedding worker panicked: {}", err))
}

#[async_trait]
impl Embedder for LocalEmbedder {
    async fn embed_dense(&self, text: &str) -> Result<Vec<f32>> {
        let engine = Arc::clone(&self.dense);
        let text = text.to_string();
        with_timeout(self.timeout, async move {
            tokio::task::spawn_blocking(move || engine.embed(&text))
                .await
                .map_err(join_error)?
                .map_err(|e| AgentError::EmbeddingError(format!("{:#}", e)))
        })
        .await
    }

    async fn embed_sparse(&self, text: &str) -> Result<SparseVector> {
        let encoder = Arc::clone(&self.sparse);
        let text = text.to_string();
        with_timeout(self.timeout, async move {
            tokio::task::spawn_blocking(move || encoder.encode(&text))
                .await
                .map_err(join_error)?
                .map_err(|e| AgentError::EmbeddingError(format!("{:#}", e)))
        })
        .await
    }

    fn dimension(&self) -> usize {
        self.dense.dimension()
    }
}

/// Local CLIP photo embedder
pub struct LocalImageEmbedder {
    engine: Arc<ImageEmbeddingEngine>,
    dimension: usize,
    timeout: Duration,
}

impl LocalImageEmbedder {
    /// Load the vision model (downloads on first use; blocking)
    pub fn load(config: &EmbeddingConfig, timeout: Duration) -> Result<Self> {
        let engine = ImageEmbeddingEngine::new(&config.image_model, &config.image_revision)?;
        Ok(Self {
            engine: Arc::new(engine),
            dimension: config.image_dim,
            timeout,
        })
    }
}

#[async_trait]
impl ImageEmbedder for LocalImageEmbedder {
    async fn embed_image(&self, path: &Path) -> Result<Vec<f32>> {
        let engine = Arc::clone(&self.engine);
        let path: PathBuf = path.to_path_buf();
        let vector = with_timeout(self.timeout, async move {
            tokio::task::spawn_blocking(move || engine.embed(&path))
                .await
                .map_err(join_error)?
                .map_err(|e| AgentError::EmbeddingError(format!("{:#}", e)))
        })
        .await?;

        // The orders collection was provisioned with `image_dim`
        if vector.len() != self.dimension {
            return Err(AgentError::EmbeddingError(format!(
                "image model produced {} dimensions, collection expects {}",
                vector.len(),
                self.dimension
            )));
        }
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

//! Vector store capability: named dense/sparse vectors plus an open payload.
//!
//! `QdrantStore` talks to a Qdrant server; `InMemoryStore` is a brute-force
//! store with the same filtering and ranking semantics, used offline and in
//! tests.

pub mod manager;
pub mod memory;

pub use manager::QdrantStore;
pub use memory::InMemoryStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::errors::{AgentError, Result};
use crate::rag::filter::FilterPredicate;

/// Name of the dense vector field on every point
pub const DENSE_VECTOR: &str = "dense";

/// Name of the sparse vector field on every point
pub const SPARSE_VECTOR: &str = "sparse";

/// Name of the optional product-image field on order points
pub const IMAGE_VECTOR: &str = "image";

/// Payload key holding the tenant partition
pub const TENANT_KEY: &str = "tenant_id";
pub const CUSTOMER_KEY: &str = "customer_id";
pub const SOURCE_TYPE_KEY: &str = "source_type";
pub const TAGS_KEY: &str = "tags";

/// Distance metric of a collection's dense field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Distance {
    /// Higher is better
    Cosine,
    /// Lower is better; scores are raw distances
    Euclid,
    /// Higher is better
    Dot,
}

impl Distance {
    /// Whether a smaller score ranks first
    pub fn ascending(&self) -> bool {
        matches!(self, Distance::Euclid)
    }
}

/// Sparse (index, weight) vector
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    pub indices: Vec<u32>,
    pub values: Vec<f32>,
}

impl SparseVector {
    pub fn new(indices: Vec<u32>, values: Vec<f32>) -> Self {
        Self { indices, values }
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Dot product over shared indices, `None` when no index overlaps.
    ///
    /// Indices without a paired value are ignored on either side.
    pub fn dot(&self, other: &SparseVector) -> Option<f32> {
        let mut score = 0.0;
        let mut overlap = false;
        for (idx, weight) in self.indices.iter().zip(&self.values) {
            let paired = other
                .indices
                .iter()
                .zip(&other.values)
                .find(|(i, _)| *i == idx);
            if let Some((_, other_weight)) = paired {
                score += weight * other_weight;
                overlap = true;
            }
        }
        overlap.then_some(score)
    }
}

/// An immutable point: dense vector, optional sparse and image vectors, and payload.
///
/// The tenant id lives in the payload under [`TENANT_KEY`] and is set at
/// construction; a record cannot exist without one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub dense: Vec<f32>,
    pub sparse: Option<SparseVector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<Vec<f32>>,
    pub payload: Map<String, JsonValue>,
}

impl Record {
    /// Create a record with a fresh UUID for `tenant_id`.
    pub fn new(tenant_id: &str, dense: Vec<f32>) -> Result<Self> {
        if tenant_id.trim().is_empty() {
            return Err(AgentError::MissingTenant);
        }
        let mut payload = Map::new();
        payload.insert(TENANT_KEY.to_string(), JsonValue::String(tenant_id.to_string()));
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            dense,
            sparse: None,
            image: None,
            payload,
        })
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_sparse(mut self, sparse: SparseVector) -> Self {
        self.sparse = Some(sparse);
        self
    }

    pub fn with_image(mut self, image: Vec<f32>) -> Self {
        self.image = Some(image);
        self
    }

    pub fn with_customer(self, customer_id: &str) -> Self {
        self.with_field(CUSTOMER_KEY, JsonValue::String(customer_id.to_string()))
    }

    pub fn with_source_type(self, source_type: &str) -> Self {
        self.with_field(SOURCE_TYPE_KEY, JsonValue::String(source_type.to_string()))
    }

    pub fn with_tags<I, S>(self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tags = tags.into_iter().map(|t| JsonValue::String(t.into())).collect();
        self.with_field(TAGS_KEY, JsonValue::Array(tags))
    }

    /// Set an arbitrary payload field. The tenant key cannot be overwritten.
    pub fn with_field(mut self, key: &str, value: JsonValue) -> Self {
        if key != TENANT_KEY {
            self.payload.insert(key.to_string(), value);
        }
        self
    }

    pub fn tenant_id(&self) -> &str {
        self.payload
            .get(TENANT_KEY)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
    }
}

/// Which named vector a search runs against
#[derive(Debug, Clone, PartialEq)]
pub enum NamedQuery {
    Dense(Vec<f32>),
    Sparse(SparseVector),
    /// Product-image embedding; only points with an image vector can match
    Image(Vec<f32>),
}

impl NamedQuery {
    pub fn vector_name(&self) -> &'static str {
        match self {
            NamedQuery::Dense(_) => DENSE_VECTOR,
            NamedQuery::Sparse(_) => SPARSE_VECTOR,
            NamedQuery::Image(_) => IMAGE_VECTOR,
        }
    }
}

/// A point returned by search or scroll
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredRecord {
    pub id: String,
    pub score: f32,
    pub payload: Map<String, JsonValue>,
}

/// Vector store capability consumed by the retriever and the cache
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Filtered nearest-neighbour search over one named vector, best first.
    async fn search(
        &self,
        collection: &str,
        query: &NamedQuery,
        filter: &FilterPredicate,
        limit: usize,
    ) -> Result<Vec<ScoredRecord>>;

    /// Insert or replace points by id.
    async fn upsert(&self, collection: &str, records: Vec<Record>) -> Result<()>;

    /// Unranked filtered lookup; `score` is 0.
    async fn scroll(
        &self,
        collection: &str,
        filter: &FilterPredicate,
        limit: usize,
    ) -> Result<Vec<ScoredRecord>>;
}

//! Brute-force in-process vector store.
//!
//! Scores and ordering follow Qdrant: cosine/dot similarities rank
//! descending, Euclidean distances ascending, sparse search is a dot product
//! over shared indices and skips points with no overlap. Image search uses
//! the collection metric and skips points without an image vector. Equal
//! scores keep insertion order.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{Distance, NamedQuery, Record, ScoredRecord, SparseVector, VectorStore};
use crate::config::CollectionsConfig;
use crate::errors::{AgentError, Result};
use crate::rag::filter::FilterPredicate;

#[derive(Debug, Default)]
struct Collection {
    distance: Option<Distance>,
    records: Vec<Record>,
}

/// In-memory vector store
#[derive(Debug, Default)]
pub struct InMemoryStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store with the four support collections pre-created.
    pub async fn with_collections(names: &CollectionsConfig) -> Self {
        let store = Self::new();
        store.create_collection(&names.user_data, Distance::Cosine).await;
        store.create_collection(&names.knowledge_base, Distance::Cosine).await;
        store.create_collection(&names.orders, Distance::Cosine).await;
        store.create_collection(&names.semantic_cache, Distance::Euclid).await;
        store
    }

    /// Create (or reset the metric of) a collection.
    pub async fn create_collection(&self, name: &str, distance: Distance) {
        let mut collections = self.collections.write().await;
        collections.entry(name.to_string()).or_default().distance = Some(distance);
    }

    /// Number of points in a collection (0 when missing).
    pub async fn count(&self, name: &str) -> usize {
        let collections = self.collections.read().await;
        collections.get(name).map(|c| c.records.len()).unwrap_or(0)
    }
}

fn not_found(name: &str) -> AgentError {
    AgentError::VectorStoreError(format!("Collection not found: {}", name))
}

fn dense_score(distance: Distance, query: &[f32], point: &[f32]) -> Result<f32> {
    if query.len() != point.len() {
        return Err(AgentError::VectorStoreError(format!(
            "Vector dimension mismatch: expected {}, got {}",
            point.len(),
            query.len()
        )));
    }
    let dot: f32 = query.iter().zip(point).map(|(a, b)| a * b).sum();
    Ok(match distance {
        Distance::Dot => dot,
        Distance::Cosine => {
            let nq = query.iter().map(|v| v * v).sum::<f32>().sqrt();
            let np = point.iter().map(|v| v * v).sum::<f32>().sqrt();
            if nq == 0.0 || np == 0.0 {
                0.0
            } else {
                dot / (nq * np)
            }
        }
        Distance::Euclid => query
            .iter()
            .zip(point)
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f32>()
            .sqrt(),
    })
}

fn sparse_score(query: &SparseVector, record: &Record) -> Option<f32> {
    record.sparse.as_ref().and_then(|s| query.dot(s))
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn search(
        &self,
        collection: &str,
        query: &NamedQuery,
        filter: &FilterPredicate,
        limit: usize,
    ) -> Result<Vec<ScoredRecord>> {
        let collections = self.collections.read().await;
        let coll = collections.get(collection).ok_or_else(|| not_found(collection))?;
        let distance = coll.distance.unwrap_or(Distance::Cosine);

        let mut scored = Vec::new();
        for record in coll.records.iter().filter(|r| filter.matches(&r.payload)) {
            let score = match query {
                NamedQuery::Dense(vector) => Some(dense_score(distance, vector, &record.dense)?),
                NamedQuery::Sparse(vector) => sparse_score(vector, record),
                NamedQuery::Image(vector) => match &record.image {
                    Some(image) => Some(dense_score(distance, vector, image)?),
                    None => None,
                },
            };
            if let Some(score) = score {
                scored.push(ScoredRecord {
                    id: record.id.clone(),
                    score,
                    payload: record.payload.clone(),
                });
            }
        }

        let ascending = !matches!(query, NamedQuery::Sparse(_)) && distance.ascending();
        scored.sort_by(|a, b| {
            let ord = a.score.partial_cmp(&b.score).unwrap_or(std::cmp::Ordering::Equal);
            if ascending {
                ord
            } else {
                ord.reverse()
            }
        });
        scored.truncate(limit);
        Ok(scored)
    }

    async fn upsert(&self, collection: &str, records: Vec<Record>) -> Result<()> {
        let mut collections = self.collections.write().await;
        let coll = collections
            .get_mut(collection)
            .ok_or_else(|| not_found(collection))?;

        for record in records {
            match coll.records.iter_mut().find(|r| r.id == record.id) {
                Some(existing) => *existing = record,
                None => coll.records.push(record),
            }
        }
        Ok(())
    }

    async fn scroll(
        &self,
        collection: &str,
        filter: &FilterPredicate,
        limit: usize,
    ) -> Result<Vec<ScoredRecord>> {
        let collections = self.collections.read().await;
        let coll = collections.get(collection).ok_or_else(|| not_found(collection))?;
        Ok(coll
            .records
            .iter()
            .filter(|r| filter.matches(&r.payload))
            .take(limit)
            .map(|r| ScoredRecord {
                id: r.id.clone(),
                score: 0.0,
                payload: r.payload.clone(),
            })
            .collect())
    }
}

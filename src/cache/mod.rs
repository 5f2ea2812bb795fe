//! Semantic response cache.
//!
//! Entries are keyed by the dense embedding of the query and scoped to one
//! (tenant, customer) pair. A lookup hits when the nearest entry lies within
//! `threshold` Euclidean distance, boundary included.
//!
//! Entries are append-only: no update, no dedup, no expiry. Growth is
//! unbounded.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::CacheConfig;
use crate::errors::{with_timeout, Result};
use crate::memory::embedding::Embedder;
use crate::memory::vector_db::{NamedQuery, Record, VectorStore};
use crate::rag::filter::FilterPredicate;
use crate::telemetry::TelemetryCollector;

/// Payload key holding the cached response text
pub const RESPONSE_KEY: &str = "response";

/// A cached query/response pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub id: String,
    pub query_vector: Vec<f32>,
    pub response: String,
    pub tenant_id: String,
    pub customer_id: String,
}

impl CacheEntry {
    fn into_record(self) -> Result<Record> {
        Ok(Record::new(&self.tenant_id, self.query_vector)?
            .with_id(self.id)
            .with_customer(&self.customer_id)
            .with_field(RESPONSE_KEY, JsonValue::String(self.response)))
    }
}

/// Semantic cache over a Euclidean vector collection
pub struct SemanticCache {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    collection: String,
    threshold: f32,
    store_timeout: Duration,
    telemetry: Option<TelemetryCollector>,
}

impl SemanticCache {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        collection: &str,
        config: &CacheConfig,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            embedder,
            collection: collection.to_string(),
            threshold: config.threshold,
            store_timeout,
            telemetry: None,
        }
    }

    pub fn with_telemetry(mut self, telemetry: TelemetryCollector) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Cached response for a semantically equivalent earlier query, if any
    pub async fn check(&self, query: &str, tenant_id: &str, customer_id: &str) -> Result<Option<String>> {
        let start = Instant::now();
        let filter = self.scope(tenant_id, customer_id)?;
        let vector = self.embedder.embed_dense(query).await?;

        let nearest = with_timeout(
            self.store_timeout,
            self.store
                .search(&self.collection, &NamedQuery::Dense(vector), &filter, 1),
        )
        .await?;

        let hit = nearest
            .into_iter()
            .next()
            .filter(|point| point.score <= self.threshold)
            .and_then(|point| {
                let distance = point.score;
                point
                    .payload
                    .get(RESPONSE_KEY)
                    .and_then(|v| v.as_str())
                    .map(|response| (distance, response.to_string()))
            });

        if let Some(telemetry) = &self.telemetry {
            telemetry.cache_lookup(hit.is_some());
        }

        match hit {
            Some((distance, response)) => {
                tracing::info!(
                    tenant = tenant_id,
                    distance,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "cache hit"
                );
                Ok(Some(response))
            }
            None => {
                tracing::info!(tenant = tenant_id, "cache miss");
                Ok(None)
            }
        }
    }

    /// Store a new entry; returns its id
    pub async fn add(
        &self,
        query: &str,
        response: &str,
        tenant_id: &str,
        customer_id: &str,
    ) -> Result<String> {
        // Validates the scope before spending an embedding call
        self.scope(tenant_id, customer_id)?;
        let query_vector = self.embedder.embed_dense(query).await?;

        let entry = CacheEntry {
            id: uuid::Uuid::new_v4().to_string(),
            query_vector,
            response: response.to_string(),
            tenant_id: tenant_id.to_string(),
            customer_id: customer_id.to_string(),
        };
        let id = entry.id.clone();

        with_timeout(
            self.store_timeout,
            self.store.upsert(&self.collection, vec![entry.into_record()?]),
        )
        .await?;

        tracing::debug!(tenant = tenant_id, id = %id, "added cache entry");
        Ok(id)
    }

    fn scope(&self, tenant_id: &str, customer_id: &str) -> Result<FilterPredicate> {
        FilterPredicate::for_customer(tenant_id, customer_id)
    }
}

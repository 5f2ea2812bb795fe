// Hybrid retrieval engine: dense + sparse prefetch fused into one ranking
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::RetrievalConfig;
use crate::errors::{with_timeout, Result};
use crate::memory::embedding::Embedder;
use crate::memory::vector_db::{NamedQuery, VectorStore};
use crate::rag::filter::FilterPredicate;
use crate::rag::fusion::{fuse, Channel, FusedHit, FusionMethod};
use crate::telemetry::TelemetryCollector;

/// Search parameters for one retrieval call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalQuery {
    pub query_text: String,
    pub tenant_id: String,
    pub source_type: Option<String>,
    pub tags: Option<Vec<String>>,
    pub customer_id: Option<String>,
    /// Candidates fetched per vector field before fusion
    pub k_prefetch: usize,
    pub top_k: usize,
    pub fusion: FusionMethod,
}

impl RetrievalQuery {
    pub fn new(query_text: &str, tenant_id: &str, config: &RetrievalConfig) -> Self {
        Self {
            query_text: query_text.to_string(),
            tenant_id: tenant_id.to_string(),
            source_type: None,
            tags: None,
            customer_id: None,
            k_prefetch: config.k_prefetch,
            top_k: config.top_k,
            fusion: FusionMethod::Rrf,
        }
    }

    pub fn source_type(mut self, source_type: &str) -> Self {
        self.source_type = Some(source_type.to_string());
        self
    }

    pub fn tags(mut self, tags: Vec<String>) -> Self {
        self.tags = Some(tags);
        self
    }

    pub fn customer(mut self, customer_id: &str) -> Self {
        self.customer_id = Some(customer_id.to_string());
        self
    }

    /// Payload predicate for this query; fails without a tenant, or with a
    /// blank customer when one was requested
    pub fn filter(&self) -> Result<FilterPredicate> {
        let mut filter = FilterPredicate::for_tenant(&self.tenant_id)?
            .source_type(self.source_type.as_deref())
            .tags(self.tags.as_deref());
        if let Some(customer_id) = &self.customer_id {
            filter = filter.customer(customer_id)?;
        }
        Ok(filter)
    }
}

/// Fused hits, best first, at most `top_k`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub hits: Vec<FusedHit>,
}

impl RetrievalResult {
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.hits.iter().map(|h| h.record.id.as_str()).collect()
    }
}

/// Hybrid retriever over one vector store
pub struct HybridRetriever {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    rrf_k: f64,
    store_timeout: Duration,
    telemetry: Option<TelemetryCollector>,
}

impl HybridRetriever {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        rrf_k: f64,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            embedder,
            rrf_k,
            store_timeout,
            telemetry: None,
        }
    }

    pub fn with_telemetry(mut self, telemetry: TelemetryCollector) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    /// Retrieve the best `top_k` records of `collection` for the query.
    ///
    /// Both prefetches must succeed; there is no partial fusion.
    pub async fn retrieve(&self, collection: &str, query: &RetrievalQuery) -> Result<RetrievalResult> {
        // Tenant check happens before any embedding or store call
        let filter = query.filter()?;

        let (dense, sparse) = tokio::try_join!(
            self.embedder.embed_dense(&query.query_text),
            self.embedder.embed_sparse(&query.query_text),
        )?;

        let dense_query = NamedQuery::Dense(dense);
        let sparse_query = NamedQuery::Sparse(sparse);
        let (dense_hits, sparse_hits) = tokio::try_join!(
            with_timeout(
                self.store_timeout,
                self.store.search(collection, &dense_query, &filter, query.k_prefetch),
            ),
            with_timeout(
                self.store_timeout,
                self.store.search(collection, &sparse_query, &filter, query.k_prefetch),
            ),
        )?;

        let candidates = dense_hits.len() + sparse_hits.len();
        tracing::debug!(
            collection,
            tenant = %query.tenant_id,
            dense = dense_hits.len(),
            sparse = sparse_hits.len(),
            "prefetch complete"
        );

        let hits = fuse(
            query.fusion,
            &[(Channel::Dense, dense_hits), (Channel::Sparse, sparse_hits)],
            self.rrf_k,
            query.top_k,
        );

        if let Some(telemetry) = &self.telemetry {
            telemetry.retrieval(candidates, hits.len());
        }

        Ok(RetrievalResult { hits })
    }
}

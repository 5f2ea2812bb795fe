// Hybrid retrieval
pub mod engine;

pub use engine::{HybridRetriever, RetrievalQuery, RetrievalResult};

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::config::RetrievalConfig;
    use crate::errors::{AgentError, Result};
    use crate::memory::embedding::{term_weights, Embedder};
    use crate::memory::vector_db::{
        Distance, InMemoryStore, NamedQuery, Record, ScoredRecord, SparseVector, VectorStore,
    };
    use crate::rag::filter::FilterPredicate;

    /// Embeds by keyword presence so rankings are predictable
    struct KeywordEmbedder;

    const VOCAB: [&str; 4] = ["refund", "shipping", "password", "invoice"];

    fn vector_for(text: &str) -> Vec<f32> {
        let lower = text.to_lowercase();
        VOCAB
            .iter()
            .map(|w| if lower.contains(w) { 1.0 } else { 0.0 })
            .collect()
    }

    fn sparse_for(text: &str) -> SparseVector {
        let lower = text.to_lowercase();
        let ids: Vec<u32> = VOCAB
            .iter()
            .enumerate()
            .filter(|(_, w)| lower.contains(*w))
            .map(|(i, _)| i as u32)
            .collect();
        term_weights(&ids)
    }

    #[async_trait]
    impl Embedder for KeywordEmbedder {
        async fn embed_dense(&self, text: &str) -> Result<Vec<f32>> {
            Ok(vector_for(text))
        }

        async fn embed_sparse(&self, text: &str) -> Result<SparseVector> {
            Ok(sparse_for(text))
        }

        fn dimension(&self) -> usize {
            VOCAB.len()
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        async fn embed_dense(&self, _text: &str) -> Result<Vec<f32>> {
            Err(AgentError::EmbeddingError("model offline".to_string()))
        }

        async fn embed_sparse(&self, text: &str) -> Result<SparseVector> {
            Ok(sparse_for(text))
        }

        fn dimension(&self) -> usize {
            VOCAB.len()
        }
    }

    fn doc(tenant: &str, id: &str, text: &str) -> Record {
        Record::new(tenant, vector_for(text))
            .unwrap()
            .with_id(id)
            .with_sparse(sparse_for(text))
            .with_source_type("faqs")
            .with_field("content", serde_json::json!(text))
    }

    async fn seeded() -> Arc<InMemoryStore> {
        let store = InMemoryStore::new();
        store.create_collection("knowledge_base", Distance::Cosine).await;
        store
            .upsert(
                "knowledge_base",
                vec![
                    doc("ecom", "kb-refund", "How do I get a refund"),
                    doc("ecom", "kb-ship", "Shipping times"),
                    doc("ecom", "kb-invoice", "Download an invoice"),
                    doc("fintech", "fx-refund", "Refund a card payment"),
                ],
            )
            .await
            .unwrap();
        Arc::new(store)
    }

    /// Delegates to a seeded store except for one vector field, which errors
    struct ChannelDown {
        inner: Arc<InMemoryStore>,
        down: &'static str,
    }

    #[async_trait]
    impl VectorStore for ChannelDown {
        async fn search(
            &self,
            collection: &str,
            query: &NamedQuery,
            filter: &FilterPredicate,
            limit: usize,
        ) -> Result<Vec<ScoredRecord>> {
            if query.vector_name() == self.down {
                return Err(AgentError::VectorStoreError(format!("{} index unavailable", self.down)));
            }
            self.inner.search(collection, query, filter, limit).await
        }

        async fn upsert(&self, collection: &str, records: Vec<Record>) -> Result<()> {
            self.inner.upsert(collection, records).await
        }

        async fn scroll(
            &self,
            collection: &str,
            filter: &FilterPredicate,
            limit: usize,
        ) -> Result<Vec<ScoredRecord>> {
            self.inner.scroll(collection, filter, limit).await
        }
    }

    fn retriever(store: Arc<dyn VectorStore>, embedder: Arc<dyn Embedder>) -> HybridRetriever {
        HybridRetriever::new(store, embedder, 60.0, Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_best_match_first_and_tenant_scoped() {
        let retriever = retriever(seeded().await, Arc::new(KeywordEmbedder));
        let query = RetrievalQuery::new("refund please", "ecom", &RetrievalConfig::default());

        let result = retriever.retrieve("knowledge_base", &query).await.unwrap();
        assert_eq!(result.hits[0].record.id, "kb-refund");
        assert!(result.len() <= 3);
        assert!(result
            .hits
            .iter()
            .all(|h| h.record.payload["tenant_id"] == "ecom"));
    }

    #[tokio::test]
    async fn test_missing_tenant_fails_before_embedding() {
        let retriever = retriever(seeded().await, Arc::new(FailingEmbedder));
        let query = RetrievalQuery::new("refund", "", &RetrievalConfig::default());
        let err = retriever.retrieve("knowledge_base", &query).await.unwrap_err();
        assert!(matches!(err, AgentError::MissingTenant));
    }

    #[tokio::test]
    async fn test_embedding_failure_propagates() {
        let retriever = retriever(seeded().await, Arc::new(FailingEmbedder));
        let query = RetrievalQuery::new("refund", "ecom", &RetrievalConfig::default());
        assert!(matches!(
            retriever.retrieve("knowledge_base", &query).await,
            Err(AgentError::EmbeddingError(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_prefetch_fails_whole_retrieval() {
        for down in ["sparse", "dense"] {
            let store = Arc::new(ChannelDown {
                inner: seeded().await,
                down,
            });
            let retriever = retriever(store, Arc::new(KeywordEmbedder));
            let query = RetrievalQuery::new("refund please", "ecom", &RetrievalConfig::default());

            // No fusion over the surviving channel
            match retriever.retrieve("knowledge_base", &query).await {
                Err(AgentError::VectorStoreError(reason)) => assert!(reason.contains(down)),
                Err(other) => panic!("unexpected error: {}", other),
                Ok(result) => panic!("partial result returned: {:?}", result.ids()),
            }
        }
    }

    #[tokio::test]
    async fn test_empty_tenant_partition_is_ok() {
        let retriever = retriever(seeded().await, Arc::new(KeywordEmbedder));
        let query = RetrievalQuery::new("refund", "healthcare", &RetrievalConfig::default());
        let result = retriever.retrieve("knowledge_base", &query).await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_source_type_filter_applies() {
        let retriever = retriever(seeded().await, Arc::new(KeywordEmbedder));
        let query = RetrievalQuery::new("refund", "ecom", &RetrievalConfig::default())
            .source_type("policies");
        assert!(retriever
            .retrieve("knowledge_base", &query)
            .await
            .unwrap()
            .is_empty());
    }
}

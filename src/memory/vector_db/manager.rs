// Vector store backed by a Qdrant server
use async_trait::async_trait;
use qdrant_client::{
    qdrant::{
        point_id::PointIdOptions, value::Kind, Condition, CreateCollectionBuilder,
        CreateFieldIndexCollectionBuilder, Distance as QdrantDistance, FieldType, Filter,
        NamedVectors, PointId, PointStruct, Query, QueryPointsBuilder, ScrollPointsBuilder,
        SparseVectorParamsBuilder, SparseVectorsConfigBuilder, UpsertPointsBuilder,
        Value as QdrantValue, Vector, VectorInput, VectorParamsBuilder, VectorsConfigBuilder,
    },
    Payload, Qdrant,
};
use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;

use super::{
    Distance, NamedQuery, Record, ScoredRecord, VectorStore, CUSTOMER_KEY, DENSE_VECTOR,
    IMAGE_VECTOR, SOURCE_TYPE_KEY, SPARSE_VECTOR, TAGS_KEY, TENANT_KEY,
};
use crate::config::{CollectionsConfig, QdrantConfig};
use crate::errors::Result;
use crate::rag::filter::{FieldCondition, FilterPredicate};

/// Payload fields that get a keyword index on every collection
const INDEXED_FIELDS: [&str; 5] = [TENANT_KEY, CUSTOMER_KEY, SOURCE_TYPE_KEY, TAGS_KEY, "order_id"];

/// Vector store manager using a Qdrant server over gRPC
pub struct QdrantStore {
    client: Qdrant,
    url: String,
}

impl QdrantStore {
    /// Connect to the configured Qdrant endpoint
    pub fn new(config: &QdrantConfig) -> Result<Self> {
        let mut builder = Qdrant::from_url(&config.url);
        if let Some(key) = &config.api_key {
            builder = builder.api_key(key.clone());
        }
        let client = builder.build()?;

        Ok(Self {
            client,
            url: config.url.clone(),
        })
    }

    /// Create the support collections and their payload indexes if missing.
    ///
    /// Record collections carry a dense and a sparse field, and orders also
    /// get an `image` field of `image_dim`; the cache collection is
    /// dense-only with Euclidean distance.
    pub async fn ensure_collections(
        &self,
        names: &CollectionsConfig,
        dense_dim: usize,
        image_dim: usize,
    ) -> Result<()> {
        let layout = [
            (names.user_data.as_str(), Distance::Cosine, true, false),
            (names.knowledge_base.as_str(), Distance::Cosine, true, false),
            (names.orders.as_str(), Distance::Cosine, true, true),
            (names.semantic_cache.as_str(), Distance::Euclid, false, false),
        ];

        for (name, distance, with_sparse, with_image) in layout {
            if self.client.collection_exists(name).await? {
                tracing::debug!(collection = name, "collection already exists");
                continue;
            }

            let mut vectors = VectorsConfigBuilder::default();
            vectors.add_named_vector_params(
                DENSE_VECTOR,
                VectorParamsBuilder::new(dense_dim as u64, to_qdrant_distance(distance)).on_disk(true),
            );
            if with_image {
                vectors.add_named_vector_params(
                    IMAGE_VECTOR,
                    VectorParamsBuilder::new(image_dim as u64, to_qdrant_distance(distance)).on_disk(true),
                );
            }

            let mut request = CreateCollectionBuilder::new(name)
                .vectors_config(vectors)
                .on_disk_payload(true);

            if with_sparse {
                let mut sparse = SparseVectorsConfigBuilder::default();
                sparse.add_named_vector_params(SPARSE_VECTOR, SparseVectorParamsBuilder::default());
                request = request.sparse_vectors_config(sparse);
            }

            self.client.create_collection(request).await?;

            for field in INDEXED_FIELDS {
                self.client
                    .create_field_index(CreateFieldIndexCollectionBuilder::new(
                        name,
                        field,
                        FieldType::Keyword,
                    ))
                    .await?;
            }
            tracing::info!(collection = name, ?distance, with_sparse, with_image, "created collection");
        }

        Ok(())
    }

    /// Server URL this store talks to
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn search(
        &self,
        collection: &str,
        query: &NamedQuery,
        filter: &FilterPredicate,
        limit: usize,
    ) -> Result<Vec<ScoredRecord>> {
        let input = match query {
            NamedQuery::Dense(vector) | NamedQuery::Image(vector) => VectorInput::new_dense(vector.clone()),
            NamedQuery::Sparse(vector) => {
                VectorInput::new_sparse(vector.indices.clone(), vector.values.clone())
            }
        };

        let request = QueryPointsBuilder::new(collection)
            .query(Query::new_nearest(input))
            .using(query.vector_name())
            .filter(to_qdrant_filter(filter))
            .limit(limit as u64)
            .with_payload(true);

        let response = self.client.query(request).await?;

        Ok(response
            .result
            .into_iter()
            .map(|point| ScoredRecord {
                id: point_id_to_string(&point.id),
                score: point.score,
                payload: payload_to_json(point.payload),
            })
            .collect())
    }

    async fn upsert(&self, collection: &str, records: Vec<Record>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut points = Vec::with_capacity(records.len());
        for record in records {
            let mut vectors =
                NamedVectors::default().add_vector(DENSE_VECTOR, Vector::new_dense(record.dense));
            if let Some(sparse) = record.sparse {
                vectors = vectors.add_vector(
                    SPARSE_VECTOR,
                    Vector::new_sparse(sparse.indices, sparse.values),
                );
            }
            if let Some(image) = record.image {
                vectors = vectors.add_vector(IMAGE_VECTOR, Vector::new_dense(image));
            }
            let payload = Payload::try_from(JsonValue::Object(record.payload))?;
            points.push(PointStruct::new(record.id, vectors, payload));
        }

        self.client
            .upsert_points(UpsertPointsBuilder::new(collection, points).wait(true))
            .await?;

        Ok(())
    }

    async fn scroll(
        &self,
        collection: &str,
        filter: &FilterPredicate,
        limit: usize,
    ) -> Result<Vec<ScoredRecord>> {
        let response = self
            .client
            .scroll(
                ScrollPointsBuilder::new(collection)
                    .filter(to_qdrant_filter(filter))
                    .limit(limit as u32)
                    .with_payload(true),
            )
            .await?;

        Ok(response
            .result
            .into_iter()
            .map(|point| ScoredRecord {
                id: point_id_to_string(&point.id),
                score: 0.0,
                payload: payload_to_json(point.payload),
            })
            .collect())
    }
}

// Helper functions for type conversions
fn to_qdrant_distance(distance: Distance) -> QdrantDistance {
    match distance {
        Distance::Cosine => QdrantDistance::Cosine,
        Distance::Euclid => QdrantDistance::Euclid,
        Distance::Dot => QdrantDistance::Dot,
    }
}

fn to_qdrant_filter(filter: &FilterPredicate) -> Filter {
    let conditions: Vec<Condition> = filter
        .conditions()
        .iter()
        .map(|condition| match condition {
            FieldCondition::Equals { key, value } => Condition::matches(key.as_str(), value.clone()),
            FieldCondition::AnyOf { key, values } => Condition::matches(key.as_str(), values.clone()),
        })
        .collect();
    Filter::must(conditions)
}

fn payload_to_json(payload: HashMap<String, QdrantValue>) -> Map<String, JsonValue> {
    payload
        .into_iter()
        .filter_map(|(key, value)| qdrant_to_json_value(&value).map(|v| (key, v)))
        .collect()
}

fn qdrant_to_json_value(value: &QdrantValue) -> Option<JsonValue> {
    value.kind.as_ref().map(|kind| match kind {
        Kind::StringValue(s) => JsonValue::String(s.clone()),
        Kind::IntegerValue(i) => JsonValue::Number((*i).into()),
        Kind::DoubleValue(f) => serde_json::Number::from_f64(*f)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        Kind::BoolValue(b) => JsonValue::Bool(*b),
        Kind::NullValue(_) => JsonValue::Null,
        Kind::ListValue(list) => JsonValue::Array(
            list.values
                .iter()
                .filter_map(qdrant_to_json_value)
                .collect(),
        ),
        Kind::StructValue(st) => JsonValue::Object(
            st.fields
                .iter()
                .filter_map(|(k, v)| qdrant_to_json_value(v).map(|v| (k.clone(), v)))
                .collect(),
        ),
    })
}

fn point_id_to_string(point_id: &Option<PointId>) -> String {
    point_id
        .as_ref()
        .and_then(|id| id.point_id_options.as_ref())
        .map(|options| match options {
            PointIdOptions::Num(n) => n.to_string(),
            PointIdOptions::Uuid(u) => u.clone(),
        })
        .unwrap_or_else(|| "unknown".to_string())
}

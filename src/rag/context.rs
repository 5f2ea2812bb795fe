// Context builder: per-source retrieval rendered as prompt-ready text
//
// Missing data is never an error here. Every lookup that finds nothing
// returns a fixed sentence the downstream task can read.
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{CollectionsConfig, RetrievalConfig};
use crate::errors::{with_timeout, Result};
use crate::memory::vector_db::{NamedQuery, ScoredRecord, SOURCE_TYPE_KEY};
use crate::rag::filter::FilterPredicate;
use crate::rag::retrieval::{HybridRetriever, RetrievalQuery, RetrievalResult};

/// Payload key for order identifiers in the orders collection
pub const ORDER_ID_KEY: &str = "order_id";

/// Returned when no order identifier could be extracted from the query
pub const NO_ORDER_ID: &str = "No order ID found in the user query";

pub fn no_knowledge_base(tenant_id: &str, source_type: &str, tags: Option<&[String]>) -> String {
    format!(
        "No relevant knowledge base found for tenant_id: {}, source_type: {} with tags: {} for this particular query",
        tenant_id,
        source_type,
        format_tags(tags)
    )
}

pub fn no_helpdesk_ticket(tenant_id: &str, customer_id: &str) -> String {
    format!(
        "No relevant customer helpdesk ticket found for this tenant_id: {} and customer_id: {} for this particular query.",
        tenant_id, customer_id
    )
}

pub fn no_customer_info(tenant_id: &str, customer_id: &str) -> String {
    format!(
        "No customer information found for this tenant_id: {} and customer_id: {}.",
        tenant_id, customer_id
    )
}

pub fn no_order_info(order_id: &str) -> String {
    format!("No order information found for order_id: {}.", order_id)
}

pub fn no_image_info(tenant_id: &str, customer_id: &str) -> String {
    format!(
        "No matching product image found for this tenant_id: {} and customer_id: {}.",
        tenant_id, customer_id
    )
}

fn format_tags(tags: Option<&[String]>) -> String {
    match tags {
        None => "None".to_string(),
        Some(tags) => {
            let quoted: Vec<String> = tags.iter().map(|t| format!("'{}'", t)).collect();
            format!("[{}]", quoted.join(", "))
        }
    }
}

/// Render hits without their point ids
pub fn render_hits(result: &RetrievalResult) -> Result<String> {
    let records: Vec<JsonValue> = result
        .hits
        .iter()
        .map(|hit| {
            json!({
                "similarity_with_query": hit.score,
                "payload": hit.record.payload,
            })
        })
        .collect();
    Ok(serde_json::to_string_pretty(&records)?)
}

fn render_scored(points: &[ScoredRecord]) -> Result<String> {
    let records: Vec<JsonValue> = points
        .iter()
        .map(|point| {
            json!({
                "similarity_with_query": point.score,
                "payload": point.payload,
            })
        })
        .collect();
    Ok(serde_json::to_string_pretty(&records)?)
}

/// Normalise an extracted value; quotes are stripped and placeholders such
/// as "None" count as absent
pub fn clean_extracted(raw: Option<&str>) -> Option<String> {
    let value = raw?.trim().trim_matches('"').trim();
    let placeholder = value.is_empty()
        || value.eq_ignore_ascii_case("none")
        || value.eq_ignore_ascii_case("null")
        || value.eq_ignore_ascii_case("n/a");
    (!placeholder).then(|| value.to_string())
}

/// Normalise an extracted order id
pub fn clean_order_id(raw: Option<&str>) -> Option<String> {
    clean_extracted(raw).filter(|id| id != NO_ORDER_ID)
}

/// Context builder over the support collections
pub struct ContextBuilder {
    retriever: Arc<HybridRetriever>,
    collections: CollectionsConfig,
    retrieval: RetrievalConfig,
    store_timeout: Duration,
}

impl ContextBuilder {
    pub fn new(
        retriever: Arc<HybridRetriever>,
        collections: CollectionsConfig,
        retrieval: RetrievalConfig,
        store_timeout: Duration,
    ) -> Self {
        Self {
            retriever,
            collections,
            retrieval,
            store_timeout,
        }
    }

    /// FAQs, policies or handbook entries related to the query
    pub async fn knowledge_base(
        &self,
        query: &str,
        tenant_id: &str,
        source_type: &str,
        tags: Option<&[String]>,
    ) -> Result<String> {
        let mut request = RetrievalQuery::new(query, tenant_id, &self.retrieval).source_type(source_type);
        if let Some(tags) = tags {
            request = request.tags(tags.to_vec());
        }

        let result = self
            .retriever
            .retrieve(&self.collections.knowledge_base, &request)
            .await?;
        if result.is_empty() {
            return Ok(no_knowledge_base(tenant_id, source_type, tags));
        }
        render_hits(&result)
    }

    /// Helpdesk tickets of this customer related to the query
    pub async fn helpdesk(&self, query: &str, tenant_id: &str, customer_id: &str) -> Result<String> {
        let request = RetrievalQuery::new(query, tenant_id, &self.retrieval)
            .source_type("helpdesk")
            .customer(customer_id);

        let result = self
            .retriever
            .retrieve(&self.collections.user_data, &request)
            .await?;
        if result.is_empty() {
            return Ok(no_helpdesk_ticket(tenant_id, customer_id));
        }
        render_hits(&result)
    }

    /// CRM record of the customer (exact lookup)
    pub async fn customer_info(&self, tenant_id: &str, customer_id: &str) -> Result<String> {
        let filter = FilterPredicate::for_customer(tenant_id, customer_id)?.equals(SOURCE_TYPE_KEY, "crm");

        let records = with_timeout(
            self.store_timeout,
            self.retriever
                .store()
                .scroll(&self.collections.user_data, &filter, 1),
        )
        .await?;

        match records.into_iter().next() {
            Some(record) => Ok(serde_json::to_string_pretty(&record.payload)?),
            None => Ok(no_customer_info(tenant_id, customer_id)),
        }
    }

    /// Order record for an extracted order id (exact lookup)
    pub async fn order_info(
        &self,
        tenant_id: &str,
        customer_id: &str,
        order_id: Option<&str>,
    ) -> Result<String> {
        // Scope check first, even when there is nothing to look up
        let filter = FilterPredicate::for_customer(tenant_id, customer_id)?;
        let order_id = match clean_order_id(order_id) {
            Some(id) => id,
            None => return Ok(NO_ORDER_ID.to_string()),
        };

        let filter = filter.equals(ORDER_ID_KEY, &order_id);
        let records = with_timeout(
            self.store_timeout,
            self.retriever
                .store()
                .scroll(&self.collections.orders, &filter, 1),
        )
        .await?;

        match records.into_iter().next() {
            Some(record) => Ok(serde_json::to_string_pretty(&record.payload)?),
            None => Ok(no_order_info(&order_id)),
        }
    }

    /// This customer's orders whose reference image is closest to `image`
    pub async fn image_info(&self, tenant_id: &str, customer_id: &str, image: Vec<f32>) -> Result<String> {
        let filter = FilterPredicate::for_customer(tenant_id, customer_id)?;
        let hits = with_timeout(
            self.store_timeout,
            self.retriever.store().search(
                &self.collections.orders,
                &NamedQuery::Image(image),
                &filter,
                IMAGE_MATCHES,
            ),
        )
        .await?;

        if hits.is_empty() {
            return Ok(no_image_info(tenant_id, customer_id));
        }
        render_scored(&hits)
    }
}

/// Orders returned by an image lookup
const IMAGE_MATCHES: usize = 1;

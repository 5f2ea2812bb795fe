//! Photo-based return checks.
//!
//! The user names an order and the path of a photo of the item. The photo is
//! matched against the reference images of the customer's orders and a
//! checker task compares the match with the original order record.

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{with_feedback, SupportAgent};
use crate::errors::{AgentError, Result};
use crate::rag::context::{clean_extracted, clean_order_id, NO_ORDER_ID};
use crate::rag::filter::FilterPredicate;
use crate::tasks::catalog::{self, TaskSpec};
use crate::tasks::decode::{decode, Envelope};

/// Which comparison to run on a returned item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnCheck {
    /// Same product, damage tolerated
    Validation,
    /// Same product and undamaged
    QualityCheck,
}

impl ReturnCheck {
    pub fn spec(&self) -> &'static TaskSpec {
        match self {
            ReturnCheck::Validation => &catalog::RETURN_VALIDATOR,
            ReturnCheck::QualityCheck => &catalog::QUALITY_CHECKER,
        }
    }
}

/// Decoded checker answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnVerdict {
    pub check: ReturnCheck,
    pub order_id: Option<String>,
    pub is_same_product: bool,
    /// Only reported by [`ReturnCheck::QualityCheck`]
    pub defect_detected: Option<bool>,
    pub is_returnable: bool,
    pub reason: String,
}

impl ReturnVerdict {
    fn from_envelope(check: ReturnCheck, order_id: Option<String>, envelope: &Envelope) -> Result<Self> {
        let defect_detected = match check {
            ReturnCheck::Validation => None,
            ReturnCheck::QualityCheck => Some(yes(&envelope.extract("defect_detected")?)),
        };
        Ok(Self {
            check,
            order_id,
            is_same_product: yes(&envelope.extract("is_same_product")?),
            defect_detected,
            is_returnable: yes(&envelope.extract("is_returnable")?),
            reason: envelope.extract("concise_reason").unwrap_or_default(),
        })
    }
}

fn yes(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("yes")
}

/// Checker input: the order record above the closest image match
pub fn comparison_context(order_info: &str, image_info: &str) -> String {
    format!(
        "Original Product Info\n---------------------\n{}\n\nRetrieved Image Info\n--------------------\n{}",
        order_info, image_info
    )
}

impl SupportAgent {
    /// Check a returned item against the order it claims to come from.
    ///
    /// Needs an image embedder (see [`SupportAgent::with_image_embedder`])
    /// and an image path in the query.
    pub async fn check_return(
        &self,
        tenant_id: &str,
        customer_id: &str,
        query: &str,
        check: ReturnCheck,
    ) -> Result<ReturnVerdict> {
        FilterPredicate::for_customer(tenant_id, customer_id)?;
        let embedder = self
            .image_embedder
            .as_ref()
            .ok_or_else(|| AgentError::ConfigError("no image embedder configured".to_string()))?;

        let image_path = self
            .feedback
            .run(
                |fb| with_feedback(catalog::IMAGE_PATH_EXTRACTOR.task(query), fb),
                catalog::IMAGE_PATH_EXTRACTOR.key,
                "",
            )
            .await;
        let image_path = clean_extracted(Some(&image_path.value))
            .ok_or_else(|| AgentError::MissingInput("image path".to_string()))?;

        let order_id = self
            .feedback
            .run(
                |fb| with_feedback(catalog::ORDER_ID_EXTRACTOR.task(query), fb),
                catalog::ORDER_ID_EXTRACTOR.key,
                NO_ORDER_ID,
            )
            .await;
        let order_id = clean_order_id(Some(&order_id.value));

        let order_info = self
            .context
            .order_info(tenant_id, customer_id, order_id.as_deref())
            .await?;
        let image = embedder.embed_image(Path::new(&image_path)).await?;
        let image_info = self.context.image_info(tenant_id, customer_id, image).await?;
        tracing::debug!(?check, image = %image_path, order = ?order_id, "comparing returned item");

        let spec = check.spec();
        let instructions = comparison_context(&order_info, &image_info);
        let outcome = self
            .feedback
            .run(
                |fb| with_feedback(spec.task(instructions.as_str()), fb),
                spec.key,
                "",
            )
            .await;

        let raw = match (outcome.used_fallback(), outcome.last_raw) {
            (false, Some(raw)) => raw,
            _ => {
                return Err(AgentError::TaskFailed {
                    task: spec.name.to_string(),
                    reason: format!("no decodable verdict after {} attempts", outcome.attempts),
                })
            }
        };
        ReturnVerdict::from_envelope(check, order_id, &decode(&raw)?)
    }
}

//! Payload filter predicates.
//!
//! A predicate is a conjunction of equality and match-any conditions. It can
//! only be built from a tenant id, so every query the engine issues is
//! partitioned; there is no "all tenants" predicate.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::errors::{AgentError, Result};
use crate::memory::vector_db::{CUSTOMER_KEY, SOURCE_TYPE_KEY, TAGS_KEY, TENANT_KEY};

/// A single payload condition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldCondition {
    /// Field equals `value` (for list fields: contains it)
    Equals { key: String, value: String },
    /// Field matches at least one of `values`
    AnyOf { key: String, values: Vec<String> },
}

impl FieldCondition {
    pub fn key(&self) -> &str {
        match self {
            FieldCondition::Equals { key, .. } | FieldCondition::AnyOf { key, .. } => key,
        }
    }

    fn matches(&self, payload: &Map<String, JsonValue>) -> bool {
        let stored = match payload.get(self.key()) {
            Some(value) => keywords(value),
            None => return false,
        };
        match self {
            FieldCondition::Equals { value, .. } => stored.iter().any(|s| s == value),
            FieldCondition::AnyOf { values, .. } => {
                stored.iter().any(|s| values.iter().any(|v| v == s))
            }
        }
    }
}

/// Conjunction of conditions, always including the tenant clause
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterPredicate {
    tenant_id: String,
    conditions: Vec<FieldCondition>,
}

impl FilterPredicate {
    /// Start a predicate scoped to `tenant_id`. Blank ids are rejected.
    pub fn for_tenant(tenant_id: &str) -> Result<Self> {
        let tenant_id = tenant_id.trim();
        if tenant_id.is_empty() {
            return Err(AgentError::MissingTenant);
        }
        Ok(Self {
            tenant_id: tenant_id.to_string(),
            conditions: vec![FieldCondition::Equals {
                key: TENANT_KEY.to_string(),
                value: tenant_id.to_string(),
            }],
        })
    }

    pub fn equals(mut self, key: &str, value: &str) -> Self {
        self.conditions.push(FieldCondition::Equals {
            key: key.to_string(),
            value: value.to_string(),
        });
        self
    }

    pub fn any_of(mut self, key: &str, values: &[String]) -> Self {
        self.conditions.push(FieldCondition::AnyOf {
            key: key.to_string(),
            values: values.to_vec(),
        });
        self
    }

    pub fn source_type(self, source_type: Option<&str>) -> Self {
        match source_type {
            Some(s) if !s.is_empty() => self.equals(SOURCE_TYPE_KEY, s),
            _ => self,
        }
    }

    /// Add an exact customer clause. Blank ids are rejected, never skipped.
    pub fn customer(self, customer_id: &str) -> Result<Self> {
        let customer_id = customer_id.trim();
        if customer_id.is_empty() {
            return Err(AgentError::MissingCustomer);
        }
        Ok(self.equals(CUSTOMER_KEY, customer_id))
    }

    /// Predicate scoped to one customer of one tenant
    pub fn for_customer(tenant_id: &str, customer_id: &str) -> Result<Self> {
        Self::for_tenant(tenant_id)?.customer(customer_id)
    }

    pub fn tags(self, tags: Option<&[String]>) -> Self {
        match tags {
            Some(t) if !t.is_empty() => self.any_of(TAGS_KEY, t),
            _ => self,
        }
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn conditions(&self) -> &[FieldCondition] {
        &self.conditions
    }

    /// Evaluate against a payload (used by stores without native filtering).
    pub fn matches(&self, payload: &Map<String, JsonValue>) -> bool {
        self.conditions.iter().all(|c| c.matches(payload))
    }
}

/// Keyword view of a payload value: strings as-is, lists flattened,
/// numbers and booleans stringified.
fn keywords(value: &JsonValue) -> Vec<String> {
    match value {
        JsonValue::String(s) => vec![s.clone()],
        JsonValue::Number(n) => vec![n.to_string()],
        JsonValue::Bool(b) => vec![b.to_string()],
        JsonValue::Array(items) => items.iter().flat_map(keywords).collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: JsonValue) -> Map<String, JsonValue> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_tenant_clause_always_present() {
        let filter = FilterPredicate::for_tenant("ecom").unwrap();
        assert_eq!(filter.conditions().len(), 1);
        assert_eq!(filter.conditions()[0].key(), TENANT_KEY);
    }

    #[test]
    fn test_blank_tenant_rejected() {
        assert!(matches!(
            FilterPredicate::for_tenant(""),
            Err(AgentError::MissingTenant)
        ));
        assert!(FilterPredicate::for_tenant("   ").is_err());
    }

    #[test]
    fn test_optional_clauses_skipped_when_absent() {
        let filter = FilterPredicate::for_tenant("ecom")
            .unwrap()
            .source_type(None)
            .tags(Some(&[][..]));
        assert_eq!(filter.conditions().len(), 1);
    }

    #[test]
    fn test_blank_customer_rejected() {
        let filter = FilterPredicate::for_tenant("ecom").unwrap();
        assert!(matches!(
            filter.clone().customer(""),
            Err(AgentError::MissingCustomer)
        ));
        assert!(matches!(
            FilterPredicate::for_customer("ecom", "  "),
            Err(AgentError::MissingCustomer)
        ));
        assert!(matches!(
            FilterPredicate::for_customer("", "CUST-010"),
            Err(AgentError::MissingTenant)
        ));
    }

    #[test]
    fn test_customer_clause_never_matches_other_customers() {
        let filter = FilterPredicate::for_customer("ecom", "CUST-010").unwrap();
        assert_eq!(filter.conditions().len(), 2);
        assert!(!filter.matches(&payload(json!({
            "tenant_id": "ecom", "customer_id": "CUST-011"
        }))));
    }

    #[test]
    fn test_matches_conjunction() {
        let filter = FilterPredicate::for_tenant("ecom")
            .unwrap()
            .source_type(Some("faqs"))
            .customer("CUST-010")
            .unwrap();

        assert!(filter.matches(&payload(json!({
            "tenant_id": "ecom", "source_type": "faqs", "customer_id": "CUST-010"
        }))));
        assert!(!filter.matches(&payload(json!({
            "tenant_id": "fintech", "source_type": "faqs", "customer_id": "CUST-010"
        }))));
        assert!(!filter.matches(&payload(json!({
            "tenant_id": "ecom", "source_type": "faqs"
        }))));
    }

    #[test]
    fn test_tags_match_any() {
        let tags = vec!["payments".to_string(), "refunds".to_string()];
        let filter = FilterPredicate::for_tenant("ecom").unwrap().tags(Some(tags.as_slice()));

        assert!(filter.matches(&payload(json!({
            "tenant_id": "ecom", "tags": ["shipping", "refunds"]
        }))));
        assert!(!filter.matches(&payload(json!({
            "tenant_id": "ecom", "tags": ["shipping"]
        }))));
    }
}

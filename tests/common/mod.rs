//! Shared fixtures: deterministic embedder, scripted generator, seeded store.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::json;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::{Arc, Mutex};

use deskpilot::config::{CollectionsConfig, Config};
use deskpilot::memory::embedding::term_weights;
use deskpilot::memory::vector_db::SparseVector;
use deskpilot::memory::{Embedder, ImageEmbedder, InMemoryStore, Record, VectorStore};
use deskpilot::models::TextGenerator;
use deskpilot::tasks::catalog::{self, TaskSpec};
use deskpilot::Result;

pub const DIM: usize = 32;

/// Reference image of ORD-0042 in the seeded orders collection
pub const ORDER_IMAGE: [f32; 4] = [0.0, 1.0, 0.0, 0.0];

fn token_id(token: &str) -> u32 {
    let mut hasher = DefaultHasher::new();
    token.hash(&mut hasher);
    (hasher.finish() % 30_000) as u32
}

fn tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '-')
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Hashed bag-of-words embedder: same text, same vectors
#[derive(Default)]
pub struct HashEmbedder {
    pub dense_calls: Mutex<usize>,
}

impl HashEmbedder {
    pub fn dense(text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; DIM];
        for token in tokens(text) {
            v[token_id(&token) as usize % DIM] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        v
    }

    pub fn sparse(text: &str) -> SparseVector {
        let ids: Vec<u32> = tokens(text).iter().map(|t| token_id(t)).collect();
        term_weights(&ids)
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed_dense(&self, text: &str) -> Result<Vec<f32>> {
        *self.dense_calls.lock().unwrap() += 1;
        Ok(Self::dense(text))
    }

    async fn embed_sparse(&self, text: &str) -> Result<SparseVector> {
        Ok(Self::sparse(text))
    }

    fn dimension(&self) -> usize {
        DIM
    }
}

/// Looks image paths up in a fixed table
pub struct TableImageEmbedder(HashMap<String, Vec<f32>>);

impl TableImageEmbedder {
    pub fn new(entries: &[(&str, Vec<f32>)]) -> Arc<Self> {
        Arc::new(Self(
            entries.iter().map(|(p, v)| (p.to_string(), v.clone())).collect(),
        ))
    }
}

#[async_trait]
impl ImageEmbedder for TableImageEmbedder {
    async fn embed_image(&self, path: &Path) -> Result<Vec<f32>> {
        let key = path.to_string_lossy().to_string();
        self.0
            .get(&key)
            .cloned()
            .ok_or_else(|| deskpilot::AgentError::EmbeddingError(format!("unreadable image {}", key)))
    }

    fn dimension(&self) -> usize {
        ORDER_IMAGE.len()
    }
}

/// Replies per persona; counts every call
pub struct ScriptedGenerator {
    replies: Mutex<HashMap<&'static str, String>>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    /// Every persona answers with a valid envelope
    pub fn well_behaved() -> Arc<Self> {
        let mut replies = HashMap::new();
        for spec in catalog::ALL {
            replies.insert(spec.name, envelope(&spec, &default_value(&spec)));
        }
        for spec in [catalog::RETURN_VALIDATOR, catalog::QUALITY_CHECKER] {
            replies.insert(spec.name, verdict(&spec, "yes", "no", "yes"));
        }
        Arc::new(Self {
            replies: Mutex::new(replies),
            prompts: Mutex::new(Vec::new()),
        })
    }

    /// Override one persona's raw reply
    pub fn set_raw(&self, spec: &TaskSpec, raw: &str) {
        self.replies.lock().unwrap().insert(spec.name, raw.to_string());
    }

    pub fn set_value(&self, spec: &TaskSpec, value: &str) {
        self.set_raw(spec, &envelope(spec, value));
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    /// Prompts sent under one persona
    pub fn prompts_for(&self, spec: &TaskSpec) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.starts_with(spec.duty))
            .cloned()
            .collect()
    }
}

pub fn envelope(spec: &TaskSpec, value: &str) -> String {
    json!({
        "agent_name": spec.role,
        "response": { (spec.key): value, "concise_reason": "scripted" }
    })
    .to_string()
}

/// Checker envelope with every verdict field
pub fn verdict(spec: &TaskSpec, same: &str, defect: &str, returnable: &str) -> String {
    json!({
        "agent_name": spec.role,
        "response": {
            "is_same_product": same,
            "defect_detected": defect,
            "is_returnable": returnable,
            "concise_reason": "scripted"
        }
    })
    .to_string()
}

fn default_value(spec: &TaskSpec) -> String {
    match spec.key {
        "tenant_type" => "ecom".to_string(),
        "issue_type" => "general".to_string(),
        "sentiment" => "Neutral".to_string(),
        "escalation_decision" => "NO_ESCALATION".to_string(),
        "message" => "Your order ORD-0042 has shipped and arrives Friday.".to_string(),
        "order_id" | "image_path" => "None".to_string(),
        other => format!("extracted {}", other),
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let replies = self.replies.lock().unwrap();
        let reply = catalog::ALL
            .iter()
            .find(|spec| prompt.starts_with(spec.duty))
            .and_then(|spec| replies.get(spec.name))
            .cloned()
            .unwrap_or_else(|| "unscripted".to_string());
        Ok(reply)
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

fn record(tenant: &str, text: &str) -> Record {
    Record::new(tenant, HashEmbedder::dense(text))
        .unwrap()
        .with_sparse(HashEmbedder::sparse(text))
        .with_field("text", json!(text))
}

/// Store with two tenants of support data
pub async fn seeded_store() -> Arc<InMemoryStore> {
    let names = CollectionsConfig::default();
    let store = InMemoryStore::with_collections(&names).await;

    let user_data = vec![
        record("ecom", "Jane Doe, gold member, prefers email")
            .with_customer("CUST-010")
            .with_source_type("crm"),
        record("ecom", "ticket: order ORD-0042 delayed at warehouse")
            .with_customer("CUST-010")
            .with_source_type("helpdesk"),
        record("fintech", "ticket: card declined at checkout")
            .with_customer("CUST-010")
            .with_source_type("helpdesk"),
    ];
    let knowledge_base = vec![
        record("ecom", "faq: where is my order? track it from the orders page")
            .with_source_type("faqs")
            .with_tags(["shipping"]),
        record("ecom", "policy: returns accepted within 30 days")
            .with_source_type("policy")
            .with_tags(["returns"]),
        record("fintech", "faq: where is my order of new cards? cards ship in 7 days")
            .with_source_type("faqs"),
    ];
    let orders = vec![record("ecom", "order ORD-0042 shipped, arriving Friday")
        .with_image(ORDER_IMAGE.to_vec())
        .with_customer("CUST-010")
        .with_field("order_id", json!("ORD-0042"))
        .with_field("status", json!("shipped"))];

    store.upsert(&names.user_data, user_data).await.unwrap();
    store.upsert(&names.knowledge_base, knowledge_base).await.unwrap();
    store.upsert(&names.orders, orders).await.unwrap();
    Arc::new(store)
}

pub fn test_config() -> Config {
    Config::default()
}

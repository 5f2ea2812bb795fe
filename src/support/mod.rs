//! Per-turn support orchestration.
//!
//! A turn checks the semantic cache, gathers per-source context through
//! feedback-wrapped extraction tasks, runs the classification and response
//! pipeline, then persists the answer to the cache and the session history.
//!
//! Photo-based return checks live in [`returns`].

mod returns;

pub use returns::{comparison_context, ReturnCheck, ReturnVerdict};

use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cache::SemanticCache;
use crate::config::Config;
use crate::errors::{with_timeout, AgentError, Result};
use crate::memory::embedding::{Embedder, ImageEmbedder};
use crate::memory::history::{HistoryStore, Role};
use crate::memory::vector_db::VectorStore;
use crate::models::TextGenerator;
use crate::pipeline::{PipelineExecutor, PipelineReport, TaskGraph, TaskNode};
use crate::rag::context::{ContextBuilder, NO_ORDER_ID};
use crate::rag::filter::FilterPredicate;
use crate::rag::retrieval::HybridRetriever;
use crate::tasks::catalog::{self, TaskSpec};
use crate::tasks::decode::decode_key;
use crate::tasks::{Feedback, FeedbackLoop, StructuredTask, TaskContext};
use crate::telemetry::TelemetryCollector;

/// The only text a user sees when a turn fails
pub const GENERIC_FAILURE_MESSAGE: &str =
    "Sorry, something went wrong while handling your request. Please try again in a moment.";

/// Where a reply came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplySource {
    Cache,
    Pipeline,
    Failure,
}

/// Answer to one user turn
#[derive(Debug, Clone)]
pub struct TurnReply {
    pub message: String,
    pub source: ReplySource,
    /// Pipeline trace; absent for cache hits and failures
    pub report: Option<PipelineReport>,
}

impl TurnReply {
    fn failure() -> Self {
        Self {
            message: GENERIC_FAILURE_MESSAGE.to_string(),
            source: ReplySource::Failure,
            report: None,
        }
    }
}

/// Context gathered for the response task
#[derive(Debug, Clone, Default)]
struct TurnContext {
    customer_info: String,
    order_info: String,
    related_tickets: String,
    related_faqs: String,
    related_policies: String,
    related_handbooks: String,
}

/// Orchestrates a support turn over injected capabilities
pub struct SupportAgent {
    cache: SemanticCache,
    context: ContextBuilder,
    executor: PipelineExecutor,
    feedback: FeedbackLoop,
    history: Arc<dyn HistoryStore>,
    image_embedder: Option<Arc<dyn ImageEmbedder>>,
    cache_enabled: bool,
    turn_timeout: Duration,
}

impl SupportAgent {
    pub fn new(
        config: &Config,
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn TextGenerator>,
        history: Arc<dyn HistoryStore>,
        telemetry: TelemetryCollector,
    ) -> Self {
        let store_timeout = config.timeouts.store();
        let generate_timeout = config.timeouts.generate();

        let retriever = HybridRetriever::new(
            Arc::clone(&store),
            Arc::clone(&embedder),
            config.retrieval.rrf_k,
            store_timeout,
        )
        .with_telemetry(telemetry.clone());

        let cache = SemanticCache::new(
            store,
            embedder,
            &config.collections.semantic_cache,
            &config.cache,
            store_timeout,
        )
        .with_telemetry(telemetry.clone());

        let context = ContextBuilder::new(
            Arc::new(retriever),
            config.collections.clone(),
            config.retrieval.clone(),
            store_timeout,
        );

        let executor = PipelineExecutor::new(Arc::clone(&generator), generate_timeout)
            .with_telemetry(telemetry.clone());

        let feedback = FeedbackLoop::new(generator, generate_timeout)
            .with_max_attempts(config.feedback.max_attempts)
            .with_telemetry(telemetry);

        Self {
            cache,
            context,
            executor,
            feedback,
            history,
            image_embedder: None,
            cache_enabled: config.cache.enabled,
            turn_timeout: config.timeouts.turn(),
        }
    }

    /// Enable return checks against order reference images
    pub fn with_image_embedder(mut self, embedder: Arc<dyn ImageEmbedder>) -> Self {
        self.image_embedder = Some(embedder);
        self
    }

    /// Open a new conversation
    pub async fn start_session(&self) -> String {
        self.history.create().await
    }

    /// Answer one query. Never fails: errors are logged and replaced by
    /// [`GENERIC_FAILURE_MESSAGE`].
    pub async fn handle_turn(
        &self,
        session_id: &str,
        tenant_id: &str,
        customer_id: &str,
        query: &str,
    ) -> TurnReply {
        let start = Instant::now();
        let turn = with_timeout(
            self.turn_timeout,
            self.try_turn(session_id, tenant_id, customer_id, query),
        )
        .await;

        match turn {
            Ok(reply) => {
                tracing::info!(
                    session = session_id,
                    tenant = tenant_id,
                    source = ?reply.source,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "turn completed"
                );
                reply
            }
            Err(err) => {
                tracing::error!(
                    session = session_id,
                    tenant = tenant_id,
                    customer = customer_id,
                    error = %err,
                    transient = err.is_transient(),
                    "turn failed"
                );
                TurnReply::failure()
            }
        }
    }

    /// Classify which tenant a query belongs to
    pub async fn resolve_tenant(&self, query: &str) -> Result<String> {
        let outcome = self
            .feedback
            .run(
                |fb| with_feedback(catalog::TENANT_RESOLVER.task(query), fb),
                catalog::TENANT_RESOLVER.key,
                "",
            )
            .await;

        let tenant = outcome.value.trim().to_lowercase();
        if outcome.used_fallback() || tenant.is_empty() {
            return Err(AgentError::MissingTenant);
        }
        Ok(tenant)
    }

    async fn try_turn(
        &self,
        session_id: &str,
        tenant_id: &str,
        customer_id: &str,
        query: &str,
    ) -> Result<TurnReply> {
        // Fail fast on a missing tenant or customer before any external call
        FilterPredicate::for_customer(tenant_id, customer_id)?;

        if self.cache_enabled {
            if let Some(cached) = self.cache.check(query, tenant_id, customer_id).await? {
                self.remember(session_id, query, &cached).await?;
                return Ok(TurnReply {
                    message: cached,
                    source: ReplySource::Cache,
                    report: None,
                });
            }
        }

        let history = self.history_json(session_id).await;
        let context = self.gather_context(tenant_id, customer_id, query).await?;

        let graph = response_graph(query, &context, history)?;
        let report = self.executor.run(&graph).await?;

        let message = match decode_key(&report.result, catalog::RESPONDER.key) {
            Ok(message) => message,
            Err(err) => {
                tracing::warn!(error = %err, "response was not an envelope; returning raw text");
                report.result.clone()
            }
        };

        if self.cache_enabled {
            // A cache write failure costs a future hit, not this answer
            if let Err(err) = self.cache.add(query, &message, tenant_id, customer_id).await {
                tracing::warn!(error = %err, "failed to cache response");
            }
        }
        self.remember(session_id, query, &message).await?;

        Ok(TurnReply {
            message,
            source: ReplySource::Pipeline,
            report: Some(report),
        })
    }

    async fn gather_context(&self, tenant_id: &str, customer_id: &str, query: &str) -> Result<TurnContext> {
        let order_id = self
            .feedback
            .run(
                |fb| with_feedback(catalog::ORDER_ID_EXTRACTOR.task(query), fb),
                catalog::ORDER_ID_EXTRACTOR.key,
                NO_ORDER_ID,
            )
            .await;
        let order_raw = self
            .context
            .order_info(tenant_id, customer_id, Some(&order_id.value))
            .await?;
        tracing::debug!(order_id = %order_id.value, "order id extracted");

        let customer_raw = self.context.customer_info(tenant_id, customer_id).await?;
        let tickets_raw = self.context.helpdesk(query, tenant_id, customer_id).await?;
        let faqs_raw = self.context.knowledge_base(query, tenant_id, "faqs", None).await?;
        let policy_raw = self.context.knowledge_base(query, tenant_id, "policy", None).await?;
        let handbook_raw = self.context.knowledge_base(query, tenant_id, "handbook", None).await?;

        // Nothing to narrow down without an order id
        let order_info = if order_raw == NO_ORDER_ID {
            order_raw
        } else {
            self.extract(&catalog::ORDER_INFO_EXTRACTOR, query, "order_info", &order_raw)
                .await
        };

        Ok(TurnContext {
            order_info,
            customer_info: self
                .extract(&catalog::CUSTOMER_INFO_EXTRACTOR, query, "customer_info", &customer_raw)
                .await,
            related_tickets: self
                .extract(&catalog::TICKET_EXTRACTOR, query, "helpdesk_logs", &tickets_raw)
                .await,
            related_faqs: self
                .extract(&catalog::FAQ_EXTRACTOR, query, "faqs", &faqs_raw)
                .await,
            related_policies: self
                .extract(&catalog::POLICY_EXTRACTOR, query, "policy", &policy_raw)
                .await,
            related_handbooks: self
                .extract(&catalog::HANDBOOK_EXTRACTOR, query, "handbook", &handbook_raw)
                .await,
        })
    }

    /// Narrow retrieved text down to what answers the query.
    ///
    /// Falls back to the retrieved text itself when extraction never decodes.
    async fn extract(&self, spec: &TaskSpec, query: &str, field: &str, retrieved: &str) -> String {
        let context = TaskContext::new()
            .with("user_query", query)
            .with(field, retrieved);

        self.feedback
            .run(
                |fb| with_feedback(spec.task_with_context(context.clone()), fb),
                spec.key,
                retrieved,
            )
            .await
            .value
    }

    async fn history_json(&self, session_id: &str) -> JsonValue {
        let messages = self.history.get(session_id).await.unwrap_or_default();
        JsonValue::Array(
            messages
                .iter()
                .map(|m| json!({ "role": m.role, "content": m.content }))
                .collect(),
        )
    }

    async fn remember(&self, session_id: &str, query: &str, answer: &str) -> Result<()> {
        self.history.append(session_id, Role::User, query).await?;
        self.history.append(session_id, Role::Assistant, answer).await
    }
}

fn with_feedback(mut task: StructuredTask, feedback: Option<&Feedback>) -> StructuredTask {
    if let Some(feedback) = feedback {
        feedback.attach(&mut task);
    }
    task
}

/// Route, sentiment, escalation and response tasks for one query
fn response_graph(query: &str, context: &TurnContext, history: JsonValue) -> Result<TaskGraph> {
    let instructions = format!(
        "The user asked: {}\n\n\
         You have been provided with the issue type, the sentiment of the user, \
         the escalation decision, the knowledge base context and the conversation history.\n\
         Now craft the final support response based on all of the above.",
        query
    );
    let response_context = TaskContext::new()
        .with("customer_info", context.customer_info.as_str())
        .with("order_info", context.order_info.as_str())
        .with("related_tickets", context.related_tickets.as_str())
        .with("related_faqs", context.related_faqs.as_str())
        .with("related_policies", context.related_policies.as_str())
        .with("related_handbooks", context.related_handbooks.as_str())
        .with("history", history);

    let route = catalog::ROUTER.name;
    let sentiment = catalog::SENTIMENT.name;
    let escalation = catalog::ESCALATION.name;

    // Classifications travel downstream as their decoded values
    let classify = |spec: &TaskSpec, upstream: &[&str]| {
        TaskNode::new(spec.task(query), upstream).with_output_key(spec.key)
    };

    let mut graph = TaskGraph::new();
    graph.add_node(classify(&catalog::ROUTER, &[]))?;
    graph.add_node(classify(&catalog::SENTIMENT, &[]))?;
    graph.add_node(classify(&catalog::ESCALATION, &[route, sentiment]))?;
    graph.add(
        catalog::RESPONDER.task(instructions).with_context(response_context),
        &[route, sentiment, escalation],
    )?;
    Ok(graph)
}

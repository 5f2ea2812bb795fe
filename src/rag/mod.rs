// Retrieval-augmented context for support tasks
//
// Components:
// - Filter: tenant-scoped payload predicates
// - Fusion: RRF and distribution-based rank fusion
// - Retrieval: hybrid dense + sparse retriever
// - Context: per-source lookups rendered as prompt text

pub mod context;
pub mod filter;
pub mod fusion;
pub mod retrieval;

pub use context::ContextBuilder;
pub use filter::FilterPredicate;
pub use fusion::{FusedHit, FusionMethod};
pub use retrieval::{HybridRetriever, RetrievalQuery, RetrievalResult};

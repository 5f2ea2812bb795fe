// Sparse lexical encoder over a WordPiece vocabulary
use anyhow::{Context, Result};
use hf_hub::{api::sync::Api, Repo, RepoType};
use std::collections::BTreeMap;
use tokenizers::Tokenizer;

use crate::memory::vector_db::SparseVector;

/// Default tokenizer source for sparse term ids
pub const DEFAULT_SPARSE_TOKENIZER: &str = "prithivida/Splade_PP_en_v1";

/// Sparse encoder: vocabulary ids weighted by sublinear term frequency
pub struct SparseEncoder {
    tokenizer: Tokenizer,
}

impl SparseEncoder {
    /// Load the tokenizer from the HuggingFace Hub
    pub fn new(tokenizer_id: &str) -> Result<Self> {
        let api = Api::new().context("Failed to create HuggingFace API client")?;
        let path = api
            .repo(Repo::new(tokenizer_id.to_string(), RepoType::Model))
            .get("tokenizer.json")
            .context("Failed to download sparse tokenizer")?;
        let tokenizer = Tokenizer::from_file(path)
            .map_err(|e| anyhow::anyhow!("Failed to load tokenizer: {}", e))?;
        Ok(Self { tokenizer })
    }

    pub fn from_tokenizer(tokenizer: Tokenizer) -> Self {
        Self { tokenizer }
    }

    pub fn encode(&self, text: &str) -> Result<SparseVector> {
        let encoding = self
            .tokenizer
            .encode(text, false)
            .map_err(|e| anyhow::anyhow!("Tokenization failed: {}", e))?;
        Ok(term_weights(encoding.get_ids()))
    }
}

/// Weight each distinct id by `1 + ln(tf)`; indices come out sorted.
pub fn term_weights(ids: &[u32]) -> SparseVector {
    let mut counts: BTreeMap<u32, u32> = BTreeMap::new();
    for id in ids {
        *counts.entry(*id).or_insert(0) += 1;
    }

    let (indices, values) = counts
        .into_iter()
        .map(|(id, tf)| (id, 1.0 + (tf as f32).ln()))
        .unzip();
    SparseVector::new(indices, values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_term_weights_sorted_and_sublinear() {
        let sparse = term_weights(&[42, 7, 42, 42, 7, 3]);
        assert_eq!(sparse.indices, vec![3, 7, 42]);
        assert_eq!(sparse.values[0], 1.0);
        assert!((sparse.values[1] - (1.0 + 2f32.ln())).abs() < 1e-6);
        assert!(sparse.values[2] > sparse.values[1]);
    }

    #[test]
    fn test_empty_text_gives_empty_vector() {
        assert!(term_weights(&[]).is_empty());
    }

    #[test]
    #[ignore] // Integration test - requires tokenizer download
    fn test_encode_overlapping_queries() {
        let encoder = SparseEncoder::new(DEFAULT_SPARSE_TOKENIZER).unwrap();
        let a = encoder.encode("refund policy for damaged items").unwrap();
        let b = encoder.encode("what is the refund policy").unwrap();
        assert!(a.dot(&b).is_some());
    }
}

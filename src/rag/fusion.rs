//! Score fusion for hybrid retrieval.
//!
//! ## Reciprocal Rank Fusion
//!
//! ```text
//! score(d) = Σ_i 1 / (k + rank_i(d))
//! ```
//!
//! `rank_i` is the 1-based position of `d` in list `i`; lists that do not
//! contain `d` contribute nothing. Raw similarity scores are ignored.
//!
//! ## Distribution-based fusion
//!
//! Each list's raw scores are normalised to `[0, 1]` against
//! `mean ± 3σ` of that list and summed per document.
//!
//! Both methods sort by fused score descending; equal scores are ordered by
//! record id ascending.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::memory::vector_db::ScoredRecord;

/// Default RRF constant
pub const DEFAULT_RRF_K: f64 = 60.0;

/// How prefetch lists are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionMethod {
    #[default]
    Rrf,
    DistributionBased,
}

/// Which prefetch list a hit came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Dense,
    Sparse,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Dense => write!(f, "dense"),
            Channel::Sparse => write!(f, "sparse"),
        }
    }
}

/// One list's contribution to a fused hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub channel: Channel,
    /// 1-based rank within the channel
    pub rank: usize,
    pub contribution: f64,
}

/// A record after fusion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusedHit {
    pub record: ScoredRecord,
    pub score: f64,
    pub provenance: Vec<Contribution>,
}

/// Fuse ranked lists, best first, truncated to `top_k`.
pub fn fuse(
    method: FusionMethod,
    lists: &[(Channel, Vec<ScoredRecord>)],
    rrf_k: f64,
    top_k: usize,
) -> Vec<FusedHit> {
    let mut hits: HashMap<String, FusedHit> = HashMap::new();

    for (channel, records) in lists {
        let normalise = match method {
            FusionMethod::Rrf => None,
            FusionMethod::DistributionBased => Some(score_bounds(records)),
        };

        for (idx, record) in records.iter().enumerate() {
            let rank = idx + 1;
            let contribution = match normalise {
                None => 1.0 / (rrf_k + rank as f64),
                Some((low, high)) => normalise_score(record.score as f64, low, high),
            };

            let hit = hits.entry(record.id.clone()).or_insert_with(|| FusedHit {
                record: record.clone(),
                score: 0.0,
                provenance: Vec::new(),
            });
            hit.score += contribution;
            hit.provenance.push(Contribution {
                channel: *channel,
                rank,
                contribution,
            });
        }
    }

    let mut fused: Vec<FusedHit> = hits.into_values().collect();
    fused.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.record.id.cmp(&b.record.id))
    });
    fused.truncate(top_k);
    fused
}

fn score_bounds(records: &[ScoredRecord]) -> (f64, f64) {
    if records.is_empty() {
        return (0.0, 0.0);
    }
    let n = records.len() as f64;
    let mean = records.iter().map(|r| r.score as f64).sum::<f64>() / n;
    let variance = records
        .iter()
        .map(|r| (r.score as f64 - mean).powi(2))
        .sum::<f64>()
        / n;
    let sigma = variance.sqrt();
    (mean - 3.0 * sigma, mean + 3.0 * sigma)
}

fn normalise_score(score: f64, low: f64, high: f64) -> f64 {
    if high <= low {
        // Single-valued list
        return 0.5;
    }
    ((score - low) / (high - low)).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;
    use serde_json::Map;

    fn rec(id: &str, score: f32) -> ScoredRecord {
        ScoredRecord {
            id: id.to_string(),
            score,
            payload: Map::new(),
        }
    }

    fn ranked(ids: &[&str]) -> Vec<ScoredRecord> {
        ids.iter()
            .enumerate()
            .map(|(i, id)| rec(id, 1.0 - i as f32 * 0.1))
            .collect()
    }

    #[test]
    fn test_rrf_single_item() {
        let fused = fuse(FusionMethod::Rrf, &[(Channel::Dense, ranked(&["a"]))], 60.0, 10);
        assert_eq!(fused.len(), 1);
        assert!((fused[0].score - 1.0 / 61.0).abs() < 1e-12);
        assert_eq!(fused[0].provenance[0].rank, 1);
    }

    #[test]
    fn test_rrf_doc_in_both_lists_wins() {
        // x: dense #2 + sparse #2 = 2/62 beats a: dense #1 only = 1/61
        let lists = vec![
            (Channel::Dense, ranked(&["a", "x"])),
            (Channel::Sparse, ranked(&["b", "x"])),
        ];
        let fused = fuse(FusionMethod::Rrf, &lists, 60.0, 3);
        assert_eq!(fused[0].record.id, "x");
        assert_eq!(fused[0].provenance.len(), 2);
        assert!((fused[0].score - 2.0 / 62.0).abs() < 1e-12);
    }

    #[test]
    fn test_ties_broken_by_id() {
        let lists = vec![
            (Channel::Dense, ranked(&["zeta"])),
            (Channel::Sparse, ranked(&["alpha"])),
        ];
        let fused = fuse(FusionMethod::Rrf, &lists, 60.0, 3);
        assert_eq!(fused[0].record.id, "alpha");
        assert_eq!(fused[1].record.id, "zeta");
    }

    #[test]
    fn test_truncates_to_top_k() {
        let lists = vec![(Channel::Dense, ranked(&["a", "b", "c", "d"]))];
        assert_eq!(fuse(FusionMethod::Rrf, &lists, 60.0, 3).len(), 3);
        assert!(fuse(FusionMethod::Rrf, &[], 60.0, 3).is_empty());
    }

    #[test]
    fn test_distribution_based_uses_raw_scores() {
        let dense = vec![rec("a", 0.9), rec("b", 0.1)];
        let sparse = vec![rec("b", 12.0), rec("c", 2.0)];
        let fused = fuse(
            FusionMethod::DistributionBased,
            &[(Channel::Dense, dense), (Channel::Sparse, sparse)],
            60.0,
            3,
        );
        assert_eq!(fused[0].record.id, "b");
        assert!(fused.iter().all(|h| h.score >= 0.0));
    }

    #[test]
    fn test_normalise_degenerate_list() {
        assert_eq!(normalise_score(3.0, 3.0, 3.0), 0.5);
    }

    /// Dedup ids into a ranked list
    fn to_list(ids: Vec<u8>) -> Vec<String> {
        let mut seen = Vec::new();
        for id in ids {
            let id = format!("d{}", id % 16);
            if !seen.contains(&id) {
                seen.push(id);
            }
        }
        seen
    }

    // A doc ranked at least as well as another in every list, and strictly
    // better in one, is fused strictly above it.
    #[quickcheck]
    fn prop_rrf_monotone_in_rank(dense: Vec<u8>, sparse: Vec<u8>) -> bool {
        let dense = to_list(dense);
        let sparse = to_list(sparse);
        let as_records = |ids: &[String]| -> Vec<ScoredRecord> {
            ids.iter().map(|id| rec(id, 0.0)).collect()
        };
        let lists = vec![
            (Channel::Dense, as_records(&dense)),
            (Channel::Sparse, as_records(&sparse)),
        ];
        let fused = fuse(FusionMethod::Rrf, &lists, DEFAULT_RRF_K, usize::MAX);
        let position = |id: &str| fused.iter().position(|h| h.record.id == id);
        let rank_in = |list: &[String], id: &str| {
            list.iter().position(|x| x == id).unwrap_or(usize::MAX)
        };

        let mut ids: Vec<&String> = dense.iter().chain(sparse.iter()).collect();
        ids.dedup();
        for a in ids.iter().map(|s| s.as_str()) {
            for b in ids.iter().map(|s| s.as_str()) {
                let (da, db) = (rank_in(&dense, a), rank_in(&dense, b));
                let (sa, sb) = (rank_in(&sparse, a), rank_in(&sparse, b));
                let dominates = da <= db && sa <= sb && (da < db || sa < sb);
                if dominates && position(a) > position(b) {
                    return false;
                }
            }
        }
        fused.windows(2).all(|w| w[0].score >= w[1].score)
    }
}

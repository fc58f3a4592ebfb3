//! Fused similarity scoring.
//!
//! Two independent metrics look at every comparison: a phonetic unit (how the
//! words sound) and a semantic unit (what they mean). Their raw scores live
//! on different scales, so the engine cross-normalizes each metric's scores
//! over the candidate window before fusing them with fixed weights — the
//! question at runtime is *which candidate is best here*, not how good it is
//! in absolute terms.
//!
//! Scores below [`MATCH_FLOOR`] are treated as non-matches and pinned to
//! zero before normalization, so a window where nothing truly matches cannot
//! promote noise to a confident-looking 1.0.

mod phonetic;
mod semantic;

pub use phonetic::PhoneticUnit;
pub use semantic::SemanticUnit;

use anyhow::{Context, Result};

use crate::models::{Chunk, SimilarityResult};

/// Raw scores below this are deemed non-matches and excluded from
/// normalization.
const MATCH_FLOOR: f32 = 0.5;

/// Default weight of the semantic metric in the fused score.
pub const DEFAULT_SEMANTIC_WEIGHT: f32 = 0.4;
/// Default weight of the phonetic metric. Slightly dominant: recognizer
/// output is noisier phonetically than semantically.
pub const DEFAULT_PHONETIC_WEIGHT: f32 = 0.6;

/// A single similarity metric over a candidate window.
pub trait SimilarityUnit: Send {
    fn name(&self) -> &'static str;

    /// Raw scores in [0,1], index-aligned with `candidates`.
    fn scores(&self, query: &str, candidates: &[Chunk]) -> Result<Vec<f32>>;

    /// Scored candidates sorted by score descending.
    fn compare(&self, query: &str, candidates: &[Chunk]) -> Result<Vec<SimilarityResult>> {
        let scores = self.scores(query, candidates)?;
        let mut results: Vec<SimilarityResult> = candidates
            .iter()
            .zip(scores)
            .map(|(chunk, score)| SimilarityResult {
                chunk: chunk.clone(),
                score,
            })
            .collect();
        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(results)
    }
}

/// Min-max normalize one metric's raw scores over the candidate window.
///
/// Scores under [`MATCH_FLOOR`] stay at zero. Among the survivors the
/// minimum maps to 0 and the maximum to 1; a degenerate window where every
/// survivor ties maps them all to 1.
fn normalize_scores(raw: &[f32]) -> Vec<f32> {
    let surviving: Vec<f32> = raw.iter().copied().filter(|&s| s >= MATCH_FLOOR).collect();
    if surviving.is_empty() {
        return vec![0.0; raw.len()];
    }

    let min = surviving.iter().copied().fold(f32::INFINITY, f32::min);
    let max = surviving.iter().copied().fold(f32::NEG_INFINITY, f32::max);

    raw.iter()
        .map(|&score| {
            if score < MATCH_FLOOR {
                0.0
            } else if max == min {
                1.0
            } else {
                (score - min) / (max - min)
            }
        })
        .collect()
}

/// The fused phonetic + semantic similarity engine.
pub struct SimilarityEngine {
    semantic_weight: f32,
    phonetic_weight: f32,
    semantic: Box<dyn SimilarityUnit>,
    phonetic: Box<dyn SimilarityUnit>,
}

impl SimilarityEngine {
    /// Build the engine with default weights, loading the embedding model.
    pub fn new() -> Result<Self> {
        Self::with_weights(DEFAULT_SEMANTIC_WEIGHT, DEFAULT_PHONETIC_WEIGHT)
    }

    /// Build the engine with explicit non-negative weights.
    pub fn with_weights(semantic_weight: f32, phonetic_weight: f32) -> Result<Self> {
        Ok(Self::from_units(
            semantic_weight,
            phonetic_weight,
            Box::new(SemanticUnit::new()?),
            Box::new(PhoneticUnit::new()),
        ))
    }

    /// Assemble the engine from pre-built units.
    pub fn from_units(
        semantic_weight: f32,
        phonetic_weight: f32,
        semantic: Box<dyn SimilarityUnit>,
        phonetic: Box<dyn SimilarityUnit>,
    ) -> Self {
        Self {
            semantic_weight,
            phonetic_weight,
            semantic,
            phonetic,
        }
    }

    /// Rank `candidates` against `query` by fused score, descending.
    ///
    /// An empty candidate list short-circuits to an empty result without
    /// touching either metric. A metric failure is fatal to the comparison.
    pub fn compare(&self, query: &str, candidates: &[Chunk]) -> Result<Vec<SimilarityResult>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        // Candidates are identified by their index in the incoming list; both
        // metrics return index-aligned scores, so the fusion below never has
        // to match chunks up by content.
        let semantic_raw = self
            .semantic
            .scores(query, candidates)
            .with_context(|| format!("{} unit failed", self.semantic.name()))?;
        let phonetic_raw = self
            .phonetic
            .scores(query, candidates)
            .with_context(|| format!("{} unit failed", self.phonetic.name()))?;

        let semantic_norm = normalize_scores(&semantic_raw);
        let phonetic_norm = normalize_scores(&phonetic_raw);

        let mut results: Vec<SimilarityResult> = candidates
            .iter()
            .enumerate()
            .map(|(i, chunk)| SimilarityResult {
                chunk: chunk.clone(),
                score: self.semantic_weight * semantic_norm[i]
                    + self.phonetic_weight * phonetic_norm[i],
            })
            .collect();

        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(results)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// Test double that returns whatever scores it was given.
    struct FixedUnit {
        name: &'static str,
        scores: Vec<f32>,
    }

    impl SimilarityUnit for FixedUnit {
        fn name(&self) -> &'static str {
            self.name
        }

        fn scores(&self, _query: &str, candidates: &[Chunk]) -> Result<Vec<f32>> {
            assert_eq!(candidates.len(), self.scores.len());
            Ok(self.scores.clone())
        }
    }

    /// Test double that always fails.
    struct FailingUnit;

    impl SimilarityUnit for FailingUnit {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn scores(&self, _query: &str, _candidates: &[Chunk]) -> Result<Vec<f32>> {
            anyhow::bail!("model unavailable")
        }
    }

    fn chunks(n: usize) -> Vec<Chunk> {
        (0..n)
            .map(|i| Chunk {
                partial_content: format!("candidate {i}"),
                source_sections: Vec::new(),
            })
            .collect()
    }

    fn engine(semantic: Vec<f32>, phonetic: Vec<f32>) -> SimilarityEngine {
        SimilarityEngine::from_units(
            DEFAULT_SEMANTIC_WEIGHT,
            DEFAULT_PHONETIC_WEIGHT,
            Box::new(FixedUnit {
                name: "semantic",
                scores: semantic,
            }),
            Box::new(FixedUnit {
                name: "phonetic",
                scores: phonetic,
            }),
        )
    }

    #[test]
    fn test_normalize_scores_min_max() {
        let norm = normalize_scores(&[0.5, 0.75, 1.0]);
        assert_eq!(norm, vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn test_normalize_scores_floor() {
        let norm = normalize_scores(&[0.2, 0.6, 0.9, 0.49]);
        assert_eq!(norm[0], 0.0);
        assert_eq!(norm[3], 0.0);
        assert_eq!(norm[2], 1.0);
    }

    #[test]
    fn test_normalize_scores_all_below_floor() {
        assert_eq!(normalize_scores(&[0.1, 0.3, 0.49]), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_normalize_scores_all_tied() {
        assert_eq!(normalize_scores(&[0.8, 0.8, 0.2]), vec![1.0, 1.0, 0.0]);
    }

    #[test]
    fn test_normalize_scores_empty() {
        assert_eq!(normalize_scores(&[]), Vec::<f32>::new());
    }

    #[test]
    fn test_empty_candidates_returns_empty_without_metric_calls() {
        // FailingUnit would error if invoked; an empty window must not reach it.
        let engine = SimilarityEngine::from_units(
            0.4,
            0.6,
            Box::new(FailingUnit),
            Box::new(FailingUnit),
        );
        assert!(engine.compare("anything", &[]).unwrap().is_empty());
    }

    #[test]
    fn test_metric_failure_is_fatal() {
        let engine = SimilarityEngine::from_units(
            0.4,
            0.6,
            Box::new(FailingUnit),
            Box::new(PhoneticUnit::new()),
        );
        assert!(engine.compare("query", &chunks(2)).is_err());
    }

    #[test]
    fn test_fused_ordering_and_result_length() {
        let engine = engine(vec![0.9, 0.7, 0.2], vec![1.0, 0.8, 0.3]);
        let results = engine.compare("q", &chunks(3)).unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].chunk.partial_content, "candidate 0");
        assert!((results[0].score - 1.0).abs() < 1e-6);
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn test_exact_match_scores_one() {
        // Both metrics rank candidate 1 at their maximum: fused score is
        // exactly the weight sum, 1.0.
        let engine = engine(vec![0.6, 1.0, 0.55], vec![0.7, 1.0, 0.6]);
        let results = engine.compare("q", &chunks(3)).unwrap();
        assert_eq!(results[0].chunk.partial_content, "candidate 1");
        assert!((results[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_floored_candidate_cannot_win() {
        // Candidate 2 is loud on one metric but below the floor on the other;
        // candidate 0 clears the floor on both.
        let engine = engine(vec![0.8, 0.6, 0.3], vec![0.9, 0.7, 0.95]);
        let results = engine.compare("q", &chunks(3)).unwrap();
        assert_eq!(results[0].chunk.partial_content, "candidate 0");
    }

    #[test]
    fn test_weights_respected() {
        // Semantic favours candidate 0, phonetic favours candidate 1; with
        // phonetic at 0.6 the phonetic favourite must win.
        let engine = engine(vec![1.0, 0.6], vec![0.6, 1.0]);
        let results = engine.compare("q", &chunks(2)).unwrap();
        assert_eq!(results[0].chunk.partial_content, "candidate 1");
    }
}

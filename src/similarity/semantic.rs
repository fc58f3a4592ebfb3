//! Semantic similarity unit.
//!
//! Embeds the query and every candidate in a single batched call to a small
//! sentence-embedding model, then scores each candidate as the dot product of
//! its L2-normalized vector with the query's — cosine similarity, but with
//! the normalization hoisted out of the inner loop.
//!
//! The whole candidate list goes through one `embed` call; embedding
//! candidates one at a time would pay the model's fixed overhead per chunk
//! and is deliberately not supported by this interface.

use anyhow::{Context, Result};
use fastembed::TextEmbedding;

use crate::models::Chunk;

use super::SimilarityUnit;

pub struct SemanticUnit {
    model: TextEmbedding,
}

impl SemanticUnit {
    /// Load the default embedding model (cached on disk after the first run).
    pub fn new() -> Result<Self> {
        let model = TextEmbedding::try_new(Default::default())
            .context("Failed to load the sentence-embedding model")?;
        Ok(Self { model })
    }
}

/// L2 normalize a vector in place.
fn l2_normalize(vec: &mut [f32]) {
    let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vec.iter_mut() {
            *v /= norm;
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

impl SimilarityUnit for SemanticUnit {
    fn name(&self) -> &'static str {
        "semantic"
    }

    fn scores(&self, query: &str, candidates: &[Chunk]) -> Result<Vec<f32>> {
        let mut texts = Vec::with_capacity(candidates.len() + 1);
        texts.push(query.to_string());
        texts.extend(candidates.iter().map(|c| c.partial_content.clone()));

        let mut embeddings = self
            .model
            .embed(texts, None)
            .context("Semantic similarity comparison failed")?;

        // Most models come back normalized already; enforce it so the dot
        // product below is always a cosine.
        for embedding in &mut embeddings {
            l2_normalize(embedding);
        }

        let query_embedding = embeddings
            .first()
            .context("Embedding model returned no vectors")?
            .clone();

        Ok(embeddings[1..]
            .iter()
            .map(|candidate| dot(&query_embedding, candidate))
            .collect())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

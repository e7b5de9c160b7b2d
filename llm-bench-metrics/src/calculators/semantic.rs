use async_trait::async_trait;
use llm_bench_core::{CoreError, Embedder, MetricCalculator, Result};
use serde_json::json;
use std::sync::Arc;

use super::{MetricInput, MetricOutput};

pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.8;

/// Cosine similarity of two embeddings.
///
/// Returns 0 for mismatched dimensions or a zero-norm vector.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (dot, norm_a, norm_b) = a.iter().zip(b).fold(
        (0.0f64, 0.0f64, 0.0f64),
        |(dot, na, nb), (&x, &y)| {
            let (x, y) = (x as f64, y as f64);
            (dot + x * y, na + x * x, nb + y * y)
        },
    );

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Embedding cosine similarity against a match threshold.
#[derive(Clone)]
pub struct SemanticSimilarityCalculator {
    embedder: Arc<dyn Embedder>,
    pub threshold: f64,
}

impl SemanticSimilarityCalculator {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embedder
            .embed(text)
            .await
            .map_err(|e| CoreError::Scoring(format!("embedding failed: {}", e)))
    }

    /// Highest similarity between the prediction and any reference.
    pub async fn best_similarity<S: AsRef<str> + Sync>(
        &self,
        predicted: &str,
        references: &[S],
    ) -> Result<f64> {
        if references.is_empty() {
            return Ok(0.0);
        }

        let predicted = self.embed(predicted).await?;
        let mut best = f64::NEG_INFINITY;
        for reference in references {
            let reference = self.embed(reference.as_ref()).await?;
            best = best.max(cosine_similarity(&predicted, &reference));
        }
        Ok(best)
    }

    pub fn is_match(&self, similarity: f64) -> bool {
        similarity >= self.threshold
    }
}

impl std::fmt::Debug for SemanticSimilarityCalculator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SemanticSimilarityCalculator")
            .field("threshold", &self.threshold)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl MetricCalculator for SemanticSimilarityCalculator {
    type Input = MetricInput;
    type Output = MetricOutput;

    async fn calculate(&self, input: Self::Input) -> Result<Self::Output> {
        let similarity = self
            .best_similarity(&input.predicted, &input.references)
            .await?;

        Ok(MetricOutput {
            score: (similarity * 100.0).clamp(0.0, 100.0),
            matched: self.is_match(similarity),
            metadata: json!({
                "metric": "semantic",
                "similarity": similarity,
                "threshold": self.threshold,
            }),
        })
    }
}

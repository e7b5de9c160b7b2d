use async_trait::async_trait;
use llm_bench_core::{MetricCalculator, Result};
use serde_json::json;

use super::{binary_score, MetricInput, MetricOutput};
use crate::normalize::normalize;

#[derive(Debug, Clone, Copy, Default)]
pub struct ExactMatchCalculator;

impl ExactMatchCalculator {
    pub fn new() -> Self {
        Self
    }

    /// Equality after normalization.
    pub fn matches(&self, predicted: &str, reference: &str) -> bool {
        normalize(predicted) == normalize(reference)
    }

    /// True when any reference matches.
    pub fn matches_any<S: AsRef<str>>(&self, predicted: &str, references: &[S]) -> bool {
        let predicted = normalize(predicted);
        references
            .iter()
            .any(|reference| normalize(reference.as_ref()) == predicted)
    }
}

#[async_trait]
impl MetricCalculator for ExactMatchCalculator {
    type Input = MetricInput;
    type Output = MetricOutput;

    async fn calculate(&self, input: Self::Input) -> Result<Self::Output> {
        let matched = self.matches_any(&input.predicted, &input.references);

        Ok(MetricOutput {
            score: binary_score(matched),
            matched,
            metadata: json!({
                "metric": "exact_match",
                "references": input.references.len(),
            }),
        })
    }
}

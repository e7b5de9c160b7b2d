use async_trait::async_trait;
use llm_bench_core::{MetricCalculator, Result};
use serde_json::json;
use std::collections::HashMap;

use super::{MetricInput, MetricOutput};
use crate::normalize::normalized_tokens;

pub const DEFAULT_PASS_THRESHOLD: f64 = 50.0;

/// SQuAD-style token overlap F1, scaled to `[0, 100]`.
#[derive(Debug, Clone)]
pub struct TokenF1Calculator {
    pub pass_threshold: f64,
}

impl TokenF1Calculator {
    pub fn new() -> Self {
        Self {
            pass_threshold: DEFAULT_PASS_THRESHOLD,
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.pass_threshold = threshold;
        self
    }

    fn count_tokens(tokens: &[String]) -> HashMap<&str, usize> {
        let mut counts = HashMap::new();
        for token in tokens {
            *counts.entry(token.as_str()).or_insert(0) += 1;
        }
        counts
    }

    /// F1 between one prediction and one reference.
    pub fn f1(&self, predicted: &str, reference: &str) -> f64 {
        let pred_tokens = normalized_tokens(predicted);
        let ref_tokens = normalized_tokens(reference);

        if pred_tokens.is_empty() || ref_tokens.is_empty() {
            return 0.0;
        }

        let pred_counts = Self::count_tokens(&pred_tokens);
        let ref_counts = Self::count_tokens(&ref_tokens);

        // Multiset intersection size
        let common: usize = pred_counts
            .iter()
            .map(|(token, count)| (*count).min(*ref_counts.get(token).unwrap_or(&0)))
            .sum();

        if common == 0 {
            return 0.0;
        }

        let precision = common as f64 / pred_tokens.len() as f64;
        let recall = common as f64 / ref_tokens.len() as f64;

        2.0 * precision * recall / (precision + recall) * 100.0
    }

    /// Best F1 over all references (0 when there are none).
    pub fn best_f1<S: AsRef<str>>(&self, predicted: &str, references: &[S]) -> f64 {
        references
            .iter()
            .map(|reference| self.f1(predicted, reference.as_ref()))
            .fold(0.0, f64::max)
    }
}

impl Default for TokenF1Calculator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetricCalculator for TokenF1Calculator {
    type Input = MetricInput;
    type Output = MetricOutput;

    async fn calculate(&self, input: Self::Input) -> Result<Self::Output> {
        let score = self.best_f1(&input.predicted, &input.references);

        Ok(MetricOutput {
            score,
            matched: score >= self.pass_threshold,
            metadata: json!({
                "metric": "token_f1",
                "pass_threshold": self.pass_threshold,
            }),
        })
    }
}

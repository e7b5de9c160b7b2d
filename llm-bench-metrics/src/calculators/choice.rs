use async_trait::async_trait;
use llm_bench_core::{MetricCalculator, Result};
use serde_json::json;

use super::{binary_score, MetricInput, MetricOutput};

/// Multiple-choice check: the raw response must contain the exact text of a
/// correct option.
///
/// Known limitation: when a correct option is a substring of a different,
/// incorrect option (e.g. `"Paris"` inside `"Not Paris"`), a response naming
/// the incorrect option still counts as a match.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChoiceMatchCalculator;

impl ChoiceMatchCalculator {
    pub fn new() -> Self {
        Self
    }

    pub fn matches_any<S: AsRef<str>>(&self, response: &str, correct_answers: &[S]) -> bool {
        correct_answers
            .iter()
            .map(AsRef::as_ref)
            .filter(|answer| !answer.is_empty())
            .any(|answer| response.contains(answer))
    }
}

#[async_trait]
impl MetricCalculator for ChoiceMatchCalculator {
    type Input = MetricInput;
    type Output = MetricOutput;

    async fn calculate(&self, input: Self::Input) -> Result<Self::Output> {
        let matched = self.matches_any(&input.predicted, &input.references);

        Ok(MetricOutput {
            score: binary_score(matched),
            matched,
            metadata: json!({
                "metric": "choice",
            }),
        })
    }
}

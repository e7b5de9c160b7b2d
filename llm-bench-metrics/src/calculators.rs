pub mod exact_match;
pub mod token_f1;
pub mod bleu;
pub mod semantic;
pub mod choice;

pub use exact_match::*;
pub use token_f1::*;
pub use bleu::*;
pub use semantic::*;
pub use choice::*;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricInput {
    pub predicted: String,
    pub references: Vec<String>,
}

impl MetricInput {
    pub fn new(predicted: impl Into<String>, references: Vec<String>) -> Self {
        Self {
            predicted: predicted.into(),
            references,
        }
    }

    pub fn single(predicted: impl Into<String>, reference: impl Into<String>) -> Self {
        Self::new(predicted, vec![reference.into()])
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricOutput {
    /// Score in `[0, 100]`.
    pub score: f64,
    pub matched: bool,
    pub metadata: serde_json::Value,
}

/// 100 for a match, 0 otherwise.
pub(crate) fn binary_score(matched: bool) -> f64 {
    if matched {
        100.0
    } else {
        0.0
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;

pub const MAX_SCORE: f64 = 100.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    ExactMatch,
    TokenF1,
    Bleu,
    Semantic,
    Choice,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MetricKind::ExactMatch => "exact_match",
            MetricKind::TokenF1 => "token_f1",
            MetricKind::Bleu => "bleu",
            MetricKind::Semantic => "semantic",
            MetricKind::Choice => "choice",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ScoreResult {
    /// Metric that decided `matched`.
    pub metric: MetricKind,
    /// Metric that produced `score`; equal to `metric` unless paired.
    pub score_metric: MetricKind,
    pub matched: bool,
    /// Always within `[0, 100]`.
    pub score: f64,
}

impl ScoreResult {
    pub fn new(metric: MetricKind, matched: bool, score: f64) -> Self {
        Self {
            metric,
            score_metric: metric,
            matched,
            score: clamp_score(score),
        }
    }

    pub fn with_score_metric(mut self, score_metric: MetricKind) -> Self {
        self.score_metric = score_metric;
        self
    }

    /// Result for a task that produced nothing scorable.
    pub fn non_match(metric: MetricKind) -> Self {
        Self::new(metric, false, 0.0)
    }
}

pub fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, MAX_SCORE)
    }
}

//! Strategy-selected scoring of generated samples.
//!
//! A [`Scorer`] wraps a matching strategy, optionally paired with a second
//! strategy for the reported score, and turns the samples drawn for a task
//! into a single [`ScoreResult`] using pass@k: the task matches if any sample
//! matches, and the reported score is the best score over samples and
//! references.

use llm_bench_core::{
    present_samples, CoreError, Embedder, MetricCalculator, MetricKind, Result, Sample,
    ScoreResult, Task,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::calculators::{
    BleuCalculator, BleuTokenizer, ChoiceMatchCalculator, ExactMatchCalculator, MetricInput,
    MetricOutput, SemanticSimilarityCalculator, SmoothingMethod, TokenF1Calculator,
    DEFAULT_PASS_THRESHOLD, DEFAULT_SIMILARITY_THRESHOLD,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BleuSettings {
    pub max_n: usize,
    pub smoothing: SmoothingMethod,
    pub tokenizer: BleuTokenizer,
    pub lowercase: bool,
}

impl Default for BleuSettings {
    fn default() -> Self {
        Self {
            max_n: 4,
            smoothing: SmoothingMethod::Exp,
            tokenizer: BleuTokenizer::Punctuation,
            lowercase: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScorerConfig {
    /// Strategy that decides whether a sample matches.
    pub metric: MetricKind,
    /// Strategy that fills the reported score; defaults to `metric`.
    ///
    /// SQuAD-style runs pair `exact_match` accuracy with a `token_f1` mean.
    pub score_metric: Option<MetricKind>,
    /// Minimum score for TokenF1/BLEU to count as a match when used as `metric`.
    pub pass_threshold: f64,
    /// Minimum cosine similarity for the semantic strategy.
    pub similarity_threshold: f64,
    pub bleu: BleuSettings,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            metric: MetricKind::ExactMatch,
            score_metric: None,
            pass_threshold: DEFAULT_PASS_THRESHOLD,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            bleu: BleuSettings::default(),
        }
    }
}

impl ScorerConfig {
    /// Whether either strategy needs an embedding backend.
    pub fn needs_embedder(&self) -> bool {
        self.metric == MetricKind::Semantic || self.score_metric == Some(MetricKind::Semantic)
    }
}

#[derive(Debug, Clone)]
pub enum ScoringStrategy {
    ExactMatch(ExactMatchCalculator),
    TokenF1(TokenF1Calculator),
    Bleu(BleuCalculator),
    Semantic(SemanticSimilarityCalculator),
    Choice(ChoiceMatchCalculator),
}

impl ScoringStrategy {
    fn from_config(
        kind: MetricKind,
        config: &ScorerConfig,
        embedder: Option<Arc<dyn Embedder>>,
    ) -> Result<Self> {
        let strategy = match kind {
            MetricKind::ExactMatch => ScoringStrategy::ExactMatch(ExactMatchCalculator::new()),
            MetricKind::TokenF1 => ScoringStrategy::TokenF1(
                TokenF1Calculator::new().with_threshold(config.pass_threshold),
            ),
            MetricKind::Bleu => ScoringStrategy::Bleu(
                BleuCalculator::new(config.bleu.max_n)
                    .with_smoothing(config.bleu.smoothing)
                    .with_tokenizer(config.bleu.tokenizer)
                    .with_lowercase(config.bleu.lowercase)
                    .with_threshold(config.pass_threshold),
            ),
            MetricKind::Semantic => {
                let embedder = embedder.ok_or_else(|| {
                    CoreError::Config("semantic scoring requires an embedding provider".to_string())
                })?;
                ScoringStrategy::Semantic(
                    SemanticSimilarityCalculator::new(embedder)
                        .with_threshold(config.similarity_threshold),
                )
            }
            MetricKind::Choice => ScoringStrategy::Choice(ChoiceMatchCalculator::new()),
        };
        Ok(strategy)
    }

    pub fn kind(&self) -> MetricKind {
        match self {
            ScoringStrategy::ExactMatch(_) => MetricKind::ExactMatch,
            ScoringStrategy::TokenF1(_) => MetricKind::TokenF1,
            ScoringStrategy::Bleu(_) => MetricKind::Bleu,
            ScoringStrategy::Semantic(_) => MetricKind::Semantic,
            ScoringStrategy::Choice(_) => MetricKind::Choice,
        }
    }

    /// Run the wrapped calculator.
    pub async fn calculate(&self, input: MetricInput) -> Result<MetricOutput> {
        match self {
            ScoringStrategy::ExactMatch(calc) => calc.calculate(input).await,
            ScoringStrategy::TokenF1(calc) => calc.calculate(input).await,
            ScoringStrategy::Bleu(calc) => calc.calculate(input).await,
            ScoringStrategy::Semantic(calc) => calc.calculate(input).await,
            ScoringStrategy::Choice(calc) => calc.calculate(input).await,
        }
    }
}

/// Outcome for one sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleScore {
    pub matched: bool,
    pub score: f64,
}

#[derive(Debug, Clone)]
pub struct Scorer {
    match_strategy: ScoringStrategy,
    score_strategy: Option<ScoringStrategy>,
}

impl Scorer {
    pub fn new(strategy: ScoringStrategy) -> Self {
        Self {
            match_strategy: strategy,
            score_strategy: None,
        }
    }

    /// Take the reported score from a different strategy than the match decision.
    pub fn with_score_strategy(mut self, strategy: ScoringStrategy) -> Self {
        self.score_strategy = Some(strategy);
        self
    }

    pub fn exact_match() -> Self {
        Self::new(ScoringStrategy::ExactMatch(ExactMatchCalculator::new()))
    }

    pub fn token_f1() -> Self {
        Self::new(ScoringStrategy::TokenF1(TokenF1Calculator::new()))
    }

    pub fn bleu() -> Self {
        Self::new(ScoringStrategy::Bleu(BleuCalculator::default()))
    }

    pub fn semantic(embedder: Arc<dyn Embedder>) -> Self {
        Self::new(ScoringStrategy::Semantic(SemanticSimilarityCalculator::new(
            embedder,
        )))
    }

    pub fn choice() -> Self {
        Self::new(ScoringStrategy::Choice(ChoiceMatchCalculator::new()))
    }

    /// Build the configured strategies. Semantic scoring needs an embedder.
    pub fn from_config(config: &ScorerConfig, embedder: Option<Arc<dyn Embedder>>) -> Result<Self> {
        let scorer = Self::new(ScoringStrategy::from_config(
            config.metric,
            config,
            embedder.clone(),
        )?);

        match config.score_metric {
            Some(kind) if kind != config.metric => Ok(scorer
                .with_score_strategy(ScoringStrategy::from_config(kind, config, embedder)?)),
            _ => Ok(scorer),
        }
    }

    /// Metric deciding matches.
    pub fn metric(&self) -> MetricKind {
        self.match_strategy.kind()
    }

    /// Metric behind the reported score.
    pub fn score_metric(&self) -> MetricKind {
        self.score_strategy().kind()
    }

    pub fn strategy(&self) -> &ScoringStrategy {
        &self.match_strategy
    }

    pub fn score_strategy(&self) -> &ScoringStrategy {
        self.score_strategy.as_ref().unwrap_or(&self.match_strategy)
    }

    /// The BLEU calculator in use, if either strategy is BLEU.
    pub fn bleu_calculator(&self) -> Option<&BleuCalculator> {
        [Some(&self.match_strategy), self.score_strategy.as_ref()]
            .into_iter()
            .flatten()
            .find_map(|strategy| match strategy {
                ScoringStrategy::Bleu(calc) => Some(calc),
                _ => None,
            })
    }

    /// Score one generated text against the task's references.
    pub async fn score_sample(&self, text: &str, references: &[String]) -> Result<SampleScore> {
        let input = MetricInput::new(text, references.to_vec());
        let matched = self.match_strategy.calculate(input.clone()).await?;

        let score = match &self.score_strategy {
            Some(strategy) => strategy.calculate(input).await?.score,
            None => matched.score,
        };

        Ok(SampleScore {
            matched: matched.matched,
            score,
        })
    }

    /// pass@k over the task's samples.
    ///
    /// Absent samples are ignored. A sample whose scoring fails counts as a
    /// non-match with score 0.
    pub async fn score_task(&self, task: &Task, samples: &[Option<Sample>]) -> ScoreResult {
        let mut matched = false;
        let mut best = 0.0f64;

        for sample in present_samples(samples) {
            match self.score_sample(&sample.text, &task.reference_answers).await {
                Ok(scored) => {
                    debug!(
                        task_id = %task.id,
                        attempt = sample.attempt_index,
                        matched = scored.matched,
                        score = scored.score,
                        "Scored sample"
                    );
                    matched |= scored.matched;
                    best = best.max(scored.score);
                }
                Err(e) => {
                    warn!(
                        task_id = %task.id,
                        attempt = sample.attempt_index,
                        error = %e,
                        "Scoring failed, sample counts as 0"
                    );
                }
            }
        }

        ScoreResult::new(self.metric(), matched, best).with_score_metric(self.score_metric())
    }
}

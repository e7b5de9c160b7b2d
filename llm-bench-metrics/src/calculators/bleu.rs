use async_trait::async_trait;
use llm_bench_core::{MetricCalculator, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;

use super::{MetricInput, MetricOutput};
use crate::calculators::token_f1::DEFAULT_PASS_THRESHOLD;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SmoothingMethod {
    None,
    Add1,
    Add01,
    /// Halve the pseudo-count for every successive order with no matches.
    Exp,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BleuTokenizer {
    Whitespace,
    /// Whitespace split, with punctuation marks as separate tokens.
    Punctuation,
}

/// Sufficient statistics for BLEU, summable across segments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BleuStatistics {
    pub matches: Vec<usize>,
    pub totals: Vec<usize>,
    pub candidate_len: usize,
    pub reference_len: usize,
}

impl BleuStatistics {
    fn new(max_n: usize) -> Self {
        Self {
            matches: vec![0; max_n],
            totals: vec![0; max_n],
            candidate_len: 0,
            reference_len: 0,
        }
    }

    fn add(&mut self, other: &BleuStatistics) {
        for (acc, m) in self.matches.iter_mut().zip(&other.matches) {
            *acc += m;
        }
        for (acc, t) in self.totals.iter_mut().zip(&other.totals) {
            *acc += t;
        }
        self.candidate_len += other.candidate_len;
        self.reference_len += other.reference_len;
    }
}

#[derive(Debug, Clone)]
pub struct BleuCalculator {
    pub max_n: usize,
    pub smoothing: SmoothingMethod,
    pub tokenizer: BleuTokenizer,
    pub lowercase: bool,
    pub pass_threshold: f64,
}

impl BleuCalculator {
    pub fn new(max_n: usize) -> Self {
        Self {
            max_n: max_n.max(1),
            smoothing: SmoothingMethod::Exp,
            tokenizer: BleuTokenizer::Punctuation,
            lowercase: true,
            pass_threshold: DEFAULT_PASS_THRESHOLD,
        }
    }

    pub fn with_smoothing(mut self, smoothing: SmoothingMethod) -> Self {
        self.smoothing = smoothing;
        self
    }

    pub fn with_tokenizer(mut self, tokenizer: BleuTokenizer) -> Self {
        self.tokenizer = tokenizer;
        self
    }

    pub fn with_lowercase(mut self, lowercase: bool) -> Self {
        self.lowercase = lowercase;
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.pass_threshold = threshold;
        self
    }

    /// Split text into BLEU tokens
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let text = if self.lowercase {
            text.to_lowercase()
        } else {
            text.to_string()
        };

        match self.tokenizer {
            BleuTokenizer::Whitespace => text.split_whitespace().map(str::to_string).collect(),
            BleuTokenizer::Punctuation => {
                let mut tokens = Vec::new();
                let mut current = String::new();
                for ch in text.chars() {
                    if ch.is_alphanumeric() {
                        current.push(ch);
                        continue;
                    }
                    if !current.is_empty() {
                        tokens.push(std::mem::take(&mut current));
                    }
                    if !ch.is_whitespace() {
                        tokens.push(ch.to_string());
                    }
                }
                if !current.is_empty() {
                    tokens.push(current);
                }
                tokens
            }
        }
    }

    /// Count n-grams
    fn count_ngrams(tokens: &[String], n: usize) -> HashMap<&[String], usize> {
        let mut counts = HashMap::new();
        if tokens.len() < n {
            return counts;
        }
        for window in tokens.windows(n) {
            *counts.entry(window).or_insert(0) += 1;
        }
        counts
    }

    /// Closest reference length, preferring the shorter one on ties
    fn closest_reference_len(candidate_len: usize, reference_lens: &[usize]) -> usize {
        reference_lens
            .iter()
            .copied()
            .min_by_key(|&len| (len.abs_diff(candidate_len), len))
            .unwrap_or(0)
    }

    /// Clipped n-gram statistics for one candidate against its references
    pub fn segment_statistics<S: AsRef<str>>(&self, candidate: &str, references: &[S]) -> BleuStatistics {
        let mut stats = BleuStatistics::new(self.max_n);
        let cand_tokens = self.tokenize(candidate);
        let ref_tokens: Vec<Vec<String>> = references
            .iter()
            .map(|r| self.tokenize(r.as_ref()))
            .collect();

        stats.candidate_len = cand_tokens.len();
        let ref_lens: Vec<usize> = ref_tokens.iter().map(Vec::len).collect();
        stats.reference_len = Self::closest_reference_len(cand_tokens.len(), &ref_lens);

        for n in 1..=self.max_n {
            let cand_counts = Self::count_ngrams(&cand_tokens, n);

            // Clip by the maximum count seen in any single reference
            let mut max_ref_counts: HashMap<&[String], usize> = HashMap::new();
            for tokens in &ref_tokens {
                for (ngram, count) in Self::count_ngrams(tokens, n) {
                    let entry = max_ref_counts.entry(ngram).or_insert(0);
                    *entry = (*entry).max(count);
                }
            }

            for (ngram, count) in cand_counts {
                let ref_count = max_ref_counts.get(ngram).copied().unwrap_or(0);
                stats.matches[n - 1] += count.min(ref_count);
                stats.totals[n - 1] += count;
            }
        }

        stats
    }

    /// Calculate brevity penalty
    fn brevity_penalty(&self, candidate_len: usize, reference_len: usize) -> f64 {
        if candidate_len == 0 {
            0.0
        } else if candidate_len > reference_len {
            1.0
        } else {
            (1.0 - (reference_len as f64 / candidate_len as f64)).exp()
        }
    }

    /// BLEU in `[0, 100]` from accumulated statistics, with the per-order precisions.
    ///
    /// Orders for which the candidate side has no n-grams are left out of the
    /// geometric mean, so short candidates are not zeroed by construction.
    pub fn compute(&self, stats: &BleuStatistics) -> (f64, Vec<f64>) {
        if stats.candidate_len == 0 {
            return (0.0, vec![0.0; self.max_n]);
        }

        let effective_order = stats.totals.iter().take_while(|&&t| t > 0).count();
        // No shared unigram means no overlap at all; smoothing must not rescue it
        if effective_order == 0 || stats.matches[0] == 0 {
            return (0.0, vec![0.0; self.max_n]);
        }

        let mut precisions = Vec::with_capacity(effective_order);
        let mut log_precision_sum = 0.0;
        let mut exp_smoothing = 1.0;

        for n in 0..effective_order {
            let matched = stats.matches[n] as f64;
            let total = stats.totals[n] as f64;

            let precision = match self.smoothing {
                SmoothingMethod::None => matched / total,
                SmoothingMethod::Add1 => (matched + 1.0) / (total + 1.0),
                SmoothingMethod::Add01 => (matched + 0.1) / (total + 0.1),
                SmoothingMethod::Exp => {
                    if stats.matches[n] == 0 {
                        exp_smoothing *= 2.0;
                        1.0 / (exp_smoothing * total)
                    } else {
                        matched / total
                    }
                }
            };
            precisions.push(precision);

            if precision > 0.0 {
                log_precision_sum += precision.ln();
            } else {
                // If any precision is 0, BLEU is 0
                return (0.0, precisions);
            }
        }

        let geometric_mean = (log_precision_sum / effective_order as f64).exp();
        let bp = self.brevity_penalty(stats.candidate_len, stats.reference_len);
        let bleu = (bp * geometric_mean * 100.0).clamp(0.0, 100.0);

        (bleu, precisions)
    }

    /// Corpus-level BLEU: statistics are summed over all segments before
    /// the precisions are taken. `references[i]` holds every reference for
    /// `candidates[i]`; unmatched trailing entries are ignored.
    pub fn corpus_score<C, R>(&self, candidates: &[C], references: &[Vec<R>]) -> f64
    where
        C: AsRef<str>,
        R: AsRef<str>,
    {
        let mut total = BleuStatistics::new(self.max_n);
        for (candidate, refs) in candidates.iter().zip(references) {
            total.add(&self.segment_statistics(candidate.as_ref(), refs));
        }
        self.compute(&total).0
    }

    /// Single candidate against all references at once.
    pub fn sentence_score<S: AsRef<str>>(&self, candidate: &str, references: &[S]) -> f64 {
        self.compute(&self.segment_statistics(candidate, references)).0
    }

    /// Best single-reference score over the references.
    pub fn best_score<S: AsRef<str>>(&self, candidate: &str, references: &[S]) -> f64 {
        self.best_reference(candidate, references)
            .map_or(0.0, |best| best.score)
    }

    /// The reference the candidate scores highest against; the first one wins ties.
    pub fn best_reference<S: AsRef<str>>(
        &self,
        candidate: &str,
        references: &[S],
    ) -> Option<BestReference> {
        let mut best: Option<BestReference> = None;
        for (index, reference) in references.iter().enumerate() {
            let statistics = self.segment_statistics(candidate, &[reference.as_ref()]);
            let (score, precisions) = self.compute(&statistics);
            if best.as_ref().map_or(true, |b| score > b.score) {
                best = Some(BestReference {
                    index,
                    score,
                    precisions,
                    statistics,
                });
            }
        }
        best
    }
}

/// Score and statistics of the best-matching single reference.
#[derive(Debug, Clone, PartialEq)]
pub struct BestReference {
    pub index: usize,
    pub score: f64,
    pub precisions: Vec<f64>,
    pub statistics: BleuStatistics,
}

impl Default for BleuCalculator {
    fn default() -> Self {
        Self::new(4)
    }
}

#[async_trait]
impl MetricCalculator for BleuCalculator {
    type Input = MetricInput;
    type Output = MetricOutput;

    async fn calculate(&self, input: Self::Input) -> Result<Self::Output> {
        let Some(best) = self.best_reference(&input.predicted, &input.references) else {
            return Ok(MetricOutput {
                score: 0.0,
                matched: false,
                metadata: json!({ "metric": "bleu", "references": 0 }),
            });
        };

        Ok(MetricOutput {
            score: best.score,
            matched: best.score >= self.pass_threshold,
            metadata: json!({
                "metric": "bleu",
                "max_n": self.max_n,
                "smoothing": self.smoothing,
                "best_reference": best.index,
                "precisions": best.precisions,
                "candidate_len": best.statistics.candidate_len,
                "reference_len": best.statistics.reference_len,
            }),
        })
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{RunId, TaskId};
use super::sample::{present_samples, SampleSlots};
use super::score::{MetricKind, ScoreResult};
use super::task::Task;

/// Distribution of per-task scores.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScoreDistribution {
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub p90: f64,
    pub p95: f64,
    pub count: usize,
}

/// One evaluated task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportItem {
    pub task: Task,
    pub samples: SampleSlots,
    pub score_result: ScoreResult,
    /// Set when generation failed permanently for this task.
    pub failure: Option<String>,
}

impl ReportItem {
    /// First sample that was actually produced.
    pub fn generated_answer(&self) -> Option<&str> {
        present_samples(&self.samples).next().map(|s| s.text.as_str())
    }
}

/// A task that was excluded from the totals (e.g. cancelled mid-flight).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SkippedTask {
    pub task_id: TaskId,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvaluationReport {
    pub run_id: RunId,
    pub metric: MetricKind,
    pub score_metric: MetricKind,
    pub total: usize,
    pub correct: usize,
    pub accuracy: f64,
    pub mean_score: f64,
    pub score_distribution: ScoreDistribution,
    pub items: Vec<ReportItem>,
    pub skipped: Vec<SkippedTask>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl EvaluationReport {
    /// `correct / total`, or 0 when nothing was evaluated.
    pub fn accuracy_of(correct: usize, total: usize) -> f64 {
        if total == 0 {
            0.0
        } else {
            correct as f64 / total as f64
        }
    }

    pub fn accuracy_percent(&self) -> f64 {
        self.accuracy * 100.0
    }

    pub fn export_records(&self) -> Vec<ExportRecord> {
        self.items.iter().map(ExportRecord::from).collect()
    }
}

/// Flat per-task row for structured export.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportRecord {
    pub question: String,
    pub reference_answers: Vec<String>,
    pub generated_answer: Option<String>,
    pub matched: bool,
    pub score: f64,
}

impl From<&ReportItem> for ExportRecord {
    fn from(item: &ReportItem) -> Self {
        Self {
            question: item.task.prompt.clone(),
            reference_answers: item.task.reference_answers.clone(),
            generated_answer: item.generated_answer().map(str::to_string),
            matched: item.score_result.matched,
            score: item.score_result.score,
        }
    }
}

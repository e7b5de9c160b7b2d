//! End-to-end evaluation loop.
//!
//! Each task is evaluated independently: draw `k` samples, score them, record
//! the outcome. Up to `workers` tasks run at once; with `workers = 1` tasks are
//! processed strictly in input order. Cancellation (a caller-held token or the
//! optional deadline) drops whatever is in flight, including pending retry
//! sleeps, and records the affected tasks as skipped.

use futures::stream::{self, StreamExt};
use llm_bench_core::{EvaluationReport, SampleSlots, ScoreResult, Task, TaskId, TextGenerator};
use llm_bench_metrics::Scorer;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::aggregator::ResultAggregator;
use crate::generator::{ExecutionMode, SampleGenerator};

const PROGRESS_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// `k` in pass@k
    pub samples_per_task: usize,
    /// Tasks evaluated concurrently
    pub workers: usize,
    /// Requests in flight per task; 1 draws samples sequentially
    pub sample_concurrency: usize,
    /// Overall time budget for the run
    pub deadline: Option<Duration>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            samples_per_task: 1,
            workers: 1,
            sample_concurrency: 1,
            deadline: None,
        }
    }
}

impl HarnessConfig {
    pub fn with_samples_per_task(mut self, k: usize) -> Self {
        self.samples_per_task = k;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_sample_concurrency(mut self, sample_concurrency: usize) -> Self {
        self.sample_concurrency = sample_concurrency;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    fn sample_mode(&self) -> ExecutionMode {
        if self.sample_concurrency > 1 {
            ExecutionMode::Concurrent {
                max_in_flight: self.sample_concurrency,
            }
        } else {
            ExecutionMode::Sequential
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Completed { matched: bool },
    /// Generation failed permanently; counted as a non-match
    Failed { reason: String },
    /// Cancelled before completion; not counted
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationProgress {
    pub task_id: TaskId,
    pub completed: usize,
    pub total: usize,
    pub status: TaskStatus,
}

enum TaskOutcome {
    Scored(SampleSlots, ScoreResult),
    /// Samples drawn before the permanent failure, and its reason
    Failed(SampleSlots, String),
}

pub struct EvaluationHarness {
    generator: SampleGenerator,
    scorer: Arc<Scorer>,
    config: HarnessConfig,
    cancel: CancellationToken,
    progress_tx: Option<broadcast::Sender<EvaluationProgress>>,
}

impl EvaluationHarness {
    pub fn new(generator: Arc<dyn TextGenerator>, scorer: Scorer, config: HarnessConfig) -> Self {
        let generator = SampleGenerator::new(generator).with_mode(config.sample_mode());
        Self {
            generator,
            scorer: Arc::new(scorer),
            config,
            cancel: CancellationToken::new(),
            progress_tx: None,
        }
    }

    /// Share an externally owned token, e.g. one tied to Ctrl-C.
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Enable progress tracking
    pub fn subscribe_progress(&mut self) -> broadcast::Receiver<EvaluationProgress> {
        match &self.progress_tx {
            Some(tx) => tx.subscribe(),
            None => {
                let (tx, rx) = broadcast::channel(PROGRESS_CAPACITY);
                self.progress_tx = Some(tx);
                rx
            }
        }
    }

    /// Evaluate every task and return the finalized report.
    ///
    /// Never fails: per-task failures are recorded in the report.
    pub async fn run(&self, tasks: Vec<Task>) -> EvaluationReport {
        let aggregator = ResultAggregator::new(self.scorer.metric())
            .with_score_metric(self.scorer.score_metric());
        let total = tasks.len();
        let completed = AtomicUsize::new(0);
        let workers = self.config.workers.max(1);

        info!(
            run_id = %aggregator.run_id(),
            tasks = total,
            workers,
            samples_per_task = self.config.samples_per_task,
            metric = %self.scorer.metric(),
            "Starting evaluation"
        );

        let deadline = self.config.deadline.map(|limit| {
            let token = self.cancel.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = token.cancelled() => {}
                    _ = tokio::time::sleep(limit) => {
                        warn!(deadline_ms = limit.as_millis() as u64, "Deadline reached, cancelling evaluation");
                        token.cancel();
                    }
                }
            })
        });

        stream::iter(tasks)
            .for_each_concurrent(workers, |task| {
                self.evaluate_task(task, &aggregator, &completed, total)
            })
            .await;

        if let Some(handle) = deadline {
            handle.abort();
        }

        aggregator.finalize().await
    }

    async fn evaluate_task(
        &self,
        task: Task,
        aggregator: &ResultAggregator,
        completed: &AtomicUsize,
        total: usize,
    ) {
        let task_id = task.id.clone();

        let outcome = if self.cancel.is_cancelled() {
            None
        } else {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                outcome = self.score(&task) => Some(outcome),
            }
        };

        let status = match outcome {
            Some(TaskOutcome::Scored(samples, score_result)) => {
                let matched = score_result.matched;
                aggregator.record(task, samples, score_result).await;
                TaskStatus::Completed { matched }
            }
            Some(TaskOutcome::Failed(samples, reason)) => {
                aggregator
                    .record_failure(task, samples, reason.clone())
                    .await;
                TaskStatus::Failed { reason }
            }
            None => {
                warn!(task_id = %task_id, "Task cancelled, marking as skipped");
                aggregator.record_skipped(task_id.clone(), "cancelled").await;
                TaskStatus::Skipped
            }
        };

        let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
        info!(task_id = %task_id, completed = done, total, status = ?status, "Task finished");
        self.report_progress(EvaluationProgress {
            task_id,
            completed: done,
            total,
            status,
        });
    }

    async fn score(&self, task: &Task) -> TaskOutcome {
        match self
            .generator
            .generate_samples(task, self.config.samples_per_task)
            .await
        {
            Ok(samples) => {
                let score_result = self.scorer.score_task(task, &samples).await;
                TaskOutcome::Scored(samples, score_result)
            }
            Err(partial) => {
                warn!(
                    task_id = %task.id,
                    error = %partial.error,
                    drawn = partial.slots.iter().filter(|s| s.is_some()).count(),
                    "Generation failed permanently, counting as non-match"
                );
                TaskOutcome::Failed(partial.slots, partial.error.to_string())
            }
        }
    }

    fn report_progress(&self, progress: EvaluationProgress) {
        if let Some(tx) = &self.progress_tx {
            let _ = tx.send(progress);
        }
    }
}

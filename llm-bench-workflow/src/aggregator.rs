use chrono::{DateTime, Utc};
use llm_bench_core::{
    EvaluationReport, MetricKind, ReportItem, RunId, SampleSlots, ScoreResult, SkippedTask, Task,
    TaskId,
};
use llm_bench_metrics::MetricAggregator;
use tokio::sync::Mutex;
use tracing::{debug, info};

#[derive(Debug, Default)]
struct AggregatorState {
    total: usize,
    correct: usize,
    scores: Vec<f64>,
    items: Vec<ReportItem>,
    skipped: Vec<SkippedTask>,
}

/// Running totals for one evaluation run.
///
/// All writers go through a single async mutex, so concurrent task
/// evaluations can record into a shared `Arc<ResultAggregator>`. Items are
/// kept in the order they were recorded.
#[derive(Debug)]
pub struct ResultAggregator {
    run_id: RunId,
    metric: MetricKind,
    score_metric: MetricKind,
    started_at: DateTime<Utc>,
    state: Mutex<AggregatorState>,
}

impl ResultAggregator {
    pub fn new(metric: MetricKind) -> Self {
        Self {
            run_id: RunId::new(),
            metric,
            score_metric: metric,
            started_at: Utc::now(),
            state: Mutex::new(AggregatorState::default()),
        }
    }

    /// Report scores from a different metric than the one deciding matches.
    pub fn with_score_metric(mut self, score_metric: MetricKind) -> Self {
        self.score_metric = score_metric;
        self
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn metric(&self) -> MetricKind {
        self.metric
    }

    /// Count one evaluated task.
    pub async fn record(&self, task: Task, samples: SampleSlots, score_result: ScoreResult) {
        self.push(ReportItem {
            task,
            samples,
            score_result,
            failure: None,
        })
        .await;
    }

    /// Count a task whose generation failed permanently as a non-match.
    pub async fn record_failure(&self, task: Task, samples: SampleSlots, reason: impl Into<String>) {
        self.push(ReportItem {
            task,
            samples,
            score_result: ScoreResult::non_match(self.metric)
                .with_score_metric(self.score_metric),
            failure: Some(reason.into()),
        })
        .await;
    }

    /// Note a task that never finished; it is excluded from the totals.
    pub async fn record_skipped(&self, task_id: TaskId, reason: impl Into<String>) {
        let mut state = self.state.lock().await;
        state.skipped.push(SkippedTask {
            task_id,
            reason: reason.into(),
        });
    }

    async fn push(&self, item: ReportItem) {
        let mut state = self.state.lock().await;
        state.total += 1;
        if item.score_result.matched {
            state.correct += 1;
        }
        state.scores.push(item.score_result.score);

        debug!(
            task_id = %item.task.id,
            matched = item.score_result.matched,
            score = item.score_result.score,
            total = state.total,
            correct = state.correct,
            "Recorded task result"
        );
        state.items.push(item);
    }

    /// Build the report from everything recorded so far.
    pub async fn finalize(&self) -> EvaluationReport {
        let state = self.state.lock().await;
        let accuracy = EvaluationReport::accuracy_of(state.correct, state.total);
        let mean_score = MetricAggregator::mean(&state.scores);

        info!(
            run_id = %self.run_id,
            metric = %self.metric,
            score_metric = %self.score_metric,
            total = state.total,
            correct = state.correct,
            skipped = state.skipped.len(),
            accuracy,
            mean_score,
            "Evaluation finalized"
        );

        EvaluationReport {
            run_id: self.run_id,
            metric: self.metric,
            score_metric: self.score_metric,
            total: state.total,
            correct: state.correct,
            accuracy,
            mean_score,
            score_distribution: MetricAggregator::aggregate(&state.scores),
            items: state.items.clone(),
            skipped: state.skipped.clone(),
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }
}

use async_trait::async_trait;
use llm_bench_core::{
    GenerationError, MetricKind, ProviderError, Sample, ScoreResult, Task, TaskId, TextGenerator,
};
use llm_bench_metrics::Scorer;
use llm_bench_workflow::{
    EvaluationHarness, ExecutionMode, HarnessConfig, ResultAggregator, SampleGenerator, TaskStatus,
};
use mockall::mock;
use pretty_assertions::assert_eq;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ===== Test Helpers =====

mock! {
    pub Generator {}

    #[async_trait]
    impl TextGenerator for Generator {
        async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
    }
}

fn exhausted() -> GenerationError {
    GenerationError::Exhausted {
        attempts: 5,
        last: ProviderError::Transient("503".to_string()),
    }
}

fn permanent() -> GenerationError {
    GenerationError::Permanent(ProviderError::Authentication("bad key".to_string()))
}

fn task(id: &str, prompt: &str, answer: &str) -> Task {
    Task::new(id, prompt, vec![answer.to_string()]).unwrap()
}

/// Answers by prompt after a per-prompt delay; unknown prompts hang.
struct LookupGenerator {
    answers: HashMap<String, (Duration, String)>,
}

impl LookupGenerator {
    fn new(entries: &[(&str, u64, &str)]) -> Arc<Self> {
        Arc::new(Self {
            answers: entries
                .iter()
                .map(|(prompt, delay_ms, answer)| {
                    (
                        prompt.to_string(),
                        (Duration::from_millis(*delay_ms), answer.to_string()),
                    )
                })
                .collect(),
        })
    }
}

#[async_trait]
impl TextGenerator for LookupGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        match self.answers.get(prompt) {
            Some((delay, answer)) => {
                tokio::time::sleep(*delay).await;
                Ok(answer.clone())
            }
            None => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok("too late".to_string())
            }
        }
    }
}

/// Call `i` waits longer the earlier it was issued and answers `answer-i`.
struct CountdownGenerator {
    calls: AtomicUsize,
    k: usize,
}

#[async_trait]
impl TextGenerator for CountdownGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
        let i = self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10 * (self.k - i) as u64)).await;
        Ok(format!("answer-{i}"))
    }
}

// ===== SampleGenerator Tests =====

#[tokio::test]
async fn test_sequential_samples_in_order() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let mut mock = MockGenerator::new();
    mock.expect_generate()
        .times(3)
        .returning(move |_| Ok(format!("sample {}", counter.fetch_add(1, Ordering::SeqCst))));

    let generator = SampleGenerator::new(Arc::new(mock));
    let slots = generator
        .generate_samples(&task("t", "q", "a"), 3)
        .await
        .unwrap();

    let texts: Vec<_> = slots.iter().map(|s| s.as_ref().unwrap().text.clone()).collect();
    assert_eq!(texts, vec!["sample 0", "sample 1", "sample 2"]);
    assert_eq!(
        slots.iter().map(|s| s.as_ref().unwrap().attempt_index).collect::<Vec<_>>(),
        vec![0, 1, 2]
    );
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_samples_preserve_request_order() {
    let generator = SampleGenerator::new(Arc::new(CountdownGenerator {
        calls: AtomicUsize::new(0),
        k: 4,
    }))
    .with_mode(ExecutionMode::Concurrent { max_in_flight: 4 });

    let slots = generator
        .generate_samples(&task("t", "q", "a"), 4)
        .await
        .unwrap();

    let texts: Vec<_> = slots.into_iter().map(|s| s.unwrap().text).collect();
    assert_eq!(texts, vec!["answer-0", "answer-1", "answer-2", "answer-3"]);
}

#[tokio::test]
async fn test_exhausted_retries_leave_absent_slot() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let mut mock = MockGenerator::new();
    mock.expect_generate().times(3).returning(move |_| {
        if counter.fetch_add(1, Ordering::SeqCst) == 1 {
            Err(exhausted())
        } else {
            Ok("Paris".to_string())
        }
    });

    let generator = SampleGenerator::new(Arc::new(mock));
    let slots = generator
        .generate_samples(&task("t", "q", "a"), 3)
        .await
        .unwrap();

    assert_eq!(slots.len(), 3);
    assert!(slots[0].is_some());
    assert!(slots[1].is_none());
    assert!(slots[2].is_some());
}

#[tokio::test]
async fn test_permanent_error_aborts_task() {
    let mut mock = MockGenerator::new();
    mock.expect_generate().times(1).returning(|_| Err(permanent()));

    let generator = SampleGenerator::new(Arc::new(mock));
    let err = generator
        .generate_samples(&task("t", "q", "a"), 3)
        .await
        .unwrap_err();

    assert!(err.error.is_permanent());
    assert_eq!(err.slots, vec![None, None, None]);
}

#[tokio::test]
async fn test_permanent_error_keeps_earlier_samples() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let mut mock = MockGenerator::new();
    mock.expect_generate().times(2).returning(move |_| {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            Ok("Paris".to_string())
        } else {
            Err(permanent())
        }
    });

    let generator = SampleGenerator::new(Arc::new(mock));
    let err = generator
        .generate_samples(&task("t", "q", "a"), 3)
        .await
        .unwrap_err();

    assert!(err.error.is_permanent());
    assert_eq!(err.slots.len(), 3);
    assert_eq!(err.slots[0].as_ref().map(|s| s.text.as_str()), Some("Paris"));
    assert!(err.slots[1].is_none());
    assert!(err.slots[2].is_none());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_multiple_choice_prompt_is_rendered() {
    let mut mock = MockGenerator::new();
    mock.expect_generate()
        .withf(|prompt: &str| prompt.starts_with("Question: Pick\nPossible answers:\n1. A\n2. B\n"))
        .times(1)
        .returning(|_| Ok("1".to_string()));

    let task = Task::with_choices(
        "mc",
        "Pick",
        vec!["A".to_string()],
        Some(vec!["A".to_string(), "B".to_string()]),
    )
    .unwrap();
    let generator = SampleGenerator::new(Arc::new(mock));

    assert!(generator.generate_samples(&task, 1).await.is_ok());
}

// ===== ResultAggregator Tests =====

#[tokio::test]
async fn test_finalize_empty_has_zero_accuracy() {
    let aggregator = ResultAggregator::new(MetricKind::ExactMatch);
    let report = aggregator.finalize().await;

    assert_eq!(report.total, 0);
    assert_eq!(report.correct, 0);
    assert_eq!(report.accuracy, 0.0);
    assert_eq!(report.mean_score, 0.0);
}

#[tokio::test]
async fn test_aggregator_counts_and_mean() {
    let aggregator = ResultAggregator::new(MetricKind::TokenF1);
    let t = task("t1", "q", "a");

    aggregator
        .record(t.clone(), vec![], ScoreResult::new(MetricKind::TokenF1, true, 80.0))
        .await;
    aggregator
        .record(t.clone(), vec![], ScoreResult::new(MetricKind::TokenF1, false, 20.0))
        .await;
    aggregator.record_failure(t, vec![], "auth").await;
    aggregator.record_skipped(TaskId::from("t9"), "cancelled").await;

    let report = aggregator.finalize().await;
    assert_eq!(report.total, 3);
    assert_eq!(report.correct, 1);
    assert!((report.accuracy - 1.0 / 3.0).abs() < 1e-9);
    assert!((report.mean_score - 100.0 / 3.0).abs() < 1e-9);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.items[2].failure.as_deref(), Some("auth"));
    assert_eq!(report.score_distribution.count, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_aggregator_concurrent_records() {
    let aggregator = Arc::new(ResultAggregator::new(MetricKind::ExactMatch));
    let mut handles = Vec::new();

    for i in 0..100 {
        let aggregator = aggregator.clone();
        handles.push(tokio::spawn(async move {
            let t = task(&format!("t{i}"), "q", "a");
            let matched = i % 4 == 0;
            let score = if matched { 100.0 } else { 0.0 };
            aggregator
                .record(t, vec![], ScoreResult::new(MetricKind::ExactMatch, matched, score))
                .await;
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let report = aggregator.finalize().await;
    assert_eq!(report.total, 100);
    assert_eq!(report.correct, 25);
    assert_eq!(report.items.len(), 100);
    assert!(report.correct <= report.total);
}

// ===== EvaluationHarness Tests =====

#[tokio::test]
async fn test_pass_at_k_only_second_sample_matches() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let mut mock = MockGenerator::new();
    mock.expect_generate().times(3).returning(move |_| {
        let answer = match counter.fetch_add(1, Ordering::SeqCst) {
            1 => "Paris",
            _ => "Lyon",
        };
        Ok(answer.to_string())
    });

    let harness = EvaluationHarness::new(
        Arc::new(mock),
        Scorer::exact_match(),
        HarnessConfig::default().with_samples_per_task(3),
    );
    let report = harness.run(vec![task("t", "Capital of France?", "Paris")]).await;

    assert_eq!(report.total, 1);
    assert_eq!(report.correct, 1);
    assert_eq!(report.items[0].samples.len(), 3);
}

#[tokio::test]
async fn test_sequential_run_keeps_input_order() {
    let generator = LookupGenerator::new(&[("q1", 0, "a1"), ("q2", 0, "wrong"), ("q3", 0, "a3")]);
    let harness = EvaluationHarness::new(generator, Scorer::exact_match(), HarnessConfig::default());

    let report = harness
        .run(vec![task("1", "q1", "a1"), task("2", "q2", "a2"), task("3", "q3", "a3")])
        .await;

    assert_eq!(report.total, 3);
    assert_eq!(report.correct, 2);
    assert!((report.accuracy - 2.0 / 3.0).abs() < 1e-9);
    let ids: Vec<_> = report.items.iter().map(|i| i.task.id.as_str()).collect();
    assert_eq!(ids, vec!["1", "2", "3"]);
}

#[tokio::test]
async fn test_permanent_failure_counts_as_non_match() {
    let mut mock = MockGenerator::new();
    mock.expect_generate()
        .withf(|prompt: &str| prompt == "bad")
        .returning(|_| Err(permanent()));
    mock.expect_generate()
        .withf(|prompt: &str| prompt == "good")
        .returning(|_| Ok("yes".to_string()));

    let harness = EvaluationHarness::new(
        Arc::new(mock),
        Scorer::exact_match(),
        HarnessConfig::default(),
    );
    let report = harness
        .run(vec![task("b", "bad", "yes"), task("g", "good", "yes")])
        .await;

    assert_eq!(report.total, 2);
    assert_eq!(report.correct, 1);
    assert!(report.items[0].failure.is_some());
    assert!(!report.items[0].score_result.matched);
    assert!(report.skipped.is_empty());
}

#[tokio::test]
async fn test_permanent_failure_report_keeps_drawn_samples() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let mut mock = MockGenerator::new();
    mock.expect_generate().times(2).returning(move |_| {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            Ok("a".to_string())
        } else {
            Err(permanent())
        }
    });

    let harness = EvaluationHarness::new(
        Arc::new(mock),
        Scorer::exact_match(),
        HarnessConfig::default().with_samples_per_task(3),
    );
    let report = harness.run(vec![task("t", "q", "a")]).await;

    let item = &report.items[0];
    assert!(item.failure.is_some());
    assert!(!item.score_result.matched);
    assert_eq!(item.samples.len(), 3);
    assert_eq!(item.samples.iter().filter(|s| s.is_some()).count(), 1);
    assert_eq!(item.generated_answer(), Some("a"));
}

#[tokio::test]
async fn test_all_samples_absent_is_recorded_as_non_match() {
    let mut mock = MockGenerator::new();
    mock.expect_generate().times(2).returning(|_| Err(exhausted()));

    let harness = EvaluationHarness::new(
        Arc::new(mock),
        Scorer::exact_match(),
        HarnessConfig::default().with_samples_per_task(2),
    );
    let report = harness.run(vec![task("t", "q", "a")]).await;

    assert_eq!(report.total, 1);
    assert_eq!(report.correct, 0);
    assert_eq!(report.items[0].samples, vec![None, None]);
    assert_eq!(report.items[0].generated_answer(), None);
}

#[tokio::test(start_paused = true)]
async fn test_worker_pool_runs_tasks_concurrently() {
    let generator = LookupGenerator::new(&[("q1", 1000, "a1"), ("q2", 1000, "a2"), ("q3", 1000, "a3")]);
    let harness = EvaluationHarness::new(
        generator,
        Scorer::exact_match(),
        HarnessConfig::default().with_workers(3),
    );

    let start = tokio::time::Instant::now();
    let report = harness
        .run(vec![task("1", "q1", "a1"), task("2", "q2", "a2"), task("3", "q3", "a3")])
        .await;

    assert_eq!(report.correct, 3);
    assert!(start.elapsed() < Duration::from_millis(2000));
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_marks_in_flight_tasks_skipped() {
    let generator = LookupGenerator::new(&[("fast", 10, "ok")]);
    let harness = EvaluationHarness::new(
        generator,
        Scorer::exact_match(),
        HarnessConfig::default().with_workers(2),
    );
    let token = harness.cancellation_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        token.cancel();
    });

    let report = harness
        .run(vec![
            task("fast", "fast", "ok"),
            task("slow", "slow", "ok"),
            task("later", "never", "ok"),
        ])
        .await;

    assert_eq!(report.total, 1);
    assert_eq!(report.correct, 1);
    let mut skipped: Vec<_> = report.skipped.iter().map(|s| s.task_id.as_str()).collect();
    skipped.sort();
    assert_eq!(skipped, vec!["later", "slow"]);
}

#[tokio::test(start_paused = true)]
async fn test_deadline_cancels_run() {
    let generator = LookupGenerator::new(&[("fast", 10, "ok")]);
    let harness = EvaluationHarness::new(
        generator,
        Scorer::exact_match(),
        HarnessConfig::default().with_deadline(Duration::from_secs(5)),
    );

    let report = harness
        .run(vec![task("fast", "fast", "ok"), task("slow", "slow", "ok")])
        .await;

    assert_eq!(report.total, 1);
    assert_eq!(report.skipped.len(), 1);
    assert!(harness.cancellation_token().is_cancelled());
}

#[tokio::test]
async fn test_progress_events_are_broadcast() {
    let generator = LookupGenerator::new(&[("q1", 0, "a1"), ("q2", 0, "nope")]);
    let mut harness =
        EvaluationHarness::new(generator, Scorer::exact_match(), HarnessConfig::default());
    let mut progress = harness.subscribe_progress();

    harness
        .run(vec![task("1", "q1", "a1"), task("2", "q2", "a2")])
        .await;

    let first = progress.recv().await.unwrap();
    let second = progress.recv().await.unwrap();
    assert_eq!(first.completed, 1);
    assert_eq!(first.total, 2);
    assert_eq!(first.status, TaskStatus::Completed { matched: true });
    assert_eq!(second.completed, 2);
    assert_eq!(second.status, TaskStatus::Completed { matched: false });
}

#[tokio::test]
async fn test_empty_run() {
    let mock = MockGenerator::new();
    let harness = EvaluationHarness::new(Arc::new(mock), Scorer::bleu(), HarnessConfig::default());

    let report = harness.run(vec![]).await;

    assert_eq!(report.total, 0);
    assert_eq!(report.accuracy, 0.0);
    assert_eq!(report.metric, MetricKind::Bleu);
}

#[tokio::test]
async fn test_present_samples_are_scored_with_task_id() {
    let mut mock = MockGenerator::new();
    mock.expect_generate().returning(|_| Ok("a".to_string()));

    let harness = EvaluationHarness::new(Arc::new(mock), Scorer::exact_match(), HarnessConfig::default());
    let report = harness.run(vec![task("abc", "q", "a")]).await;

    assert_eq!(
        report.items[0].samples,
        vec![Some(Sample::new(TaskId::from("abc"), "a", 0))]
    );
}

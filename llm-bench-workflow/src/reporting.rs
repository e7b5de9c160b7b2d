use llm_bench_core::{EvaluationReport, Result};
use llm_bench_metrics::BleuCalculator;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Json,
    Markdown,
}

impl ReportFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
            "json" => Some(ReportFormat::Json),
            "md" | "markdown" => Some(ReportFormat::Markdown),
            _ => None,
        }
    }
}

/// Human-readable run summary.
pub fn summary_text(report: &EvaluationReport) -> String {
    format!(
        "Total Tasks: {}\nCorrect Predictions: {}\nAccuracy: {:.2}%\nMean Score: {:.2}\nSkipped Tasks: {}\n",
        report.total,
        report.correct,
        report.accuracy_percent(),
        report.mean_score,
        report.skipped.len()
    )
}

/// Corpus BLEU over the first generated answer of every item.
///
/// Items without any generated answer contribute an empty candidate.
pub fn corpus_bleu(report: &EvaluationReport, calculator: &BleuCalculator) -> f64 {
    let candidates: Vec<&str> = report
        .items
        .iter()
        .map(|item| item.generated_answer().unwrap_or(""))
        .collect();
    let references: Vec<Vec<String>> = report
        .items
        .iter()
        .map(|item| item.task.reference_answers.clone())
        .collect();

    calculator.corpus_score(&candidates, &references)
}

/// Generate JSON report
pub fn render_json(report: &EvaluationReport) -> Result<String> {
    let document = json!({
        "run_id": report.run_id,
        "metric": report.metric,
        "score_metric": report.score_metric,
        "generated_at": chrono::Utc::now(),
        "started_at": report.started_at,
        "finished_at": report.finished_at,
        "summary": {
            "total": report.total,
            "correct": report.correct,
            "accuracy": report.accuracy,
            "mean_score": report.mean_score,
            "skipped": report.skipped.len(),
            "score_distribution": report.score_distribution,
        },
        "records": report.export_records(),
        "skipped": report.skipped,
    });

    Ok(serde_json::to_string_pretty(&document)?)
}

fn markdown_cell(text: &str) -> String {
    text.replace('|', "\\|").replace(['\r', '\n'], " ")
}

/// Generate Markdown report
pub fn render_markdown(report: &EvaluationReport) -> String {
    let mut md = String::new();

    md.push_str("# Evaluation Report\n\n");
    md.push_str(&format!("**Run ID:** {}\n\n", report.run_id));
    md.push_str(&format!("**Metric:** {}\n\n", report.metric));
    if report.score_metric != report.metric {
        md.push_str(&format!("**Score Metric:** {}\n\n", report.score_metric));
    }
    md.push_str(&format!("**Generated:** {}\n\n", chrono::Utc::now().to_rfc3339()));

    md.push_str("## Summary\n\n");
    md.push_str("| Total Tasks | Correct Predictions | Accuracy | Mean Score | Skipped Tasks |\n");
    md.push_str("|---|---|---|---|---|\n");
    md.push_str(&format!(
        "| {} | {} | {:.2}% | {:.2} | {} |\n\n",
        report.total,
        report.correct,
        report.accuracy_percent(),
        report.mean_score,
        report.skipped.len()
    ));

    md.push_str("## Results\n\n");
    md.push_str("| # | Question | Reference Answers | Generated Answer | Matched | Score |\n");
    md.push_str("|---|---|---|---|---|---|\n");
    for (i, record) in report.export_records().iter().enumerate() {
        md.push_str(&format!(
            "| {} | {} | {} | {} | {} | {:.2} |\n",
            i + 1,
            markdown_cell(&record.question),
            markdown_cell(&record.reference_answers.join("; ")),
            markdown_cell(record.generated_answer.as_deref().unwrap_or("-")),
            if record.matched { "yes" } else { "no" },
            record.score
        ));
    }

    if !report.skipped.is_empty() {
        md.push_str("\n## Skipped\n\n");
        for skipped in &report.skipped {
            md.push_str(&format!("- `{}`: {}\n", skipped.task_id, skipped.reason));
        }
    }

    md
}

pub fn render(report: &EvaluationReport, format: ReportFormat) -> Result<String> {
    match format {
        ReportFormat::Json => render_json(report),
        ReportFormat::Markdown => Ok(render_markdown(report)),
    }
}

/// Render and write the report, creating parent directories as needed.
pub fn write_report(report: &EvaluationReport, path: &Path, format: ReportFormat) -> Result<()> {
    let content = render(report, format)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;

    info!(path = %path.display(), ?format, items = report.items.len(), "Report written");
    Ok(())
}

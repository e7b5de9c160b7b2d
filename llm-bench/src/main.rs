use anyhow::{Context, Result};
use llm_bench_core::{Embedder, Task};
use llm_bench_metrics::Scorer;
use llm_bench_provider::{ChatCompletionsProvider, EmbeddingsProvider, GenerationClient};
use llm_bench_workflow::{corpus_bleu, summary_text, write_report, EvaluationHarness, TaskLoader};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

mod config;
mod logging;

#[tokio::main]
async fn main() -> Result<()> {
    // Optional path to an extra config file layered over config/default
    let explicit = std::env::args_os().nth(1).map(PathBuf::from);

    let config = config::Config::load(explicit.as_deref()).context("failed to load configuration")?;
    logging::init_logging(&config.log_level, config.log_format)?;
    tracing::info!("Configuration loaded");

    config.validate().context("invalid configuration")?;

    let tasks = load_dataset(&config)?;

    let provider = ChatCompletionsProvider::new(config.provider.clone())?;
    let client = GenerationClient::from_config(provider, config.retry.clone(), &config.provider);
    tracing::info!(
        provider = client.provider_name(),
        model = client.model_name(),
        "Generation client initialized"
    );

    let embedder: Option<Arc<dyn Embedder>> = if config.scorer.needs_embedder() {
        Some(Arc::new(EmbeddingsProvider::new(config.embeddings_config())?))
    } else {
        None
    };
    let scorer = Scorer::from_config(&config.scorer, embedder)?;
    let bleu = scorer.bleu_calculator().cloned();

    let cancel = CancellationToken::new();
    let harness = EvaluationHarness::new(Arc::new(client), scorer, config.harness_config())
        .with_cancellation_token(cancel.clone());

    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling remaining tasks");
            cancel.cancel();
        }
    });

    let report = harness.run(tasks).await;
    interrupt.abort();

    print!("{}", summary_text(&report));
    if let Some(calculator) = &bleu {
        println!("Corpus BLEU: {:.2}", corpus_bleu(&report, calculator));
    }

    if let Some(export) = &config.export {
        write_report(&report, &export.path, export.resolved_format())
            .with_context(|| format!("failed to write report {}", export.path.display()))?;
    }

    Ok(())
}

/// Load the configured dataset; the loader logs its own summary.
fn load_dataset(config: &config::Config) -> Result<Vec<Task>> {
    let loader = TaskLoader::new(config.loader_config());
    let outcome = loader
        .load_path(&config.dataset.path, config.dataset.format)
        .with_context(|| format!("failed to load dataset {}", config.dataset.path.display()))?;
    Ok(outcome.tasks)
}

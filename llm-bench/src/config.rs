use anyhow::{bail, Result};
use config::{Config as ConfigLoader, Environment, File};
use llm_bench_metrics::ScorerConfig;
use llm_bench_provider::{ProviderConfig, RetryConfig};
use llm_bench_workflow::{DatasetFormat, HarnessConfig, LoaderConfig, ReportFormat};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::logging::LogFormat;

const ENV_PREFIX: &str = "LLM_BENCH";
const API_KEY_FALLBACK_VAR: &str = "OPENAI_API_KEY";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DatasetSettings {
    pub path: PathBuf,
    /// Inferred from the file extension when unset
    pub format: Option<DatasetFormat>,
    pub limit: Option<usize>,
    pub shuffle_seed: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HarnessSettings {
    pub samples_per_task: usize,
    pub workers: usize,
    pub sample_concurrency: usize,
    pub deadline_secs: Option<u64>,
}

impl Default for HarnessSettings {
    fn default() -> Self {
        Self {
            samples_per_task: 1,
            workers: 1,
            sample_concurrency: 1,
            deadline_secs: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExportSettings {
    pub path: PathBuf,
    pub format: Option<ReportFormat>,
}

impl ExportSettings {
    pub fn resolved_format(&self) -> ReportFormat {
        self.format
            .or_else(|| ReportFormat::from_path(&self.path))
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: String,
    pub log_format: LogFormat,
    pub dataset: DatasetSettings,
    pub provider: ProviderConfig,
    /// Embeddings endpoint for semantic scoring; defaults to `provider`
    pub embeddings: Option<ProviderConfig>,
    pub retry: RetryConfig,
    pub scorer: ScorerConfig,
    pub harness: HarnessSettings,
    pub export: Option<ExportSettings>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::default(),
            dataset: DatasetSettings::default(),
            provider: ProviderConfig::default(),
            embeddings: None,
            retry: RetryConfig::default(),
            scorer: ScorerConfig::default(),
            harness: HarnessSettings::default(),
            export: None,
        }
    }
}

impl Config {
    /// Layered load: `config/default`, `config/local`, then an optional
    /// explicit file, then `LLM_BENCH__SECTION__KEY` environment variables.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut builder = ConfigLoader::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false));

        if let Some(path) = explicit {
            builder = builder.add_source(File::from(path).required(true));
        }

        let loaded = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut config: Config = loaded.try_deserialize()?;
        config.apply_api_key_fallback(std::env::var(API_KEY_FALLBACK_VAR).ok());
        Ok(config)
    }

    /// Parse a single TOML document without any other layers.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let loaded = ConfigLoader::builder()
            .add_source(File::from_str(text, config::FileFormat::Toml))
            .build()?;
        Ok(loaded.try_deserialize()?)
    }

    fn apply_api_key_fallback(&mut self, key: Option<String>) {
        if self.provider.api_key.is_none() {
            self.provider.api_key = key;
        }
        if let Some(embeddings) = self.embeddings.as_mut() {
            if embeddings.api_key.is_none() {
                embeddings.api_key = self.provider.api_key.clone();
            }
        }
    }

    /// Reject settings that would make the run meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.dataset.path.as_os_str().is_empty() {
            bail!("dataset.path must be set");
        }
        if self.harness.samples_per_task == 0 {
            bail!("harness.samples_per_task must be at least 1");
        }
        if self.harness.workers == 0 {
            bail!("harness.workers must be at least 1");
        }
        if self.harness.deadline_secs == Some(0) {
            bail!("harness.deadline_secs must be positive when set");
        }

        self.retry.validate()?;
        self.provider.validate()?;
        if let Some(embeddings) = &self.embeddings {
            embeddings.validate()?;
        }
        Ok(())
    }

    pub fn loader_config(&self) -> LoaderConfig {
        LoaderConfig {
            limit: self.dataset.limit,
            shuffle_seed: self.dataset.shuffle_seed,
        }
    }

    pub fn harness_config(&self) -> HarnessConfig {
        let config = HarnessConfig::default()
            .with_samples_per_task(self.harness.samples_per_task)
            .with_workers(self.harness.workers)
            .with_sample_concurrency(self.harness.sample_concurrency);

        match self.harness.deadline_secs {
            Some(secs) => config.with_deadline(Duration::from_secs(secs)),
            None => config,
        }
    }

    pub fn embeddings_config(&self) -> ProviderConfig {
        self.embeddings
            .clone()
            .unwrap_or_else(|| self.provider.clone())
    }
}

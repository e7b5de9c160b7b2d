//! OpenAI-compatible embeddings provider used by semantic scoring.

use async_trait::async_trait;
use llm_bench_core::{CoreError, Embedder, ProviderError, ProviderResult, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ProviderConfig;
use crate::error::{classify_status, from_reqwest, parse_retry_after};
use crate::openai::build_http_client;

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct EmbeddingsProvider {
    client: Client,
    config: ProviderConfig,
    model: String,
    url: String,
}

impl EmbeddingsProvider {
    /// Uses `embedding_model` when set, the chat model otherwise.
    pub fn new(config: ProviderConfig) -> Result<Self> {
        config.validate()?;
        let model = config
            .embedding_model
            .clone()
            .unwrap_or_else(|| config.model.clone());
        if model.trim().is_empty() {
            return Err(CoreError::Config("embedding model cannot be empty".to_string()));
        }

        let client = build_http_client(&config)?;
        let url = config.endpoint("embeddings")?;

        Ok(Self {
            client,
            config,
            model,
            url,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Embedder for EmbeddingsProvider {
    async fn embed(&self, text: &str) -> ProviderResult<Vec<f32>> {
        debug!(model = %self.model, chars = text.len(), "Requesting embedding");

        let response = self
            .client
            .post(&self.url)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: text,
            })
            .send()
            .await
            .map_err(|e| from_reqwest(e, self.config.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, retry_after, &body));
        }

        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| from_reqwest(e, self.config.timeout))?;

        body.data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .filter(|embedding| !embedding.is_empty())
            .ok_or_else(|| ProviderError::InvalidResponse("response has no embedding".to_string()))
    }
}

//! OpenAI-compatible chat-completions provider.

use async_trait::async_trait;
use llm_bench_core::{CompletionProvider, CoreError, ProviderError, ProviderResult, Result};
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ProviderConfig;
use crate::error::{classify_status, from_reqwest, parse_retry_after};

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    n: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

/// Build the shared HTTP client for a provider configuration.
pub(crate) fn build_http_client(config: &ProviderConfig) -> Result<Client> {
    let mut headers = header::HeaderMap::new();
    headers.insert(
        header::ACCEPT,
        header::HeaderValue::from_static("application/json"),
    );

    if let Some(key) = config.api_key.as_deref().filter(|k| !k.is_empty()) {
        let value = header::HeaderValue::try_from(format!("Bearer {}", key))
            .map_err(|e| CoreError::Config(format!("invalid API key header: {}", e)))?;
        headers.insert(header::AUTHORIZATION, value);
    }

    Client::builder()
        .timeout(config.timeout)
        .connect_timeout(config.connect_timeout)
        .user_agent(format!("llm-bench/{}", env!("CARGO_PKG_VERSION")))
        .default_headers(headers)
        .gzip(true)
        .brotli(true)
        .build()
        .map_err(|e| CoreError::Config(format!("failed to build HTTP client: {}", e)))
}

/// Single unretried call to `POST {base_url}/chat/completions`.
#[derive(Debug, Clone)]
pub struct ChatCompletionsProvider {
    client: Client,
    config: ProviderConfig,
    url: String,
}

impl ChatCompletionsProvider {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        config.validate()?;
        let client = build_http_client(&config)?;
        let url = config.endpoint("chat/completions")?;

        Ok(Self {
            client,
            config,
            url,
        })
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn request_body<'a>(&'a self, prompt: &'a str) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &self.config.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            n: 1,
        }
    }
}

#[async_trait]
impl CompletionProvider for ChatCompletionsProvider {
    async fn complete(&self, prompt: &str) -> ProviderResult<String> {
        debug!(model = %self.config.model, url = %self.url, "Sending chat completion request");

        let response = self
            .client
            .post(&self.url)
            .json(&self.request_body(prompt))
            .send()
            .await
            .map_err(|e| from_reqwest(e, self.config.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, retry_after, &body));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| from_reqwest(e, self.config.timeout))?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .map(|content| content.trim().to_string())
            .ok_or_else(|| {
                ProviderError::InvalidResponse("response has no message content".to_string())
            })
    }

    fn provider_name(&self) -> &str {
        self.config.kind.as_str()
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

//! Retrying text-generation client.

use async_trait::async_trait;
use llm_bench_core::{CompletionProvider, GenerationError, ProviderError, TextGenerator};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::config::ProviderConfig;
use crate::retry::{ExponentialBackoff, RetryConfig, RetryPolicy};

/// `generate(prompt) -> text` over an injected provider.
///
/// Retryable failures (rate limits, transient server errors, timeouts,
/// connection errors) are retried according to the policy; a `Retry-After`
/// hint from the provider raises the delay but never lowers it. Permanent
/// failures are returned after the first attempt. The client holds no
/// per-call state.
#[derive(Clone)]
pub struct GenerationClient {
    provider: Arc<dyn CompletionProvider>,
    policy: Arc<dyn RetryPolicy>,
    call_timeout: Option<Duration>,
}

impl GenerationClient {
    pub fn new(provider: Arc<dyn CompletionProvider>, policy: Arc<dyn RetryPolicy>) -> Self {
        Self {
            provider,
            policy,
            call_timeout: None,
        }
    }

    /// Exponential backoff from `retry`, per-call timeout from the provider config.
    pub fn from_config<P>(provider: P, retry: RetryConfig, config: &ProviderConfig) -> Self
    where
        P: CompletionProvider + 'static,
    {
        Self::new(Arc::new(provider), Arc::new(ExponentialBackoff::new(retry)))
            .with_call_timeout(config.timeout)
    }

    /// Bound every individual provider call.
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = Some(call_timeout);
        self
    }

    pub fn provider_name(&self) -> &str {
        self.provider.provider_name()
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    async fn attempt(&self, prompt: &str) -> Result<String, ProviderError> {
        match self.call_timeout {
            Some(limit) => match timeout(limit, self.provider.complete(prompt)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(ProviderError::Timeout(limit)),
            },
            None => self.provider.complete(prompt).await,
        }
    }
}

impl std::fmt::Debug for GenerationClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationClient")
            .field("provider", &self.provider.provider_name())
            .field("model", &self.provider.model_name())
            .field("max_attempts", &self.policy.max_attempts())
            .field("call_timeout", &self.call_timeout)
            .finish()
    }
}

#[async_trait]
impl TextGenerator for GenerationClient {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let mut failed_attempts = 0;

        loop {
            let error = match self.attempt(prompt).await {
                Ok(text) => {
                    if failed_attempts > 0 {
                        debug!(
                            provider = self.provider_name(),
                            retries = failed_attempts,
                            "Generation succeeded after retries"
                        );
                    }
                    return Ok(text);
                }
                Err(error) => error,
            };
            failed_attempts += 1;

            if !error.is_retryable() {
                warn!(
                    provider = self.provider_name(),
                    model = self.model_name(),
                    error = %error,
                    "Permanent provider error, not retrying"
                );
                return Err(GenerationError::Permanent(error));
            }

            let Some(delay) = self.policy.next_delay(failed_attempts) else {
                warn!(
                    provider = self.provider_name(),
                    model = self.model_name(),
                    attempts = failed_attempts,
                    error = %error,
                    "Retries exhausted"
                );
                return Err(GenerationError::Exhausted {
                    attempts: failed_attempts,
                    last: error,
                });
            };

            let delay = error.retry_after().map_or(delay, |hint| delay.max(hint));
            warn!(
                provider = self.provider_name(),
                attempt = failed_attempts,
                max_attempts = self.policy.max_attempts(),
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Retryable provider error, backing off"
            );
            sleep(delay).await;
        }
    }
}

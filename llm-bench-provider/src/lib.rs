//! Provider-facing side of the benchmark harness.
//!
//! - [`GenerationClient`] wraps any [`CompletionProvider`](llm_bench_core::CompletionProvider)
//!   with a replaceable [`RetryPolicy`] and a per-call timeout.
//! - [`ChatCompletionsProvider`] and [`EmbeddingsProvider`] speak the
//!   OpenAI-compatible HTTP API.
//!
//! # Example
//!
//! ```no_run
//! use llm_bench_core::TextGenerator;
//! use llm_bench_provider::{ChatCompletionsProvider, GenerationClient, ProviderConfig, RetryConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ProviderConfig::openai("gpt-4o-mini").with_api_key("sk-...");
//! let provider = ChatCompletionsProvider::new(config.clone())?;
//! let client = GenerationClient::from_config(provider, RetryConfig::default(), &config);
//!
//! let answer = client.generate("What is the capital of France?").await?;
//! println!("{answer}");
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod openai;
pub mod retry;

pub use client::GenerationClient;
pub use config::{ProviderConfig, ProviderKind};
pub use embeddings::EmbeddingsProvider;
pub use error::{classify_status, from_reqwest, parse_retry_after, MAX_RETRY_AFTER};
pub use openai::ChatCompletionsProvider;
pub use retry::{ConstantBackoff, ExponentialBackoff, JitterStrategy, RetryConfig, RetryPolicy};

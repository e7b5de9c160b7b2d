use async_trait::async_trait;
use crate::error::{GenerationError, ProviderResult, Result};

/// A single, unretried call to a remote text-generation provider.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, prompt: &str) -> ProviderResult<String>;

    /// Provider identity used in logs (e.g. `openai`).
    fn provider_name(&self) -> &str;

    fn model_name(&self) -> &str;
}

/// The `generate(prompt) -> text` capability consumed by the sample generator.
///
/// Implementations own their failure handling; an error returned here is terminal
/// for that attempt.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> std::result::Result<String, GenerationError>;
}

/// Sentence embedding backend for semantic similarity scoring.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> ProviderResult<Vec<f32>>;
}

#[async_trait]
pub trait MetricCalculator {
    type Input;
    type Output;

    async fn calculate(&self, input: Self::Input) -> Result<Self::Output>;
}

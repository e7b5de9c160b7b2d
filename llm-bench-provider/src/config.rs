//! Provider configuration
//!
//! Credentials and model selection are passed in explicitly at construction
//! time; nothing here reads the environment.

use llm_bench_core::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// Provider identity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    OpenAI,
    Azure,
    /// Self-hosted OpenAI-compatible server; no API key required
    Local,
    Custom,
}

impl ProviderKind {
    pub fn default_base_url(&self) -> Option<&'static str> {
        match self {
            ProviderKind::OpenAI => Some("https://api.openai.com/v1"),
            ProviderKind::Local => Some("http://localhost:8000/v1"),
            ProviderKind::Azure | ProviderKind::Custom => None,
        }
    }

    pub fn requires_api_key(&self) -> bool {
        !matches!(self, ProviderKind::Local)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAI => "openai",
            ProviderKind::Azure => "azure",
            ProviderKind::Local => "local",
            ProviderKind::Custom => "custom",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Configuration for a chat-completions or embeddings provider
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub model: String,
    /// Model used by the embeddings endpoint
    pub embedding_model: Option<String>,
    /// Falls back to the kind's default when unset
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub system_prompt: String,
    /// Per-call timeout
    #[serde(rename = "timeout_ms", with = "serde_millis")]
    pub timeout: Duration,
    /// Connection timeout
    #[serde(rename = "connect_timeout_ms", with = "serde_millis")]
    pub connect_timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::OpenAI,
            model: String::new(),
            embedding_model: None,
            base_url: None,
            api_key: None,
            temperature: 0.0,
            max_tokens: None,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("kind", &self.kind)
            .field("model", &self.model)
            .field("embedding_model", &self.embedding_model)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ProviderConfig {
    pub fn new(kind: ProviderKind, model: impl Into<String>) -> Self {
        Self {
            kind,
            model: model.into(),
            ..Default::default()
        }
    }

    pub fn openai(model: impl Into<String>) -> Self {
        Self::new(ProviderKind::OpenAI, model)
    }

    pub fn local(model: impl Into<String>) -> Self {
        Self::new(ProviderKind::Local, model)
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Base URL without a trailing slash
    pub fn resolved_base_url(&self) -> Result<String> {
        let base = self
            .base_url
            .as_deref()
            .or_else(|| self.kind.default_base_url())
            .ok_or_else(|| {
                CoreError::Config(format!("provider {} requires a base_url", self.kind))
            })?;
        Ok(base.trim_end_matches('/').to_string())
    }

    /// Build the full URL for an endpoint
    pub fn endpoint(&self, path: &str) -> Result<String> {
        let base = self.resolved_base_url()?;
        Ok(format!("{}/{}", base, path.trim_start_matches('/')))
    }

    /// Validate the configuration; any failure here is fatal for the run.
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(CoreError::Config("model name cannot be empty".to_string()));
        }

        if self.kind.requires_api_key()
            && self.api_key.as_deref().map_or(true, |k| k.trim().is_empty())
        {
            return Err(CoreError::Config(format!(
                "provider {} requires an API key",
                self.kind
            )));
        }

        let base = self.resolved_base_url()?;
        url::Url::parse(&base)
            .map_err(|e| CoreError::Config(format!("invalid base_url {}: {}", base, e)))?;

        if self.timeout.is_zero() {
            return Err(CoreError::Config("timeout cannot be zero".to_string()));
        }

        Ok(())
    }
}

/// Serde adapter for `Duration` as integer milliseconds.
pub(crate) mod serde_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_ok() {
        let config = ProviderConfig::openai("gpt-4o-mini").with_api_key("sk-test");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_missing_api_key() {
        let config = ProviderConfig::openai("gpt-4o-mini");
        assert!(matches!(config.validate(), Err(CoreError::Config(_))));
    }

    #[test]
    fn test_validate_blank_api_key() {
        let config = ProviderConfig::openai("gpt-4o-mini").with_api_key("  ");
        assert!(matches!(config.validate(), Err(CoreError::Config(_))));
    }

    #[test]
    fn test_local_needs_no_key() {
        let config = ProviderConfig::local("llama3");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_empty_model() {
        let config = ProviderConfig::openai("").with_api_key("sk-test");
        assert!(matches!(config.validate(), Err(CoreError::Config(_))));
    }

    #[test]
    fn test_custom_requires_base_url() {
        let config = ProviderConfig::new(ProviderKind::Custom, "m").with_api_key("k");
        assert!(matches!(config.validate(), Err(CoreError::Config(_))));

        let config = config.with_base_url("not a url");
        assert!(matches!(config.validate(), Err(CoreError::Config(_))));
    }

    #[test]
    fn test_endpoint_joins_paths() {
        let config = ProviderConfig::openai("m").with_base_url("http://localhost:9000/v1/");
        assert_eq!(
            config.endpoint("/chat/completions").unwrap(),
            "http://localhost:9000/v1/chat/completions"
        );
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let config = ProviderConfig::openai("m").with_api_key("sk-secret");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_deserialize_defaults() {
        let config: ProviderConfig =
            serde_json::from_str(r#"{"kind": "local", "model": "llama3", "timeout_ms": 1500}"#)
                .unwrap();

        assert_eq!(config.kind, ProviderKind::Local);
        assert_eq!(config.timeout, Duration::from_millis(1500));
        assert_eq!(config.system_prompt, DEFAULT_SYSTEM_PROMPT);
    }
}

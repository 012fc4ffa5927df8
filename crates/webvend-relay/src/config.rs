//! Configuration for the inference relay.
//!
//! The relay needs to know which wire protocol to speak, where the provider
//! lives, the key to authenticate with, and the default model. The engine
//! builds a [`RelayConfig`] from `webvend-config.yaml` plus the environment.

use serde::Deserialize;

use crate::error::RelayError;

/// Supported provider protocols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// `OpenAI`-compatible chat completions (`OpenRouter`, `OpenAI`, Ollama).
    #[default]
    #[serde(alias = "openrouter", alias = "ollama")]
    OpenAi,
    /// Anthropic Messages API.
    Anthropic,
}

impl BackendType {
    /// Parse a backend name as it appears in config or the environment.
    pub fn from_name(name: &str) -> Result<Self, RelayError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "openai" | "openrouter" | "ollama" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            other => Err(RelayError::Config(format!(
                "unknown backend type: {other} (expected openai, openrouter, ollama, or anthropic)"
            ))),
        }
    }

    /// Human-readable name for logging.
    pub const fn name(self) -> &'static str {
        match self {
            Self::OpenAi => "openai-compatible",
            Self::Anthropic => "anthropic",
        }
    }
}

/// Connection settings for one provider.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Wire protocol.
    pub backend: BackendType,
    /// Base API URL without a trailing slash (e.g. `https://openrouter.ai/api/v1`).
    pub api_url: String,
    /// API key. May be empty for local providers.
    pub api_key: String,
    /// Model used when the caller does not name one.
    pub model: String,
    /// Upper bound on generated tokens per request.
    pub max_tokens: u32,
}

impl RelayConfig {
    /// Build a config, trimming any trailing slash from `api_url`.
    pub fn new(backend: BackendType, api_url: &str, api_key: &str, model: &str) -> Self {
        Self {
            backend,
            api_url: api_url.trim_end_matches('/').to_owned(),
            api_key: api_key.to_owned(),
            model: model.to_owned(),
            max_tokens: 512,
        }
    }

    /// Override the token limit.
    #[must_use]
    pub const fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

//! Completion provider abstraction and the completion gateway.
//!
//! Defines the [`CompletionProvider`] trait and concrete implementations:
//! - **[`DisabledProvider`]**: fails every call; used when no provider is configured.
//! - **[`OpenAiProvider`]**: OpenAI-compatible `POST /chat/completions`.
//! - **[`GeminiProvider`]**: Google Gemini `generateContent`.
//!
//! Providers perform exactly one HTTP request per call and report how the
//! generation finished ([`FinishReason`]). The [`CompletionGateway`] wraps a
//! provider with a [`PromptCache`] and turns blocked, truncated and empty
//! output into [`GatewayError`]s. Retries are not done here; see
//! [`crate::retry`].
//!
//! # Provider Selection
//!
//! ```rust,no_run
//! # use tutorial_harness::config::LlmConfig;
//! # use tutorial_harness::llm::{create_provider, CompletionProvider};
//! let config = LlmConfig { provider: "disabled".into(), ..Default::default() };
//! let provider = create_provider(&config).unwrap();
//! assert_eq!(provider.name(), "disabled");
//! ```

mod gemini;
mod openai;

pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::cache::{create_cache, PromptCache};
use crate::config::{CacheConfig, LlmConfig};
use crate::error::GatewayError;

/// How a provider says generation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishReason {
    /// Normal end of generation.
    Stop,
    /// Stopped early (token limit, recitation, unknown reason).
    Truncated(String),
    /// Refused by the provider's content policy.
    Blocked(String),
}

/// Raw provider answer before the gateway judges it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderResponse {
    pub text: String,
    pub finish: FinishReason,
}

impl ProviderResponse {
    pub fn stop(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            finish: FinishReason::Stop,
        }
    }
}

/// A text-completion backend.
///
/// One call is one request. Implementations report transport and HTTP
/// failures as [`GatewayError::Unavailable`] and leave judging the finish
/// reason to the gateway.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Provider identifier used in logs (e.g. `"gemini"`).
    fn name(&self) -> &str;

    /// Send a single user-role prompt.
    async fn generate(&self, prompt: &str) -> Result<ProviderResponse, GatewayError>;
}

/// Instantiate the provider selected by `[llm].provider`.
///
/// # Errors
///
/// Returns an error for an unknown provider, or when the API key
/// environment variable named by `llm.api_key_env` is not set.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn CompletionProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledProvider)),
        "openai" => Ok(Arc::new(OpenAiProvider::new(config)?)),
        "gemini" => Ok(Arc::new(GeminiProvider::new(config)?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}

pub(crate) fn read_api_key(config: &LlmConfig) -> Result<String> {
    match std::env::var(&config.api_key_env) {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ => bail!(
            "{} environment variable not set (required by llm provider '{}')",
            config.api_key_env,
            config.provider
        ),
    }
}

// ============ Disabled Provider ============

/// A provider that refuses every request.
pub struct DisabledProvider;

#[async_trait]
impl CompletionProvider for DisabledProvider {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn generate(&self, _prompt: &str) -> Result<ProviderResponse, GatewayError> {
        Err(GatewayError::Unavailable(
            "llm provider is disabled; set [llm].provider in the config".to_string(),
        ))
    }
}

// ============ Gateway ============

/// One request/response exchange with a provider, memoized on exact prompt.
#[derive(Clone)]
pub struct CompletionGateway {
    provider: Arc<dyn CompletionProvider>,
    cache: Arc<dyn PromptCache>,
}

impl CompletionGateway {
    pub fn new(provider: Arc<dyn CompletionProvider>, cache: Arc<dyn PromptCache>) -> Self {
        Self { provider, cache }
    }

    /// Provider and cache as selected by `[llm]` and `[cache]`.
    pub fn from_config(llm: &LlmConfig, cache: &CacheConfig) -> Result<Self> {
        Ok(Self::new(create_provider(llm)?, create_cache(cache)?))
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Complete `prompt`, consulting and filling the cache when `use_cache`.
    ///
    /// A cache hit never reaches the provider. Only a successful, non-empty,
    /// normally finished response is written to the cache.
    pub async fn complete(&self, prompt: &str, use_cache: bool) -> Result<String, GatewayError> {
        let fingerprint = prompt_fingerprint(prompt);

        if use_cache {
            if let Some(hit) = self.cache.get(prompt) {
                debug!(prompt = %fingerprint, chars = prompt.len(), "prompt cache hit");
                return Ok(hit);
            }
        }

        debug!(
            provider = self.provider.name(),
            prompt = %fingerprint,
            chars = prompt.len(),
            use_cache,
            "sending completion request"
        );

        let response = self.provider.generate(prompt).await?;

        match response.finish {
            FinishReason::Stop => {}
            FinishReason::Blocked(reason) => return Err(GatewayError::Blocked { reason }),
            FinishReason::Truncated(reason) => return Err(GatewayError::Truncated { reason }),
        }

        if response.text.trim().is_empty() {
            return Err(GatewayError::Empty);
        }

        if use_cache {
            if let Err(e) = self.cache.put(prompt, &response.text) {
                warn!(prompt = %fingerprint, error = %e, "failed to write prompt cache");
            }
        }

        Ok(response.text)
    }
}

/// Short, stable identifier for a prompt in log lines.
pub fn prompt_fingerprint(prompt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    format!("{:x}", hasher.finalize())[..12].to_string()
}

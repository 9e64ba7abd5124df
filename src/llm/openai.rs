//! OpenAI-compatible chat completions backend.
//!
//! Calls `POST {base_url}/chat/completions` with a single user message.
//! Any server speaking the same protocol (OpenRouter, vLLM, Ollama's
//! OpenAI endpoint) works by setting `llm.base_url`.

use anyhow::Result;
use async_trait::async_trait;

use super::{read_api_key, CompletionProvider, FinishReason, ProviderResponse};
use crate::config::LlmConfig;
use crate::error::GatewayError;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiProvider {
    /// Create a provider from `[llm]`.
    ///
    /// # Errors
    ///
    /// Returns an error if the API key variable is unset or the HTTP client
    /// cannot be built.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = read_api_key(config)?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;

        Ok(Self {
            client,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_output_tokens,
        })
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(&self, prompt: &str) -> Result<ProviderResponse, GatewayError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });

        let response = self
            .client
            .post(format!(
                "{}/chat/completions",
                self.base_url.trim_end_matches('/')
            ))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Unavailable(format!("OpenAI request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(GatewayError::Unavailable(format!(
                "OpenAI API error {}: {}",
                status, body_text
            )));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GatewayError::Unavailable(format!("invalid OpenAI response: {}", e)))?;
        parse_openai_response(&json)
    }
}

/// Parse a chat completions response body.
///
/// `stop` is a normal finish, `content_filter` a block, anything else
/// (`length`, `tool_calls`, ...) a truncation.
pub(crate) fn parse_openai_response(
    json: &serde_json::Value,
) -> Result<ProviderResponse, GatewayError> {
    let choice = json
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .ok_or_else(|| {
            GatewayError::Unavailable("Invalid OpenAI response: missing choices".to_string())
        })?;

    let text = choice
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .unwrap_or_default()
        .to_string();

    let finish = match choice.get("finish_reason").and_then(|f| f.as_str()) {
        Some("stop") | None => FinishReason::Stop,
        Some("content_filter") => FinishReason::Blocked("content_filter".to_string()),
        Some(other) => FinishReason::Truncated(other.to_string()),
    };

    Ok(ProviderResponse { text, finish })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_stop() {
        let resp = parse_openai_response(&json!({
            "choices": [{ "message": { "content": "hello" }, "finish_reason": "stop" }]
        }))
        .unwrap();
        assert_eq!(resp, ProviderResponse::stop("hello"));
    }

    #[test]
    fn test_parse_length_is_truncated() {
        let resp = parse_openai_response(&json!({
            "choices": [{ "message": { "content": "hel" }, "finish_reason": "length" }]
        }))
        .unwrap();
        assert_eq!(resp.finish, FinishReason::Truncated("length".into()));
    }

    #[test]
    fn test_parse_content_filter_is_blocked() {
        let resp = parse_openai_response(&json!({
            "choices": [{ "message": { "content": null }, "finish_reason": "content_filter" }]
        }))
        .unwrap();
        assert_eq!(resp.finish, FinishReason::Blocked("content_filter".into()));
        assert!(resp.text.is_empty());
    }

    #[test]
    fn test_parse_missing_choices() {
        assert!(parse_openai_response(&json!({ "error": "nope" })).is_err());
    }
}

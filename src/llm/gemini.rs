//! Google Gemini `generateContent` backend.
//!
//! Sends one user turn with the configured generation parameters and a
//! safety threshold applied to every harm category. Gemini reports a
//! blocked prompt in `promptFeedback.blockReason` and a blocked answer via
//! the candidate's `finishReason`.

use anyhow::Result;
use async_trait::async_trait;

use super::{read_api_key, CompletionProvider, FinishReason, ProviderResponse};
use crate::config::LlmConfig;
use crate::error::GatewayError;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const HARM_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

/// Finish reasons that mean the policy refused the content.
const BLOCKING_FINISH_REASONS: [&str; 4] = ["SAFETY", "BLOCKLIST", "PROHIBITED_CONTENT", "SPII"];

pub struct GeminiProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_output_tokens: u32,
    safety_threshold: String,
}

impl GeminiProvider {
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
            max_output_tokens: config.max_output_tokens,
            safety_threshold: config.safety_threshold.clone(),
        })
    }

    fn request_body(&self, prompt: &str) -> serde_json::Value {
        let safety: Vec<serde_json::Value> = HARM_CATEGORIES
            .iter()
            .map(|category| {
                serde_json::json!({
                    "category": category,
                    "threshold": self.safety_threshold,
                })
            })
            .collect();

        serde_json::json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": self.temperature,
                "maxOutputTokens": self.max_output_tokens,
            },
            "safetySettings": safety,
        })
    }
}

#[async_trait]
impl CompletionProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, prompt: &str) -> Result<ProviderResponse, GatewayError> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );

        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&self.request_body(prompt))
            .send()
            .await
            .map_err(|e| GatewayError::Unavailable(format!("Gemini request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(GatewayError::Unavailable(format!(
                "Gemini API error {}: {}",
                status, body_text
            )));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GatewayError::Unavailable(format!("invalid Gemini response: {}", e)))?;
        parse_gemini_response(&json)
    }
}

/// Parse a `generateContent` response body.
pub(crate) fn parse_gemini_response(
    json: &serde_json::Value,
) -> Result<ProviderResponse, GatewayError> {
    if let Some(reason) = json
        .get("promptFeedback")
        .and_then(|f| f.get("blockReason"))
        .and_then(|r| r.as_str())
    {
        return Ok(ProviderResponse {
            text: String::new(),
            finish: FinishReason::Blocked(reason.to_string()),
        });
    }

    let candidate = json
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .ok_or_else(|| {
            GatewayError::Unavailable("Invalid Gemini response: missing candidates".to_string())
        })?;

    let text: String = candidate
        .get("content")
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array())
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
                .collect()
        })
        .unwrap_or_default();

    let finish = match candidate.get("finishReason").and_then(|f| f.as_str()) {
        Some("STOP") | None => FinishReason::Stop,
        Some(r) if BLOCKING_FINISH_REASONS.contains(&r) => FinishReason::Blocked(r.to_string()),
        Some(other) => FinishReason::Truncated(other.to_string()),
    };

    Ok(ProviderResponse { text, finish })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_joins_parts() {
        let resp = parse_gemini_response(&json!({
            "candidates": [{
                "content": { "parts": [{ "text": "Hello, " }, { "text": "world" }] },
                "finishReason": "STOP"
            }]
        }))
        .unwrap();
        assert_eq!(resp, ProviderResponse::stop("Hello, world"));
    }

    #[test]
    fn test_prompt_block_reason() {
        let resp = parse_gemini_response(&json!({
            "promptFeedback": { "blockReason": "OTHER" }
        }))
        .unwrap();
        assert_eq!(resp.finish, FinishReason::Blocked("OTHER".into()));
    }

    #[test]
    fn test_safety_finish_is_blocked() {
        let resp = parse_gemini_response(&json!({
            "candidates": [{ "finishReason": "SAFETY" }]
        }))
        .unwrap();
        assert_eq!(resp.finish, FinishReason::Blocked("SAFETY".into()));
    }

    #[test]
    fn test_max_tokens_is_truncated() {
        let resp = parse_gemini_response(&json!({
            "candidates": [{
                "content": { "parts": [{ "text": "partial" }] },
                "finishReason": "MAX_TOKENS"
            }]
        }))
        .unwrap();
        assert_eq!(resp.finish, FinishReason::Truncated("MAX_TOKENS".into()));
    }
}

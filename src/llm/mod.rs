//! LLM completion client.
//!
//! The vagueness evaluator only needs single-shot text completions, so the
//! seam is a one-method trait. `AnthropicClient` implements it against the
//! Anthropic messages API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};

use crate::error::{KanbotError, Result};

/// Anthropic API base URL
const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";

/// Anthropic API version
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Default model: small and fast, verdicts are a few dozen tokens.
const DEFAULT_MODEL: &str = "claude-haiku-4-20250514";

/// Default max tokens per verdict.
const DEFAULT_MAX_TOKENS: u32 = 150;

/// One-shot completion client.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Send a single prompt and return the model's text response.
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Configuration for the Anthropic client.
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub model: String,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Anthropic API client.
pub struct AnthropicClient {
    client: Client,
    api_key: String,
    config: AnthropicConfig,
}

impl AnthropicClient {
    /// Create a new client, reading ANTHROPIC_API_KEY from the environment.
    pub fn new(config: AnthropicConfig) -> Result<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| KanbotError::Classifier("ANTHROPIC_API_KEY not set".to_string()))?;
        Self::with_api_key(api_key, config)
    }

    /// Create a client with an explicit API key.
    pub fn with_api_key(api_key: String, config: AnthropicConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| KanbotError::Classifier(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            config,
        })
    }

    fn build_request(&self, prompt: &str) -> Value {
        json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "messages": [{ "role": "user", "content": prompt }]
        })
    }

    /// Concatenate the text blocks of a messages API response.
    fn extract_text(body: &Value) -> String {
        let mut content = String::new();
        if let Some(blocks) = body["content"].as_array() {
            for block in blocks {
                if block["type"].as_str() != Some("text") {
                    continue;
                }
                if let Some(text) = block["text"].as_str() {
                    if !content.is_empty() {
                        content.push('\n');
                    }
                    content.push_str(text);
                }
            }
        }
        content
    }
}

#[async_trait]
impl CompletionClient for AnthropicClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = self.build_request(prompt);

        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| KanbotError::Classifier(format!("Request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(KanbotError::Classifier(format!(
                "API error {status}: {error_body}"
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| KanbotError::Classifier(format!("Failed to parse response: {e}")))?;

        Ok(Self::extract_text(&body))
    }
}

impl std::fmt::Debug for AnthropicClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicClient")
            .field("model", &self.config.model)
            .field("max_tokens", &self.config.max_tokens)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = AnthropicConfig::default();
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.max_tokens, DEFAULT_MAX_TOKENS);
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_client_with_api_key() {
        let client =
            AnthropicClient::with_api_key("test-key".to_string(), AnthropicConfig::default());
        assert!(client.is_ok());
    }

    #[test]
    fn test_build_request() {
        let client =
            AnthropicClient::with_api_key("test-key".to_string(), AnthropicConfig::default())
                .unwrap();
        let body = client.build_request("Is this task vague?");

        assert_eq!(body["model"], DEFAULT_MODEL);
        assert_eq!(body["max_tokens"], DEFAULT_MAX_TOKENS);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "Is this task vague?");
    }

    #[test]
    fn test_extract_text_single_block() {
        let body = json!({
            "content": [{ "type": "text", "text": "{\"isVague\": false}" }]
        });
        assert_eq!(AnthropicClient::extract_text(&body), "{\"isVague\": false}");
    }

    #[test]
    fn test_extract_text_joins_blocks() {
        let body = json!({
            "content": [
                { "type": "text", "text": "first" },
                { "type": "tool_use", "id": "t1", "name": "x", "input": {} },
                { "type": "text", "text": "second" }
            ]
        });
        assert_eq!(AnthropicClient::extract_text(&body), "first\nsecond");
    }

    #[test]
    fn test_extract_text_empty_content() {
        let body = json!({ "content": [] });
        assert_eq!(AnthropicClient::extract_text(&body), "");
        assert_eq!(AnthropicClient::extract_text(&json!({})), "");
    }

    #[test]
    fn test_debug_hides_api_key() {
        let client =
            AnthropicClient::with_api_key("test-key".to_string(), AnthropicConfig::default())
                .unwrap();
        let debug_str = format!("{client:?}");
        assert!(debug_str.contains("AnthropicClient"));
        assert!(!debug_str.contains("test-key"));
    }

    #[test]
    fn test_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AnthropicClient>();
    }
}

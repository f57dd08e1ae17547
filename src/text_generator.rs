//! # Text Generator
//!
//! The text-generation collaborator: given a prompt, return one completion.
//!
//! [`OpenAiClient`] talks to an OpenAI-compatible `/chat/completions` endpoint.
//! Every call is bounded by a timeout and guarded by a [`CircuitBreaker`]; no
//! retries are attempted.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::circuit_breaker::CircuitBreaker;
use crate::config::{AppConfig, BreakerConfig};
use crate::errors::RecipeError;

pub const SYSTEM_PROMPT: &str = "You are a helpful chef and nutritionist.";

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, temperature: f32) -> Result<String, RecipeError>;
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
        }
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatChoice {
    pub message: ChatMessage,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

impl ChatCompletionResponse {
    /// Content of the first choice, if it has any text
    pub fn first_content(&self) -> Option<&str> {
        self.choices
            .first()
            .map(|choice| choice.message.content.trim())
            .filter(|content| !content.is_empty())
    }
}

/// Chat-completions client with timeout and circuit breaker
#[derive(Debug)]
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    timeout: Duration,
    breaker: CircuitBreaker,
}

impl OpenAiClient {
    pub fn new(
        api_key: &str,
        base_url: &str,
        model: &str,
        timeout: Duration,
        breaker: BreakerConfig,
    ) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            timeout,
            breaker: CircuitBreaker::new(breaker),
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, RecipeError> {
        Ok(Self::new(
            config.require_api_key()?,
            &config.openai_base_url,
            &config.generation.model,
            config.generation.timeout(),
            config.breaker.clone(),
        ))
    }

    fn request(&self, prompt: &str, temperature: f32) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage::new("system", SYSTEM_PROMPT),
                ChatMessage::new("user", prompt),
            ],
            temperature: Some(temperature),
        }
    }

    async fn call(&self, request: &ChatCompletionRequest) -> Result<String, RecipeError> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| RecipeError::Generation(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            return Err(RecipeError::Generation(format!("API error {status}: {body}")));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| RecipeError::Generation(format!("invalid response: {e}")))?;
        completion
            .first_content()
            .map(String::from)
            .ok_or_else(|| RecipeError::Generation("empty completion".to_string()))
    }
}

#[async_trait]
impl TextGenerator for OpenAiClient {
    async fn generate(&self, prompt: &str, temperature: f32) -> Result<String, RecipeError> {
        if self.breaker.is_open() {
            warn!(failures = self.breaker.failure_count(), "Text generation circuit is open");
            return Err(RecipeError::CircuitOpen);
        }

        let request = self.request(prompt, temperature);
        let result = match tokio::time::timeout(self.timeout, self.call(&request)).await {
            Ok(result) => result,
            Err(_) => Err(RecipeError::Timeout(self.timeout)),
        };

        match &result {
            Ok(content) => {
                self.breaker.record_success();
                debug!(model = %self.model, chars = content.len(), "Received completion");
            }
            Err(err) => {
                self.breaker.record_failure();
                warn!(model = %self.model, error = %err, "Text generation failed");
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_shape() -> anyhow::Result<()> {
        let client = OpenAiClient::new(
            "key",
            "https://example.test/v1/",
            "gpt-3.5-turbo",
            Duration::from_secs(5),
            BreakerConfig::default(),
        );
        let value = serde_json::to_value(client.request("Make soup", 0.7))?;

        assert_eq!(value["model"], json!("gpt-3.5-turbo"));
        assert_eq!(value["messages"][0]["role"], json!("system"));
        assert_eq!(value["messages"][1]["content"], json!("Make soup"));
        assert!((value["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);
        assert_eq!(client.base_url, "https://example.test/v1");
        Ok(())
    }

    #[test]
    fn test_first_content() -> anyhow::Result<()> {
        let response: ChatCompletionResponse = serde_json::from_value(json!({
            "choices": [{"message": {"role": "assistant", "content": "  RECIPE 1: Soup  "}}]
        }))?;
        assert_eq!(response.first_content(), Some("RECIPE 1: Soup"));

        let empty: ChatCompletionResponse = serde_json::from_value(json!({"choices": []}))?;
        assert_eq!(empty.first_content(), None);
        Ok(())
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_fails_and_trips_breaker() {
        let client = OpenAiClient::new(
            "key",
            "http://127.0.0.1:9",
            "gpt-3.5-turbo",
            Duration::from_secs(5),
            BreakerConfig {
                failure_threshold: 1,
                reset_secs: 60,
            },
        );

        let first = client.generate("prompt", 0.7).await;
        assert!(matches!(
            first,
            Err(RecipeError::Generation(_)) | Err(RecipeError::Timeout(_))
        ));
        assert_eq!(client.generate("prompt", 0.7).await, Err(RecipeError::CircuitOpen));
    }
}

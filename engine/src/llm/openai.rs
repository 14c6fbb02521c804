//! OpenAI-compatible completion client
//!
//! Talks to any endpoint exposing `POST {api_base}/chat/completions`: hosted
//! APIs used as judgers and the local vLLM backend used for candidates.
//! Transient failures (rate limits, network errors, timeouts, 5xx) are retried
//! with exponential backoff; everything else is returned immediately.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;

use super::{CompletionClient, LLMError, Message, Result};
use crate::config::ModelConfig;

/// Initial pause before the first retry; doubled on each further attempt
const BASE_BACKOFF: Duration = Duration::from_millis(500);

/// Upper bound on a single retry pause
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Pause before retry number `attempt + 1`
fn backoff_delay(attempt: u32) -> Duration {
    BASE_BACKOFF
        .saturating_mul(2u32.saturating_pow(attempt))
        .min(MAX_BACKOFF)
}

pub struct OpenAICompatibleClient {
    /// Registry name of the model, used in logs
    name: String,

    /// Base URL, without the trailing `/chat/completions`
    api_base: String,

    /// Model identifier sent in each request
    model: String,

    api_key: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    max_retries: u32,
    client: Client,
}

impl OpenAICompatibleClient {
    pub fn new(
        name: impl Into<String>,
        api_base: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LLMError::InvalidRequest(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            name: name.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: None,
            temperature: None,
            max_tokens: None,
            max_retries: 0,
            client,
        })
    }

    /// Build a client from a registry entry
    pub fn from_config(name: &str, config: &ModelConfig) -> Result<Self> {
        let api_base = config.endpoints.api_base.clone().ok_or_else(|| {
            LLMError::InvalidRequest(format!("Model `{}` has no api_base", name))
        })?;
        let model = config
            .request_model()
            .ok_or_else(|| LLMError::InvalidRequest(format!("Model `{}` has no name", name)))?;

        let mut client = Self::new(name, api_base, model, config.timeout())?;
        client.api_key = config.api_key();
        client.temperature = config.temperature;
        client.max_tokens = config.max_tokens;
        client.max_retries = config.max_retries;
        Ok(client)
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    fn build_payload(&self, messages: &[Message]) -> serde_json::Value {
        let api_messages: Vec<serde_json::Value> = messages
            .iter()
            .map(|msg| {
                json!({
                    "role": msg.role.to_string(),
                    "content": msg.content
                })
            })
            .collect();

        let mut payload = json!({
            "model": self.model,
            "messages": api_messages,
        });
        if let Some(temperature) = self.temperature {
            payload["temperature"] = json!(temperature);
        }
        if let Some(max_tokens) = self.max_tokens {
            payload["max_tokens"] = json!(max_tokens);
        }
        payload
    }

    async fn send_once(&self, payload: &serde_json::Value) -> Result<String> {
        let url = format!("{}/chat/completions", self.api_base);

        let mut request = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(payload);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                LLMError::Timeout
            } else if e.is_connect() {
                LLMError::ProviderUnavailable(format!("Cannot connect to {}", self.api_base))
            } else {
                LLMError::NetworkError(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();

            return Err(match status.as_u16() {
                401 | 403 => LLMError::AuthenticationFailed(text),
                429 => LLMError::RateLimitExceeded,
                code if code >= 500 => {
                    LLMError::ProviderUnavailable(format!("HTTP {}: {}", status, text))
                }
                _ => LLMError::InvalidRequest(text),
            });
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LLMError::ParseError(e.to_string()))?;

        data.pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| LLMError::ParseError("No message content in response".to_string()))
    }
}

#[async_trait]
impl CompletionClient for OpenAICompatibleClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, messages: &[Message]) -> Result<String> {
        let payload = self.build_payload(messages);

        tracing::debug!(
            "Completion request: model={}, messages={}, total_chars={}",
            self.name,
            messages.len(),
            messages.iter().map(|m| m.content.len()).sum::<usize>()
        );

        let mut attempt = 0;
        loop {
            let start = std::time::Instant::now();
            match self.send_once(&payload).await {
                Ok(text) => {
                    tracing::debug!(
                        "{} responded in {:.1}s",
                        self.name,
                        start.elapsed().as_secs_f64()
                    );
                    return Ok(text);
                }
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    let delay = backoff_delay(attempt);
                    attempt += 1;
                    tracing::warn!(
                        "{} request failed ({}), retry {}/{} in {:?}",
                        self.name,
                        e,
                        attempt,
                        self.max_retries,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

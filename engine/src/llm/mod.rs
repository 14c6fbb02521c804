//! Completion Client Abstraction Layer
//!
//! This module provides the common interface the conversation driver uses to
//! talk to both model roles (candidate and judger). The `CompletionClient`
//! trait defines the contract: an ordered message history goes in, a single
//! text completion comes out.

use async_trait::async_trait;
use sdk::errors::BenchError;

pub mod openai;

pub use sdk::types::{Message, MessageRole};

/// Result type for completion operations
pub type Result<T> = std::result::Result<T, LLMError>;

/// Errors that can occur during completion calls
#[derive(Debug, thiserror::Error)]
pub enum LLMError {
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timeout")]
    Timeout,

    #[error("Parse error: {0}")]
    ParseError(String),
}

impl LLMError {
    /// Whether retrying the same request may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LLMError::RateLimitExceeded
                | LLMError::NetworkError(_)
                | LLMError::Timeout
                | LLMError::ProviderUnavailable(_)
        )
    }
}

impl From<LLMError> for BenchError {
    fn from(err: LLMError) -> Self {
        BenchError::Completion(err.to_string())
    }
}

/// Chat-completion client that every model endpoint implements
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Returns the name of the model behind this client
    fn name(&self) -> &str;

    /// Generate a completion for the given message history
    ///
    /// # Arguments
    /// * `messages` - Full transcript, system prompt first
    ///
    /// # Returns
    /// * `Ok(String)` - The completion text
    /// * `Err(LLMError)` - If the request fails after the client's own retries
    async fn complete(&self, messages: &[Message]) -> Result<String>;
}

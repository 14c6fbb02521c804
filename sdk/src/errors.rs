//! Error types and handling
//!
//! This module provides the error types used throughout the rolebench engine.
//! All errors implement the `BenchErrorExt` trait which provides user-friendly
//! hints and indicates whether errors are recoverable.
//!
//! # Error Categories
//!
//! - **Decision**: Judger output that could not be turned into a decision
//! - **Completion**: Chat-completion failures (network, auth, rate limit)
//! - **Task**: Any failure inside one character task
//! - **Configuration**: Missing dataset, missing model entry, bad judger registry
//! - **Service**: Local inference backend failures
//!
//! # Examples
//!
//! ```
//! use sdk::errors::{BenchError, BenchErrorExt};
//!
//! let error = BenchError::MalformedDecision("no JSON object found".to_string());
//! assert!(error.is_recoverable());
//!
//! let fatal = BenchError::Config("judger registry must hold exactly one model".to_string());
//! assert!(!fatal.is_recoverable());
//! println!("Hint: {}", fatal.user_hint());
//! ```

use thiserror::Error;

/// Trait for rolebench error extensions
pub trait BenchErrorExt {
    /// Returns a user-friendly hint for the error
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors are retried or absorbed at some layer of the run.
    /// Non-recoverable errors stop the run before any task is scheduled.
    fn is_recoverable(&self) -> bool;
}

/// Main engine error type
#[derive(Debug, Error)]
pub enum BenchError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Dataset errors
    #[error("Dataset error: {0}")]
    Dataset(String),

    // Judger decision errors
    #[error("Malformed judger decision: {0}")]
    MalformedDecision(String),

    #[error("Judger produced no parseable decision after {attempts} attempts")]
    JudgerUnresponsive { attempts: u32 },

    // Completion client errors
    #[error("Completion failed: {0}")]
    Completion(String),

    // Prompt rendering errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    // Per-character task errors
    #[error("Task {index} failed: {message}")]
    Task { index: usize, message: String },

    // Local backend errors
    #[error("Service error: {0}")]
    Service(String),

    #[error("Interrupted")]
    Interrupted,

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BenchErrorExt for BenchError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Config(_) => "Check your rolebench config.toml for errors",
            Self::Dataset(_) => "Check that the dataset file exists and is valid JSONL",
            Self::MalformedDecision(_) => "The judger reply did not contain a complete JSON decision",
            Self::JudgerUnresponsive { .. } => {
                "The judger keeps producing malformed decisions. Raise judger_retry_limit or check the judger prompt"
            }
            Self::Completion(_) => "Model endpoint unavailable. Check api_base, API keys and network",
            Self::Prompt(_) => "The character record is missing a persona field",
            Self::Task { .. } => "One character failed. See the log for the failing index",
            Self::Service(_) => "Local backend failed. Check the vllm_log directory",
            Self::Interrupted => "The run was interrupted before it finished",
            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            // Fatal before any task runs
            Self::Config(_) | Self::Dataset(_) | Self::Service(_) | Self::Interrupted => false,

            // Absorbed by retries or by the scheduler
            _ => true,
        }
    }
}

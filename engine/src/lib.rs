//! rolebench Engine Library
//!
//! This library provides the core functionality of the rolebench harness.
//! It is used by both the main binary and integration tests.

/// Configuration management module
pub mod config;

/// Dataset loading module
pub mod dataset;

/// Completion client abstraction layer
pub mod llm;

/// Persona and judger prompt templates
pub mod prompt;

/// Judger decision parsing
pub mod judger;

/// Per-character conversation driver
pub mod conversation;

/// Bounded parallel task scheduler
pub mod scheduler;

/// Interrupt propagation
pub mod shutdown;

/// Local inference backend lifecycle
pub mod service;

/// Result persistence
pub mod output;

/// Evaluation orchestration
pub mod orchestrator;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;

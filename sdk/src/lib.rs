//! Rolebench SDK
//!
//! Shared data model and error taxonomy for the rolebench engine.

/// Error types and handling
pub mod errors;

/// Messages, character records and evaluation results
pub mod types;

// Re-export commonly used types
pub use errors::{BenchError, BenchErrorExt};
pub use types::{
    CharacterRecord, DialogueTurn, EvaluationResult, IndexedResult, Message, MessageRole,
    NpcProfile,
};

//! Shared data model
//!
//! Messages and transcripts exchanged with the models, the character records
//! read from a dataset, and the evaluation results written back out.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Message in a conversation history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    /// Role of the message sender (system, user, assistant)
    pub role: MessageRole,

    /// Content of the message
    pub content: String,
}

impl Message {
    /// Create a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    /// Create a new assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }

    /// Create a new system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }
}

/// Role of a message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// User message
    User,

    /// Assistant message
    Assistant,

    /// System message
    System,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::System => write!(f, "system"),
        }
    }
}

/// Persona attributes of an NPC, keyed by attribute name
/// (`name_text`, `title`, `description`, `definition_text`, `long_definition_text`).
pub type NpcProfile = serde_json::Map<String, serde_json::Value>;

/// One turn of the reference dialogue stored with a character
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DialogueTurn {
    /// Sentences spoken in this turn
    #[serde(default)]
    pub sentences: Vec<String>,
}

/// One persona + background + opening dialogue unit from the dataset
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CharacterRecord {
    /// Persona attributes rendered into the system prompts
    pub npc_profile: NpcProfile,

    /// Free-text scene background
    #[serde(default)]
    pub background: String,

    /// Reference dialogue; only the first turn is used
    #[serde(default)]
    pub conversation: Vec<DialogueTurn>,
}

impl CharacterRecord {
    /// The NPC's opening line: the first turn's sentences joined by newlines.
    pub fn greeting(&self) -> Option<String> {
        self.conversation
            .first()
            .map(|turn| turn.sentences.join("\n"))
    }
}

/// Snapshot of both transcripts at one judged turn
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvaluationResult {
    /// Candidate transcript up to and including the simulated user's line
    pub candidate_messages: Vec<Message>,

    /// Judger transcript up to and including the candidate's relayed reply
    pub judger_messages: Vec<Message>,

    /// Raw judger completion for this turn
    pub judger_response: String,
}

/// Results of one character task tagged with its dataset position
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedResult<T> {
    /// Position of the record in the input dataset
    pub index: usize,

    /// Task output
    pub value: T,
}

impl<T> IndexedResult<T> {
    pub fn new(index: usize, value: T) -> Self {
        Self { index, value }
    }
}

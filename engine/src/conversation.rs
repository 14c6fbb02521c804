//! Conversation Driver
//!
//! Runs one character's simulated dialogue. Two transcripts are kept side by
//! side: the candidate transcript (persona prompt, NPC greeting, then
//! user/assistant turns) and the judger transcript (judger prompt, greeting
//! as user input, then the judger's decisions interleaved with the
//! candidate's replies).
//!
//! Each turn:
//! 1. The judger's last `next_round_user_speaks` becomes a user message for the candidate
//! 2. The candidate replies
//! 3. The reply is relayed to the judger as user input
//! 4. The judger answers with a new decision (retried while it is malformed)
//! 5. Both transcripts are snapshotted and retained per the retention policy
//! 6. The judger's decision and the candidate's reply are appended as assistant turns

use std::sync::Arc;
use std::time::Duration;

use sdk::errors::BenchError;
use sdk::types::{CharacterRecord, EvaluationResult, Message, MessageRole};
use tracing::{debug, warn};

use crate::config::{EvalConfig, Language, Retention};
use crate::judger::{parse_decision, JudgerDecision};
use crate::llm::CompletionClient;
use crate::prompt::{render_judger_prompt, render_model_prompt};

/// Per-run settings shared by every conversation
#[derive(Debug, Clone)]
pub struct DriverSettings {
    /// Turns per character
    pub max_turns: usize,

    /// Retries of a judger call whose reply holds no decision
    pub judger_retry_limit: u32,

    /// Pause between judger retries
    pub judger_retry_backoff: Duration,

    /// Which turn snapshots are returned
    pub retention: Retention,

    /// Prompt language
    pub language: Language,
}

impl DriverSettings {
    pub fn from_config(eval: &EvalConfig, language: Language) -> Self {
        Self {
            max_turns: eval.max_turns,
            judger_retry_limit: eval.judger_retry_limit,
            judger_retry_backoff: eval.judger_retry_backoff(),
            retention: eval.retention,
            language,
        }
    }
}

/// Ordered message history exchanged with one model role
#[derive(Debug, Clone)]
pub struct Transcript {
    messages: Vec<Message>,

    /// Number of opening messages that precede the first turn
    opening: usize,
}

impl Transcript {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(system_prompt)],
            opening: 1,
        }
    }

    /// Append a message. Protocol appends never repeat the previous role.
    pub fn push(&mut self, message: Message) {
        debug_assert!(
            self.messages.last().map(|m| m.role) != Some(message.role),
            "consecutive {} messages",
            message.role
        );
        self.messages.push(message);
    }

    /// Mark everything appended so far as part of the opening
    pub fn mark_opened(&mut self) {
        self.opening = self.messages.len();
    }

    /// Turns completed since the opening (each turn is two messages)
    pub fn completed_turns(&self) -> usize {
        (self.messages.len() - self.opening) / 2
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last_role(&self) -> Option<MessageRole> {
        self.messages.last().map(|m| m.role)
    }

    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }
}

/// Drives candidate and judger through one character's dialogue
pub struct ConversationDriver {
    candidate: Arc<dyn CompletionClient>,
    judger: Arc<dyn CompletionClient>,
    settings: DriverSettings,
}

impl ConversationDriver {
    pub fn new(
        candidate: Arc<dyn CompletionClient>,
        judger: Arc<dyn CompletionClient>,
        settings: DriverSettings,
    ) -> Self {
        Self {
            candidate,
            judger,
            settings,
        }
    }

    /// Run the full dialogue for one character.
    ///
    /// # Errors
    ///
    /// - `BenchError::Prompt` if the record has no greeting or persona fields are missing
    /// - `BenchError::Completion` if either model call fails
    /// - `BenchError::JudgerUnresponsive` if the judger retry ceiling is exhausted
    pub async fn run(&self, record: &CharacterRecord) -> Result<Vec<EvaluationResult>, BenchError> {
        let greeting = record
            .greeting()
            .ok_or_else(|| BenchError::Prompt("conversation has no greeting turn".to_string()))?;

        let language = self.settings.language;
        let mut candidate = Transcript::new(render_model_prompt(
            &record.npc_profile,
            &record.background,
            language,
        )?);
        candidate.push(Message::assistant(greeting.clone()));
        candidate.mark_opened();

        let mut judger = Transcript::new(render_judger_prompt(&record.npc_profile, language)?);
        judger.push(Message::user(greeting));

        // Bootstrap: the judger opens as the simulated user
        let (mut judger_response, mut decision) = self.judge(&judger).await?;
        judger.push(Message::assistant(judger_response));
        judger.mark_opened();

        let last_turn = self.settings.max_turns.saturating_sub(1);
        let mut results = Vec::new();

        for turn in 0..self.settings.max_turns {
            candidate.push(Message::user(decision.next_round_user_speaks));

            let reply = self.candidate.complete(candidate.messages()).await?;
            debug!("Turn {}: candidate replied with {} chars", turn, reply.len());

            judger.push(Message::user(reply.clone()));
            (judger_response, decision) = self.judge(&judger).await?;

            let snapshot = EvaluationResult {
                candidate_messages: candidate.snapshot(),
                judger_messages: judger.snapshot(),
                judger_response: judger_response.clone(),
            };
            if self.settings.retention == Retention::AllTurns || turn == last_turn {
                results.push(snapshot);
            }

            judger.push(Message::assistant(judger_response));
            candidate.push(Message::assistant(reply));
            debug_assert_eq!(candidate.completed_turns(), judger.completed_turns());
        }

        Ok(results)
    }

    /// Call the judger until its reply parses into a decision.
    ///
    /// The transcript is never modified here; every retry resends the same history.
    async fn judge(&self, transcript: &Transcript) -> Result<(String, JudgerDecision), BenchError> {
        let mut retries = 0u32;

        loop {
            let response = self.judger.complete(transcript.messages()).await?;

            match parse_decision(&response) {
                Ok(decision) => return Ok((response, decision)),
                Err(e) => {
                    if retries >= self.settings.judger_retry_limit {
                        return Err(BenchError::JudgerUnresponsive {
                            attempts: retries + 1,
                        });
                    }
                    retries += 1;
                    warn!(
                        "{} ({}), retry {}/{}",
                        e,
                        self.judger.name(),
                        retries,
                        self.settings.judger_retry_limit
                    );
                    debug!("Unparseable judger response: {}", response);
                    tokio::time::sleep(self.settings.judger_retry_backoff).await;
                }
            }
        }
    }
}

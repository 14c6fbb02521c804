//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use rolebench_engine::config::{Language, Retention};
use rolebench_engine::conversation::DriverSettings;
use rolebench_engine::llm::{CompletionClient, LLMError, Message, Result};
use sdk::types::CharacterRecord;

pub const DECISION: &str =
    r#"{"winner":"model_a","next_round_user_speaks":"Tell me more.","decision_reason":null}"#;

/// Completion client that replays a fixed script and records every request
pub struct ScriptedClient {
    name: String,
    script: Mutex<VecDeque<Result<String>>>,
    fallback: String,
    requests: Mutex<Vec<Vec<Message>>>,
    delay: Duration,
}

impl ScriptedClient {
    /// Always answers `reply`
    pub fn constant(name: &str, reply: &str) -> Self {
        Self::scripted(name, Vec::new(), reply)
    }

    /// Answers from `script` in order, then `fallback` forever
    pub fn scripted(name: &str, script: Vec<Result<String>>, fallback: &str) -> Self {
        Self {
            name: name.to_string(),
            script: Mutex::new(script.into()),
            fallback: fallback.to_string(),
            requests: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
        }
    }

    /// Always fails as unavailable
    pub fn failing(name: &str) -> Self {
        Self::scripted(
            name,
            (0..64)
                .map(|_| Err(LLMError::ProviderUnavailable("down".to_string())))
                .collect(),
            "",
        )
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, messages: &[Message]) -> Result<String> {
        self.requests.lock().unwrap().push(messages.to_vec());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}

/// A complete character record opening with `greeting`
pub fn record(name: &str, greeting: &str) -> CharacterRecord {
    serde_json::from_value(json!({
        "npc_profile": {
            "name_text": name,
            "title": "Innkeeper",
            "description": "Keeps the inn at the crossroads.",
            "definition_text": "Warm and talkative.",
            "long_definition_text": "Has run the inn for twenty years.",
        },
        "background": "A rainy evening at the inn.",
        "conversation": [{ "sentences": [greeting] }],
    }))
    .unwrap()
}

pub fn settings(max_turns: usize, retention: Retention) -> DriverSettings {
    DriverSettings {
        max_turns,
        judger_retry_limit: 10,
        judger_retry_backoff: Duration::from_millis(1),
        retention,
        language: Language::En,
    }
}

//! Judger Response Parser
//!
//! The judger model answers every turn with a JSON decision, but it routinely
//! wraps that decision in prose or markdown code fences. This module locates
//! the decision object anywhere in the completion and deserializes it.
//!
//! Handles multiple judger output formats:
//! 1. Raw JSON: `{"winner": "...", "next_round_user_speaks": "...", ...}`
//! 2. Fenced JSON (with or without surrounding text): ` ```json\n{...}\n``` `
//! 3. JSON embedded in prose, found by scanning for balanced `{...}` objects
//!
//! Parsing is all-or-nothing: a decision missing `winner` or
//! `next_round_user_speaks` is rejected, never returned partially filled.

use sdk::errors::BenchError;
use serde::{Deserialize, Serialize};

/// Structured decision returned by the judger each turn
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JudgerDecision {
    /// Preferred model label (the judger currently always answers "model_a")
    pub winner: String,

    /// The simulated user's next utterance
    pub next_round_user_speaks: String,

    /// Free-text justification; may be empty or null
    #[serde(default)]
    pub decision_reason: Option<String>,
}

/// Extract a judger decision from a completion.
///
/// # Errors
///
/// Returns `BenchError::MalformedDecision` when no JSON object in the text
/// deserializes into a complete decision.
pub fn parse_decision(content: &str) -> Result<JudgerDecision, BenchError> {
    let trimmed = content.trim();
    let mut last_error: Option<String> = None;

    let mut attempt = |candidate: &str| -> Option<JudgerDecision> {
        match serde_json::from_str::<JudgerDecision>(candidate) {
            Ok(decision) => Some(decision),
            Err(e) => {
                last_error = Some(e.to_string());
                None
            }
        }
    };

    // Pattern 1: the whole completion is the decision
    if trimmed.starts_with('{') {
        if let Some(decision) = attempt(trimmed) {
            return Ok(decision);
        }
    }

    // Pattern 2: markdown code fences
    for body in fenced_blocks(trimmed) {
        if let Some(decision) = attempt(body.trim()) {
            return Ok(decision);
        }
    }

    // Pattern 3: any balanced object embedded in prose
    for (pos, _) in trimmed.match_indices('{') {
        if let Some(json_str) = extract_balanced_json(&trimmed[pos..]) {
            if let Some(decision) = attempt(json_str) {
                return Ok(decision);
            }
        }
    }

    Err(BenchError::MalformedDecision(match last_error {
        Some(e) => e,
        None => "no JSON object found".to_string(),
    }))
}

/// Bodies of all markdown code fences in the text, in order.
///
/// The language tag line (e.g. "json") after the opening fence is skipped.
fn fenced_blocks(content: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut rest = content;

    while let Some(fence_start) = rest.find("```") {
        let after_opening = &rest[fence_start + 3..];
        let Some(newline) = after_opening.find('\n') else {
            break;
        };
        let body = &after_opening[newline + 1..];
        let Some(closing) = body.find("```") else {
            break;
        };
        blocks.push(&body[..closing]);
        rest = &body[closing + 3..];
    }

    blocks
}

/// Extract a balanced JSON object starting at position 0 of `s`.
///
/// Counts `{` / `}` depth, respecting string literals, to find the
/// matching close brace.
fn extract_balanced_json(s: &str) -> Option<&str> {
    if !s.starts_with('{') {
        return None;
    }
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const DECISION: &str =
        r#"{"winner": "model_a", "next_round_user_speaks": "Tell me more.", "decision_reason": "None"}"#;

    fn expected() -> JudgerDecision {
        JudgerDecision {
            winner: "model_a".to_string(),
            next_round_user_speaks: "Tell me more.".to_string(),
            decision_reason: Some("None".to_string()),
        }
    }

    #[test]
    fn test_raw_json() {
        assert_eq!(parse_decision(DECISION).unwrap(), expected());
    }

    #[test]
    fn test_fenced_json_with_prose() {
        let content = format!(
            "Here is my decision:\n```json\n{}\n```\nLet me know if you need more.",
            DECISION
        );
        assert_eq!(parse_decision(&content).unwrap(), expected());
    }

    #[test]
    fn test_embedded_in_prose() {
        let content = format!("Sure! {} That's my answer.", DECISION);
        assert_eq!(parse_decision(&content).unwrap(), expected());
    }

    #[test]
    fn test_braces_inside_strings() {
        let content = r#"Decision: {"winner": "model_a", "next_round_user_speaks": "What is {this}?", "decision_reason": ""}"#;
        let decision = parse_decision(content).unwrap();
        assert_eq!(decision.next_round_user_speaks, "What is {this}?");
        assert_eq!(decision.decision_reason.as_deref(), Some(""));
    }

    #[test]
    fn test_skips_unrelated_object() {
        let content = format!(r#"Scores: {{"fluency": 3}} and then {}"#, DECISION);
        assert_eq!(parse_decision(&content).unwrap(), expected());
    }

    #[test]
    fn test_null_reason_accepted() {
        let decision = parse_decision(
            r#"{"winner":"model_a","next_round_user_speaks":"Tell me more.","decision_reason":null}"#,
        )
        .unwrap();
        assert_eq!(decision.decision_reason, None);
    }

    #[test]
    fn test_absent_reason_accepted() {
        let decision =
            parse_decision(r#"{"winner":"model_a","next_round_user_speaks":"Go on."}"#).unwrap();
        assert_eq!(decision.next_round_user_speaks, "Go on.");
        assert_eq!(decision.decision_reason, None);
    }

    #[test]
    fn test_missing_user_line_rejected() {
        let err = parse_decision(r#"{"winner":"model_a","decision_reason":"x"}"#).unwrap_err();
        assert!(matches!(err, BenchError::MalformedDecision(_)));
        assert!(err.to_string().contains("next_round_user_speaks"));
    }

    #[test]
    fn test_missing_winner_rejected() {
        let err =
            parse_decision(r#"{"next_round_user_speaks":"Hi","decision_reason":"x"}"#).unwrap_err();
        assert!(matches!(err, BenchError::MalformedDecision(_)));
        assert!(err.to_string().contains("winner"));
    }

    #[test]
    fn test_no_json_rejected() {
        let err = parse_decision("I refuse to answer in JSON.").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Malformed judger decision: no JSON object found"
        );
    }

    #[test]
    fn test_truncated_json_rejected() {
        let err = parse_decision(r#"{"winner":"model_a","next_round_user_speaks":"Hi"#).unwrap_err();
        assert!(matches!(err, BenchError::MalformedDecision(_)));
    }

    #[test]
    fn test_fenced_blocks_collects_all() {
        let blocks = fenced_blocks("```\na\n``` text ```json\nb\n```");
        assert_eq!(blocks, vec!["a\n", "b\n"]);
    }

    proptest! {
        #[test]
        fn prop_surrounding_text_does_not_change_decision(
            prefix in "[a-zA-Z0-9 .,!?\n]{0,40}",
            suffix in "[a-zA-Z0-9 .,!?\n]{0,40}",
            line in "[a-zA-Z0-9 .,!?']{0,30}",
            reason in proptest::option::of("[a-zA-Z0-9 ]{0,20}"),
        ) {
            let decision = JudgerDecision {
                winner: "model_a".to_string(),
                next_round_user_speaks: line,
                decision_reason: reason,
            };
            let payload = serde_json::to_string(&decision).unwrap();

            let bare = parse_decision(&payload).unwrap();
            let wrapped = parse_decision(&format!("{}{}{}", prefix, payload, suffix)).unwrap();

            prop_assert_eq!(&bare, &decision);
            prop_assert_eq!(&wrapped, &bare);
        }
    }
}

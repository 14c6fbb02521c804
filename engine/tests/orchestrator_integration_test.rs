//! End-to-end tests for the evaluation orchestrator
//!
//! Runs a real `Evaluator` against wiremock-backed judger and candidate
//! endpoints and inspects the JSONL output.

mod common;

use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::{
    matchers::{body_string_contains, method, path},
    Mock, MockServer, ResponseTemplate,
};

use common::{record, ScriptedClient, DECISION};
use rolebench_engine::config::{Config, Language};
use rolebench_engine::orchestrator::{EvalOptions, Evaluator};
use rolebench_engine::shutdown::Shutdown;
use sdk::types::EvaluationResult;

fn completion(content: &str) -> serde_json::Value {
    json!({ "choices": [{ "message": { "role": "assistant", "content": content } }] })
}

async fn mock_model(reply: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(reply)))
        .mount(&server)
        .await;
    server
}

fn write_dataset(dir: &Path, greetings: &[&str]) -> std::path::PathBuf {
    let path = dir.join("characters.jsonl");
    let lines: Vec<String> = greetings
        .iter()
        .enumerate()
        .map(|(i, greeting)| {
            serde_json::to_string(&record(&format!("NPC {}", i), greeting)).unwrap()
        })
        .collect();
    std::fs::write(&path, lines.join("\n") + "\n").unwrap();
    path
}

fn config(dataset: &Path, judger: &MockServer, candidate: &MockServer) -> Config {
    Config::from_toml_str(&format!(
        r#"
[eval]
max_turns = 2
num_workers = 3
judger_retry_backoff_ms = 1
default_dataset = "mini"

[datasets.mini]
path = "{dataset}"

[judger.gpt]
model = "gpt-4o"
max_retries = 0
[judger.gpt.endpoints]
api_base = "{judger}/v1"

[candidates.tiny]
model = "tiny-chat"
max_retries = 0
[candidates.tiny.endpoints]
api_base = "{candidate}/v1"
api_key = "local-key"
"#,
        dataset = dataset.display(),
        judger = judger.uri(),
        candidate = candidate.uri(),
    ))
    .unwrap()
}

fn read_results(path: &Path) -> Vec<Vec<EvaluationResult>> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[tokio::test]
async fn test_run_writes_and_appends_results() {
    let dir = TempDir::new().unwrap();
    let dataset = write_dataset(dir.path(), &["Hello.", "Welcome!", "Ahoy."]);
    let judger = mock_model(DECISION).await;
    let candidate = mock_model("Hi there.").await;

    let options = EvalOptions::new("tiny", dir.path().join("work"), "smoke");
    let expected_path = dir.path().join("work").join("smoke").join("eval_tiny.jsonl");

    for round in 1..=2 {
        let evaluator = Evaluator::new(
            config(&dataset, &judger, &candidate),
            options.clone(),
            Shutdown::new(),
        )
        .unwrap();
        let summary = evaluator.run().await.unwrap();

        assert_eq!(summary.output_path, expected_path);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.written, 3);
        assert!(summary.failures.is_empty());
        assert!(!summary.cancelled);

        let results = read_results(&expected_path);
        assert_eq!(results.len(), 3 * round);
    }

    let results = read_results(&expected_path);
    let greetings: Vec<&str> = results[..3]
        .iter()
        .map(|r| r[0].candidate_messages[1].content.as_str())
        .collect();
    assert_eq!(greetings, vec!["Hello.", "Welcome!", "Ahoy."]);

    // final turn of two: 2 opening + one finished turn + pending user line
    assert_eq!(results[0].len(), 1);
    assert_eq!(results[0][0].candidate_messages.len(), 5);
    assert_eq!(results[0][0].judger_response, DECISION);
}

#[tokio::test]
async fn test_failed_character_is_skipped() {
    let dir = TempDir::new().unwrap();
    let dataset = write_dataset(dir.path(), &["Hello.", "Broken greeting", "Ahoy."]);
    let judger = mock_model(DECISION).await;

    let candidate = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_string_contains("Broken greeting"))
        .respond_with(ResponseTemplate::new(400).set_body_string("rejected"))
        .mount(&candidate)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("Hi there.")))
        .mount(&candidate)
        .await;

    let options = EvalOptions::new("tiny", dir.path(), "partial");
    let evaluator = Evaluator::new(
        config(&dataset, &judger, &candidate),
        options,
        Shutdown::new(),
    )
    .unwrap();
    let summary = evaluator.run().await.unwrap();

    assert_eq!(summary.written, 2);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].index, 1);

    let results = read_results(&summary.output_path);
    assert_eq!(results[0][0].candidate_messages[1].content, "Hello.");
    assert_eq!(results[1][0].candidate_messages[1].content, "Ahoy.");
}

#[tokio::test]
async fn test_evaluate_with_injected_clients() {
    let dir = TempDir::new().unwrap();
    let dataset = write_dataset(dir.path(), &["Hello."]);
    let judger = mock_model(DECISION).await;
    let candidate = mock_model("unused").await;

    let mut options = EvalOptions::new("tiny", dir.path(), "stub");
    options.max_turns = Some(1);
    let evaluator = Evaluator::new(
        config(&dataset, &judger, &candidate),
        options,
        Shutdown::new(),
    )
    .unwrap();

    let candidate_client = Arc::new(ScriptedClient::constant("tiny", "Hi there."));
    let judger_client = Arc::new(ScriptedClient::constant("gpt", DECISION));
    let summary = evaluator
        .evaluate(
            vec![record("Ava", "Hello.")],
            candidate_client,
            judger_client,
            Language::En,
        )
        .await
        .unwrap();

    assert_eq!(summary.written, 1);
    let results = read_results(&summary.output_path);
    assert_eq!(results[0][0].candidate_messages.len(), 3);
    assert_eq!(results[0][0].judger_messages.len(), 4);
}

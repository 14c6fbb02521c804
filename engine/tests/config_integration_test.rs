//! Integration tests for configuration management
//!
//! These tests verify that the Config struct can be properly loaded,
//! validated, and processed with defaults and path expansion.

use std::io::Write;
use std::path::PathBuf;

use proptest::prelude::*;
use rolebench_engine::config::{Config, Language, ModelSource, Retention};
use sdk::errors::BenchError;

fn example_config_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("config")
        .join("rolebench.example.toml")
}

#[test]
fn test_example_config_loads() {
    let config = Config::load_from_path(&example_config_path()).unwrap();

    assert_eq!(config.eval.max_turns, 10);
    assert_eq!(config.eval.num_workers, 10);
    assert_eq!(config.eval.retention, Retention::FinalTurn);

    let (judger_name, judger) = config.judger().unwrap();
    assert_eq!(judger_name, "gpt-4o");
    assert_eq!(judger.source, ModelSource::Api);

    let local = config.candidate("qwen2-7b-instruct").unwrap();
    assert!(local.is_local());
    assert_eq!(local.endpoints.dtype, "bfloat16");
    let model_path = local.model_path.as_ref().unwrap();
    assert!(!model_path.to_string_lossy().starts_with('~'));

    let zh = config.dataset("rpbench_character_subset_zh").unwrap();
    assert_eq!(zh.lang, Language::Zh);
}

#[test]
fn test_load_from_file_with_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[judger.judge]
model = "judge-model"
[judger.judge.endpoints]
api_base = "http://localhost:9000/v1"
"#
    )
    .unwrap();

    let config = Config::load(Some(file.path())).unwrap();
    assert_eq!(config.core.log_level, "info");
    assert_eq!(config.eval.judger_retry_limit, 10);
    assert_eq!(config.eval.judger_retry_backoff_ms, 500);
    assert_eq!(config.eval.default_dataset, "rpbench_character_subset");
    assert_eq!(config.service.startup_timeout_secs, 900);
    assert_eq!(config.service.health_poll_interval_secs, 5);
    assert!(config.candidates.is_empty());
}

#[test]
fn test_missing_file_is_config_error() {
    let err = Config::load_from_path(&PathBuf::from("/nonexistent/rolebench.toml")).unwrap_err();
    assert!(matches!(err, BenchError::Config(_)));
}

#[test]
fn test_two_judgers_rejected_on_lookup() {
    let config = Config::from_toml_str(
        r#"
[judger.a]
model = "a"
[judger.a.endpoints]
api_base = "http://a/v1"

[judger.b]
model = "b"
[judger.b.endpoints]
api_base = "http://b/v1"
"#,
    )
    .unwrap();

    assert!(matches!(config.judger(), Err(BenchError::Config(_))));
}

#[test]
fn test_local_model_without_path_rejected() {
    let err = Config::from_toml_str(
        r#"
[candidates.local]
source = "local"
"#,
    )
    .unwrap_err();
    assert!(err.to_string().contains("model_path"));
}

proptest! {
    #[test]
    fn test_eval_settings_round_trip(
        log_level in "error|warn|info|debug|trace",
        max_turns in 1usize..50,
        num_workers in 1usize..64,
        retry_limit in 1u32..20,
        all_turns in any::<bool>(),
    ) {
        let retention = if all_turns { "all_turns" } else { "final_turn" };
        let text = format!(
            "[core]\nlog_level = \"{}\"\n\n[eval]\nmax_turns = {}\nnum_workers = {}\njudger_retry_limit = {}\nretention = \"{}\"\n",
            log_level, max_turns, num_workers, retry_limit, retention
        );

        let config = Config::from_toml_str(&text).unwrap();
        let serialized = toml::to_string(&config).unwrap();
        let reparsed = Config::from_toml_str(&serialized).unwrap();

        prop_assert_eq!(reparsed.core.log_level, log_level);
        prop_assert_eq!(reparsed.eval.max_turns, max_turns);
        prop_assert_eq!(reparsed.eval.num_workers, num_workers);
        prop_assert_eq!(reparsed.eval.judger_retry_limit, retry_limit);
        prop_assert_eq!(reparsed.eval.retention == Retention::AllTurns, all_turns);
    }
}

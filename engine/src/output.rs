//! Result persistence
//!
//! Evaluation results are written as JSON Lines: one line per character,
//! each line the JSON array of that character's retained turn snapshots.
//! Repeated runs under the same tag append to the existing file instead of
//! replacing it.

use std::path::{Path, PathBuf};

use sdk::errors::BenchError;
use sdk::types::EvaluationResult;
use tokio::io::AsyncWriteExt;

/// Path of the results file for one model in one tagged run
pub fn results_path(work_dir: &Path, tag: &str, model_name: &str) -> PathBuf {
    work_dir.join(tag).join(format!("eval_{}.jsonl", model_name))
}

/// Path of the log file for one model in one tagged run
pub fn log_path(work_dir: &Path, tag: &str, model_name: &str) -> PathBuf {
    work_dir.join(tag).join(format!("eval_{}.log", model_name))
}

/// Append one line per character to `path`, creating parent directories.
///
/// Returns the number of lines written.
pub async fn append_results(
    path: &Path,
    results: &[Vec<EvaluationResult>],
) -> Result<usize, BenchError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut buffer = String::new();
    for character in results {
        let line = serde_json::to_string(character).map_err(|e| {
            BenchError::Io(std::io::Error::other(format!(
                "Failed to serialize results: {}",
                e
            )))
        })?;
        buffer.push_str(&line);
        buffer.push('\n');
    }

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(buffer.as_bytes()).await?;
    file.flush().await?;

    tracing::info!("Wrote {} results to {}", results.len(), path.display());
    Ok(results.len())
}

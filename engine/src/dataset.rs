//! Dataset loading
//!
//! Character records are stored as JSON Lines, one record per line. The
//! whole file is read once and materialized in input order; a record's
//! position in the returned vector is its index for the rest of the run.

use std::path::Path;

use sdk::errors::BenchError;
use sdk::types::CharacterRecord;
use tracing::info;

/// Read every character record from a JSONL file.
///
/// Blank lines are skipped without consuming an index.
///
/// # Errors
///
/// Returns `BenchError::Dataset` if the file cannot be read or a line is not
/// a valid character record. The error names the 1-based line number.
pub async fn load_records(path: &Path) -> Result<Vec<CharacterRecord>, BenchError> {
    let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
        BenchError::Dataset(format!("Failed to read {}: {}", path.display(), e))
    })?;

    let records = parse_records(&contents)?;
    info!("Loaded {} examples from {}", records.len(), path.display());
    Ok(records)
}

/// Parse JSONL text into character records
pub fn parse_records(contents: &str) -> Result<Vec<CharacterRecord>, BenchError> {
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(line_no, line)| {
            serde_json::from_str(line).map_err(|e| {
                BenchError::Dataset(format!("Invalid record on line {}: {}", line_no + 1, e))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECORD_A: &str = r#"{"npc_profile":{"name_text":"Ava"},"background":"Inn","conversation":[{"sentences":["Hello."]}]}"#;
    const RECORD_B: &str = r#"{"npc_profile":{"name_text":"Bo"},"background":"Dock","conversation":[{"sentences":["Ahoy."]}]}"#;

    #[test]
    fn test_parse_preserves_order() {
        let text = format!("{}\n{}\n", RECORD_A, RECORD_B);
        let records = parse_records(&text).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].background, "Inn");
        assert_eq!(records[1].greeting().as_deref(), Some("Ahoy."));
    }

    #[test]
    fn test_blank_lines_skipped() {
        let text = format!("\n{}\n\n   \n{}", RECORD_A, RECORD_B);
        assert_eq!(parse_records(&text).unwrap().len(), 2);
    }

    #[test]
    fn test_invalid_line_reports_line_number() {
        let text = format!("{}\nnot json\n", RECORD_A);
        let err = parse_records(&text).unwrap_err();
        assert!(matches!(err, BenchError::Dataset(_)));
        assert!(err.to_string().contains("line 2"));
    }

    #[tokio::test]
    async fn test_missing_file_is_dataset_error() {
        let err = load_records(Path::new("/nonexistent/characters.jsonl"))
            .await
            .unwrap_err();
        assert!(matches!(err, BenchError::Dataset(_)));
    }
}

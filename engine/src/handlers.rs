//! Command handlers for CLI operations
//!
//! This module implements the handlers for all CLI commands:
//! - run: Evaluate a candidate on a dataset
//! - serve: Hold a local backend open until interrupted
//! - models: List the configured registries

use anyhow::{Context, Result};
use serde_json::json;

use crate::cli::RunTarget;
use crate::config::Config;
use crate::orchestrator::{start_local_backend, EvalOptions, EvalSummary, Evaluator};
use crate::shutdown::Shutdown;

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Build evaluation options from the command line, falling back to config
pub fn eval_options(config: &Config, target: &RunTarget) -> EvalOptions {
    let work_dir = target
        .work_dir
        .clone()
        .unwrap_or_else(|| config.core.work_dir.clone());
    EvalOptions::new(target.model.clone(), work_dir, target.tag.clone())
}

/// Evaluate a candidate model
pub async fn handle_run(
    config: Config,
    options: EvalOptions,
    shutdown: Shutdown,
    format: OutputFormat,
) -> Result<()> {
    let evaluator =
        Evaluator::new(config, options, shutdown).context("Failed to set up evaluation")?;
    let summary = evaluator.run().await.context("Evaluation failed")?;

    print_summary(&summary, format)?;
    Ok(())
}

fn print_summary(summary: &EvalSummary, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            println!(
                "Wrote {}/{} characters to {}",
                summary.written,
                summary.total,
                summary.output_path.display()
            );
            for failure in &summary.failures {
                println!("  failed #{}: {}", failure.index, failure.error);
            }
            if summary.cancelled {
                println!("Run was interrupted before all characters finished.");
            }
        }
        OutputFormat::Json => {
            let failures: Vec<_> = summary
                .failures
                .iter()
                .map(|f| json!({ "index": f.index, "error": f.error }))
                .collect();
            let output = json!({
                "run_id": summary.run_id.to_string(),
                "output": summary.output_path,
                "total": summary.total,
                "written": summary.written,
                "failures": failures,
                "cancelled": summary.cancelled,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

/// Start a local backend and hold it until shutdown is requested
pub async fn handle_serve(config: Config, options: EvalOptions, shutdown: Shutdown) -> Result<()> {
    let mut model = config.candidate(&options.model)?.clone();
    if !model.is_local() {
        anyhow::bail!("Model `{}` is not a local model", options.model);
    }

    let backend = start_local_backend(&config, &mut model, &options, &shutdown)
        .await
        .context("Failed to start model service")?;

    println!(
        "Serving {} at {} (Ctrl-C to stop)",
        options.model,
        model.endpoints.api_base.as_deref().unwrap_or_default()
    );

    shutdown.wait().await;
    backend.stop().await.context("Failed to stop model service")?;
    println!("Model service stopped.");
    Ok(())
}

/// List datasets, judger and candidates
pub fn handle_models(config: &Config, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            println!("Datasets:");
            for (name, dataset) in &config.datasets {
                println!("  {:<28} {:?}  {}", name, dataset.lang, dataset.path.display());
            }
            println!("Judger:");
            for (name, model) in &config.judger {
                println!("  {:<28} {}", name, model.request_model().unwrap_or_default());
            }
            println!("Candidates:");
            for (name, model) in &config.candidates {
                let source = if model.is_local() { "local" } else { "api" };
                println!(
                    "  {:<28} {:<6} {}",
                    name,
                    source,
                    model.request_model().unwrap_or_default()
                );
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "datasets": config.datasets,
                "judger": config.judger.keys().collect::<Vec<_>>(),
                "candidates": config.candidates.keys().collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

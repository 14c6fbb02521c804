// rolebench
// Main entry point for the rolebench binary

use clap::Parser;
use rolebench_engine::cli::{Cli, Command};
use rolebench_engine::config::Config;
use rolebench_engine::handlers::{
    eval_options, handle_models, handle_run, handle_serve, OutputFormat,
};
use rolebench_engine::shutdown::Shutdown;
use rolebench_engine::telemetry::init_telemetry_with_level;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Determine output format
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    // Load configuration (or use custom path if provided)
    let config = Config::load(cli.config.as_deref())?;

    // Runs keep a copy of their log next to their results
    let log_file = match &cli.command {
        Command::Run { target, .. } | Command::Serve { target } => {
            Some(eval_options(&config, target).log_path())
        }
        Command::Models => None,
    };
    let log_level = cli.log.as_deref().unwrap_or(&config.core.log_level);
    init_telemetry_with_level(log_level, log_file.as_deref())?;

    tracing::info!("rolebench v{}", env!("CARGO_PKG_VERSION"));

    let shutdown = Shutdown::new();
    let _signals = shutdown.install_signal_handlers()?;

    // Handle commands
    match cli.command {
        Command::Run {
            target,
            turn_num,
            dataset,
            workers,
        } => {
            let mut options = eval_options(&config, &target);
            options.max_turns = turn_num;
            options.dataset = dataset;
            options.num_workers = workers;
            handle_run(config, options, shutdown, format).await
        }

        Command::Serve { target } => {
            let options = eval_options(&config, &target);
            handle_serve(config, options, shutdown).await
        }

        Command::Models => handle_models(&config, format),
    }
}

//! CLI interface for rolebench
//!
//! This module provides the command-line interface using clap's derive API.
//! It defines all commands and global flags for running evaluations.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Role-play benchmark harness
///
/// Pits a candidate model playing a character against a judger model that
/// plays the user and scores every turn.
#[derive(Parser, Debug)]
#[command(name = "rolebench")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Where a run writes its files
#[derive(clap::Args, Debug, Clone)]
pub struct RunTarget {
    /// Candidate model name from the config
    #[arg(long)]
    pub model: String,

    /// Working directory; defaults to `core.work_dir`
    #[arg(short = 'w', long = "work-dir", value_name = "DIR")]
    pub work_dir: Option<PathBuf>,

    /// Run tag; results go to `<work-dir>/<tag>/`
    #[arg(long)]
    pub tag: String,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Evaluate a candidate model on a dataset
    Run {
        #[command(flatten)]
        target: RunTarget,

        /// Turns per character
        #[arg(long = "turn-num", value_name = "N")]
        turn_num: Option<usize>,

        /// Dataset name from the config
        #[arg(long)]
        dataset: Option<String>,

        /// Characters evaluated in parallel
        #[arg(long)]
        workers: Option<usize>,
    },

    /// Start a local model backend and keep it running until interrupted
    Serve {
        #[command(flatten)]
        target: RunTarget,
    },

    /// List configured datasets, judger and candidates
    Models,
}

//! Configuration management
//!
//! This module handles loading, validation, and lookup of the rolebench
//! configuration. Configuration is stored in TOML format, by default at
//! ~/.rolebench/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Work directory and log level
//! - **eval**: Turn count, worker pool size, judger retry ceiling, retention
//! - **service**: Local inference backend launch and health polling
//! - **datasets**: Dataset registry (name → path, language)
//! - **judger**: Judger registry (exactly one entry)
//! - **candidates**: Candidate registry (name → endpoint / model path / source)
//!
//! # Path Expansion
//!
//! `~` is expanded to the user's home directory for the work directory,
//! dataset paths and local model paths.
//!
//! # Examples
//!
//! ```no_run
//! use rolebench_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load(None)?;
//! let (judger_name, _judger) = config.judger()?;
//! println!("Judger: {}", judger_name);
//! # Ok(())
//! # }
//! ```

use sdk::errors::BenchError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Core settings
    #[serde(default)]
    pub core: CoreConfig,

    /// Evaluation loop settings
    #[serde(default)]
    pub eval: EvalConfig,

    /// Local backend settings
    #[serde(default)]
    pub service: ServiceConfig,

    /// Dataset registry
    #[serde(default)]
    pub datasets: BTreeMap<String, DatasetConfig>,

    /// Judger registry; must hold exactly one model
    #[serde(default)]
    pub judger: BTreeMap<String, ModelConfig>,

    /// Candidate registry
    #[serde(default)]
    pub candidates: BTreeMap<String, ModelConfig>,
}

/// Core configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Default work directory for run outputs (supports ~ expansion)
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            log_level: default_log_level(),
        }
    }
}

/// Which turns of a conversation are kept in the output
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Retention {
    /// Keep only the snapshot of the last turn
    #[default]
    FinalTurn,

    /// Keep the snapshot of every turn
    AllTurns,
}

/// Evaluation loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalConfig {
    /// Turns per character
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,

    /// Characters evaluated concurrently
    #[serde(default = "default_num_workers")]
    pub num_workers: usize,

    /// Retries of a judger call whose reply holds no decision
    #[serde(default = "default_judger_retry_limit")]
    pub judger_retry_limit: u32,

    /// Pause between judger retries (milliseconds)
    #[serde(default = "default_judger_retry_backoff_ms")]
    pub judger_retry_backoff_ms: u64,

    /// Snapshot retention policy
    #[serde(default)]
    pub retention: Retention,

    /// Dataset used when none is given on the command line
    #[serde(default = "default_dataset")]
    pub default_dataset: String,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            num_workers: default_num_workers(),
            judger_retry_limit: default_judger_retry_limit(),
            judger_retry_backoff_ms: default_judger_retry_backoff_ms(),
            retention: Retention::default(),
            default_dataset: default_dataset(),
        }
    }
}

impl EvalConfig {
    pub fn judger_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.judger_retry_backoff_ms)
    }
}

/// Local inference backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Executable used to launch the backend
    #[serde(default = "default_launcher")]
    pub launcher: String,

    /// Maximum wait for the backend to report healthy (seconds)
    #[serde(default = "default_startup_timeout")]
    pub startup_timeout_secs: u64,

    /// Interval between health checks (seconds)
    #[serde(default = "default_health_poll_interval")]
    pub health_poll_interval_secs: u64,

    /// Wait after SIGTERM before the backend is killed (seconds)
    #[serde(default = "default_stop_grace")]
    pub stop_grace_secs: u64,

    /// A GPU counts as free when its used memory is below this (MiB)
    #[serde(default = "default_gpu_memory_free_mb")]
    pub gpu_memory_free_mb: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            launcher: default_launcher(),
            startup_timeout_secs: default_startup_timeout(),
            health_poll_interval_secs: default_health_poll_interval(),
            stop_grace_secs: default_stop_grace(),
            gpu_memory_free_mb: default_gpu_memory_free_mb(),
        }
    }
}

/// Dataset registry entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// JSONL file of character records (supports ~ expansion)
    pub path: PathBuf,

    /// Prompt language
    #[serde(default)]
    pub lang: Language,
}

/// Prompt language of a dataset
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Zh,
}

/// Where a model is served from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModelSource {
    /// Remote OpenAI-compatible API
    #[default]
    Api,

    /// Local backend launched by rolebench
    Local,
}

/// Registry entry for a judger or candidate model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Where the model is served from
    #[serde(default)]
    pub source: ModelSource,

    /// Model name sent in completion requests. Local models default to `model_path`.
    #[serde(default)]
    pub model: Option<String>,

    /// Weights directory for local models (supports ~ expansion)
    #[serde(default)]
    pub model_path: Option<PathBuf>,

    /// GPUs to shard a local model across
    #[serde(default = "default_gpu_num")]
    pub gpu_num: usize,

    /// Sampling temperature
    #[serde(default)]
    pub temperature: Option<f32>,

    /// Completion token limit
    #[serde(default)]
    pub max_tokens: Option<u32>,

    /// Retries for transient completion failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Request timeout (seconds)
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,

    /// Endpoint settings
    #[serde(default)]
    pub endpoints: EndpointConfig,
}

/// Endpoint settings for a model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Base URL of the OpenAI-compatible API (e.g. https://api.openai.com/v1)
    #[serde(default)]
    pub api_base: Option<String>,

    /// API key stored inline
    #[serde(default)]
    pub api_key: Option<String>,

    /// Environment variable holding the API key
    #[serde(default)]
    pub api_key_env: Option<String>,

    /// Port of a local backend; picked automatically when absent
    #[serde(default)]
    pub api_port: Option<u16>,

    /// Weight dtype passed to the local backend
    #[serde(default = "default_dtype")]
    pub dtype: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            api_base: None,
            api_key: None,
            api_key_env: None,
            api_port: None,
            dtype: default_dtype(),
        }
    }
}

impl ModelConfig {
    pub fn is_local(&self) -> bool {
        self.source == ModelSource::Local
    }

    /// Model name used in completion requests
    pub fn request_model(&self) -> Option<String> {
        self.model.clone().or_else(|| {
            self.model_path
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned())
        })
    }

    /// Resolve the API key, preferring the environment variable when configured.
    pub fn api_key(&self) -> Option<String> {
        if let Some(var) = &self.endpoints.api_key_env {
            if let Ok(key) = std::env::var(var) {
                return Some(key);
            }
        }
        self.endpoints.api_key.clone()
    }

    /// Point this model at a local backend listening on `port`
    pub fn bind_local_port(&mut self, port: u16) {
        self.endpoints.api_port = Some(port);
        self.endpoints.api_base = Some(format!("http://localhost:{}/v1", port));
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// Default value functions
fn default_work_dir() -> PathBuf {
    PathBuf::from("./runs")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_turns() -> usize {
    10
}

fn default_num_workers() -> usize {
    10
}

fn default_judger_retry_limit() -> u32 {
    10
}

fn default_judger_retry_backoff_ms() -> u64 {
    500
}

fn default_dataset() -> String {
    "rpbench_character_subset".to_string()
}

fn default_launcher() -> String {
    "vllm".to_string()
}

fn default_startup_timeout() -> u64 {
    900
}

fn default_health_poll_interval() -> u64 {
    5
}

fn default_stop_grace() -> u64 {
    10
}

fn default_gpu_memory_free_mb() -> u64 {
    1000
}

fn default_gpu_num() -> usize {
    1
}

fn default_max_retries() -> u32 {
    3
}

fn default_request_timeout() -> u64 {
    300
}

fn default_dtype() -> String {
    "auto".to_string()
}

impl Config {
    /// Load configuration from `path`, or from ~/.rolebench/config.toml when `None`.
    ///
    /// # Errors
    ///
    /// Returns `BenchError::Config` if the file cannot be read, parsed, or
    /// fails validation.
    pub fn load(path: Option<&Path>) -> Result<Self, BenchError> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Self::load_from_path(&Self::default_config_path()?),
        }
    }

    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_from_path(path: &Path) -> Result<Self, BenchError> {
        let contents = fs::read_to_string(path).map_err(|e| {
            BenchError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self, BenchError> {
        let mut config: Config = toml::from_str(contents)
            .map_err(|e| BenchError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Get the default configuration file path (~/.rolebench/config.toml)
    fn default_config_path() -> Result<PathBuf, BenchError> {
        let home = dirs::home_dir()
            .ok_or_else(|| BenchError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".rolebench").join("config.toml"))
    }

    /// The single configured judger
    ///
    /// # Errors
    ///
    /// Returns `BenchError::Config` unless the judger registry holds exactly one model.
    pub fn judger(&self) -> Result<(&str, &ModelConfig), BenchError> {
        if self.judger.len() != 1 {
            return Err(BenchError::Config(format!(
                "Judger config should have exactly one model, found {}",
                self.judger.len()
            )));
        }
        self.judger
            .iter()
            .next()
            .map(|(name, model)| (name.as_str(), model))
            .ok_or_else(|| BenchError::Config("Judger config is empty".to_string()))
    }

    /// Look up a candidate model by name
    pub fn candidate(&self, name: &str) -> Result<&ModelConfig, BenchError> {
        self.candidates.get(name).ok_or_else(|| {
            BenchError::Config(format!("{} not found in candidate config", name))
        })
    }

    /// Look up a dataset by name
    pub fn dataset(&self, name: &str) -> Result<&DatasetConfig, BenchError> {
        self.datasets
            .get(name)
            .ok_or_else(|| BenchError::Config(format!("Dataset `{}` not found", name)))
    }

    /// Validate and process configuration
    ///
    /// This method:
    /// - Validates the log level and loop bounds
    /// - Validates model registry entries
    /// - Expands ~ in paths
    fn validate_and_process(&mut self) -> Result<(), BenchError> {
        // Validate log level
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(BenchError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        if self.eval.max_turns == 0 {
            return Err(BenchError::Config("max_turns must be at least 1".to_string()));
        }
        if self.eval.num_workers == 0 {
            return Err(BenchError::Config(
                "num_workers must be at least 1".to_string(),
            ));
        }
        if self.eval.judger_retry_limit == 0 {
            return Err(BenchError::Config(
                "judger_retry_limit must be at least 1".to_string(),
            ));
        }

        self.core.work_dir = expand_path(&self.core.work_dir)?;

        for dataset in self.datasets.values_mut() {
            dataset.path = expand_path(&dataset.path)?;
        }

        // The judger is only ever reached over HTTP
        if let Some((name, _)) = self.judger.iter().find(|(_, model)| model.is_local()) {
            return Err(BenchError::Config(format!(
                "Judger `{}` must be an API model",
                name
            )));
        }

        for (name, model) in self.judger.iter_mut().chain(self.candidates.iter_mut()) {
            validate_model(name, model)?;
        }

        Ok(())
    }
}

fn validate_model(name: &str, model: &mut ModelConfig) -> Result<(), BenchError> {
    match model.source {
        ModelSource::Local => {
            let path = model.model_path.as_ref().ok_or_else(|| {
                BenchError::Config(format!("Local model `{}` requires model_path", name))
            })?;
            model.model_path = Some(expand_path(path)?);
            if model.gpu_num == 0 {
                return Err(BenchError::Config(format!(
                    "Local model `{}` requires gpu_num of at least 1",
                    name
                )));
            }
        }
        ModelSource::Api => {
            if model.endpoints.api_base.is_none() {
                return Err(BenchError::Config(format!(
                    "API model `{}` requires endpoints.api_base",
                    name
                )));
            }
            if model.model.is_none() {
                return Err(BenchError::Config(format!(
                    "API model `{}` requires a model name",
                    name
                )));
            }
        }
    }
    Ok(())
}

/// Expand ~ in path to user's home directory
fn expand_path(path: &Path) -> Result<PathBuf, BenchError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| BenchError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| BenchError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| BenchError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}

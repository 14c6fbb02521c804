//! Evaluation Orchestrator
//!
//! Resolves one run's dataset, judger and candidate from the configuration,
//! brings up a local backend when the candidate needs one, fans the
//! dataset out through the scheduler and appends the results to
//! `{work_dir}/{tag}/eval_{model}.jsonl`.
//!
//! A local backend is stopped on every exit path, including failed startup,
//! failed evaluation and interrupts.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use sdk::errors::BenchError;
use sdk::types::{CharacterRecord, EvaluationResult};
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::{Config, Language, ModelConfig};
use crate::conversation::{ConversationDriver, DriverSettings};
use crate::dataset;
use crate::llm::openai::OpenAICompatibleClient;
use crate::llm::CompletionClient;
use crate::output;
use crate::scheduler::{Scheduler, TaskFailure};
use crate::service::{self, gpu, BackendProcess, LaunchSpec};
use crate::shutdown::Shutdown;

/// Per-invocation options, usually from the command line
#[derive(Debug, Clone)]
pub struct EvalOptions {
    /// Candidate registry name
    pub model: String,

    pub work_dir: PathBuf,
    pub tag: String,

    /// Dataset registry name; `eval.default_dataset` when absent
    pub dataset: Option<String>,

    /// Overrides `eval.max_turns`
    pub max_turns: Option<usize>,

    /// Overrides `eval.num_workers`
    pub num_workers: Option<usize>,
}

impl EvalOptions {
    pub fn new(model: impl Into<String>, work_dir: impl Into<PathBuf>, tag: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            work_dir: work_dir.into(),
            tag: tag.into(),
            dataset: None,
            max_turns: None,
            num_workers: None,
        }
    }

    /// Directory holding this run's results and logs
    pub fn run_dir(&self) -> PathBuf {
        self.work_dir.join(&self.tag)
    }

    pub fn results_path(&self) -> PathBuf {
        output::results_path(&self.work_dir, &self.tag, &self.model)
    }

    pub fn log_path(&self) -> PathBuf {
        output::log_path(&self.work_dir, &self.tag, &self.model)
    }
}

/// What a finished run produced
#[derive(Debug, Clone)]
pub struct EvalSummary {
    pub run_id: Uuid,
    pub output_path: PathBuf,

    /// Characters in the dataset
    pub total: usize,

    /// Lines appended to the output file
    pub written: usize,

    pub failures: Vec<TaskFailure>,

    /// Whether an interrupt cut the run short
    pub cancelled: bool,
}

/// Runs one candidate against one dataset
pub struct Evaluator {
    config: Config,
    options: EvalOptions,
    shutdown: Shutdown,
    run_id: Uuid,
}

impl Evaluator {
    /// Create an evaluator, applying the option overrides to `config`.
    ///
    /// # Errors
    ///
    /// Returns `BenchError::Config` if the candidate, judger or dataset cannot
    /// be resolved, or an override is zero.
    pub fn new(mut config: Config, options: EvalOptions, shutdown: Shutdown) -> Result<Self, BenchError> {
        if let Some(turns) = options.max_turns {
            if turns == 0 {
                return Err(BenchError::Config("turn count must be at least 1".to_string()));
            }
            config.eval.max_turns = turns;
        }
        if let Some(workers) = options.num_workers {
            if workers == 0 {
                return Err(BenchError::Config("worker count must be at least 1".to_string()));
            }
            config.eval.num_workers = workers;
        }

        config.candidate(&options.model)?;
        config.judger()?;
        config.dataset(&Self::dataset_name(&config, &options))?;

        Ok(Self {
            config,
            options,
            shutdown,
            run_id: Uuid::new_v4(),
        })
    }

    fn dataset_name(config: &Config, options: &EvalOptions) -> String {
        options
            .dataset
            .clone()
            .unwrap_or_else(|| config.eval.default_dataset.clone())
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run the whole evaluation.
    ///
    /// # Errors
    ///
    /// Configuration, dataset, backend and output errors abort the run.
    /// Per-character failures are reported in the summary instead.
    pub async fn run(&self) -> Result<EvalSummary, BenchError> {
        let span = info_span!("run", run_id = %self.run_id, model = %self.options.model);

        async {
            let dataset_name = Self::dataset_name(&self.config, &self.options);
            let dataset = self.config.dataset(&dataset_name)?;
            let records = dataset::load_records(&dataset.path).await?;

            let (judger_name, judger_config) = self.config.judger()?;
            let judger: Arc<dyn CompletionClient> =
                Arc::new(OpenAICompatibleClient::from_config(judger_name, judger_config)?);

            let mut candidate_config = self.config.candidate(&self.options.model)?.clone();
            if !candidate_config.is_local() {
                let candidate = self.candidate_client(&candidate_config)?;
                return self.evaluate(records, candidate, judger, dataset.lang).await;
            }

            let backend = start_local_backend(
                &self.config,
                &mut candidate_config,
                &self.options,
                &self.shutdown,
            )
            .await?;

            let outcome = match self.candidate_client(&candidate_config) {
                Ok(candidate) => self.evaluate(records, candidate, judger, dataset.lang).await,
                Err(e) => Err(e),
            };

            if let Err(e) = backend.stop().await {
                warn!("Failed to stop backend cleanly: {}", e);
            }
            outcome
        }
        .instrument(span)
        .await
    }

    fn candidate_client(&self, config: &ModelConfig) -> Result<Arc<dyn CompletionClient>, BenchError> {
        Ok(Arc::new(OpenAICompatibleClient::from_config(
            &self.options.model,
            config,
        )?))
    }

    /// Evaluate `records` with already-built clients and append the results.
    pub async fn evaluate(
        &self,
        records: Vec<CharacterRecord>,
        candidate: Arc<dyn CompletionClient>,
        judger: Arc<dyn CompletionClient>,
        language: Language,
    ) -> Result<EvalSummary, BenchError> {
        let total = records.len();
        let settings = DriverSettings::from_config(&self.config.eval, language);
        info!(
            "Evaluating {} characters: candidate={}, judger={}, turns={}, workers={}",
            total,
            candidate.name(),
            judger.name(),
            settings.max_turns,
            self.config.eval.num_workers
        );

        let driver = Arc::new(ConversationDriver::new(candidate, judger, settings));
        let scheduler = Scheduler::new(self.config.eval.num_workers, self.shutdown.clone());

        let report = scheduler
            .run(records, move |_index, record: CharacterRecord| {
                let driver = Arc::clone(&driver);
                async move { driver.run(&record).await }
            })
            .await;

        let cancelled = report.cancelled;
        let failures = report.failures.clone();
        let results: Vec<Vec<EvaluationResult>> = report.into_values();

        let output_path = self.options.results_path();
        let written = output::append_results(&output_path, &results).await?;

        if cancelled {
            warn!("Run interrupted; kept {} completed results", written);
        }
        info!(
            "Evaluation finished: {}/{} characters written to {}",
            written,
            total,
            output_path.display()
        );

        Ok(EvalSummary {
            run_id: self.run_id,
            output_path,
            total,
            written,
            failures,
            cancelled,
        })
    }
}

/// Launch the backend for a local model and wait until it is healthy.
///
/// `model` is rebound to the backend's port. If the backend never becomes
/// healthy it is stopped before the error is returned.
pub async fn start_local_backend(
    config: &Config,
    model: &mut ModelConfig,
    options: &EvalOptions,
    shutdown: &Shutdown,
) -> Result<BackendProcess, BenchError> {
    let service_config = &config.service;
    let port = match model.endpoints.api_port {
        Some(port) => port,
        None => service::open_port()?,
    };
    model.bind_local_port(port);

    let devices = gpu::free_gpus(model.gpu_num, service_config.gpu_memory_free_mb).await?;
    let spec = LaunchSpec::for_model(
        model,
        service_config,
        port,
        devices,
        service::backend_log_path(&options.run_dir()),
    )?;

    info!("Starting model service: {}", options.model);
    let mut backend =
        BackendProcess::start(&spec, Duration::from_secs(service_config.stop_grace_secs)).await?;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .map_err(|e| BenchError::Service(format!("Failed to create HTTP client: {}", e)))?;

    let ready = backend
        .wait_until_ready(
            &client,
            Duration::from_secs(service_config.startup_timeout_secs),
            Duration::from_secs(service_config.health_poll_interval_secs),
            shutdown,
        )
        .await;

    if let Err(e) = ready {
        if let Err(stop_err) = backend.stop().await {
            warn!("Failed to stop backend: {}", stop_err);
        }
        return Err(e);
    }

    info!("Model service ready: {} on port {}", options.model, port);
    Ok(backend)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
[eval]
default_dataset = "mini"

[datasets.mini]
path = "/data/mini.jsonl"

[judger.gpt]
model = "gpt-4o"
[judger.gpt.endpoints]
api_base = "https://api.example.com/v1"

[candidates.remote]
model = "remote-model"
[candidates.remote.endpoints]
api_base = "https://api.example.com/v1"
"#;

    fn config() -> Config {
        Config::from_toml_str(CONFIG).unwrap()
    }

    #[test]
    fn test_options_paths() {
        let options = EvalOptions::new("remote", "/work", "t1");
        assert_eq!(options.run_dir(), PathBuf::from("/work/t1"));
        assert_eq!(
            options.results_path(),
            PathBuf::from("/work/t1/eval_remote.jsonl")
        );
        assert_eq!(options.log_path(), PathBuf::from("/work/t1/eval_remote.log"));
    }

    #[test]
    fn test_unknown_candidate_rejected() {
        let options = EvalOptions::new("missing", "/work", "t1");
        let err = Evaluator::new(config(), options, Shutdown::new()).err().unwrap();
        assert!(matches!(err, BenchError::Config(_)));
        assert!(err.to_string().contains("missing not found in candidate config"));
    }

    #[test]
    fn test_unknown_dataset_rejected() {
        let mut options = EvalOptions::new("remote", "/work", "t1");
        options.dataset = Some("other".to_string());
        assert!(Evaluator::new(config(), options, Shutdown::new()).is_err());
    }

    #[test]
    fn test_overrides_applied() {
        let mut options = EvalOptions::new("remote", "/work", "t1");
        options.max_turns = Some(3);
        options.num_workers = Some(2);
        let evaluator = Evaluator::new(config(), options, Shutdown::new()).unwrap();
        assert_eq!(evaluator.config().eval.max_turns, 3);
        assert_eq!(evaluator.config().eval.num_workers, 2);
    }

    #[test]
    fn test_zero_turns_rejected() {
        let mut options = EvalOptions::new("remote", "/work", "t1");
        options.max_turns = Some(0);
        assert!(Evaluator::new(config(), options, Shutdown::new()).is_err());
    }
}

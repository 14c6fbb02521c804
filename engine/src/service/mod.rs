//! Local inference backend lifecycle
//!
//! Candidates with `source = "local"` are served by an OpenAI-compatible
//! backend process (vLLM by default) that rolebench launches itself:
//!
//! 1. Pick free GPUs (`gpu::free_gpus`) and a port
//! 2. Spawn `vllm serve <model_path> ...` with `CUDA_VISIBLE_DEVICES` set and
//!    output redirected to `{work_dir}/{tag}/vllm_log/vllm_backend_service.log`
//! 3. Poll `GET /health` until it answers 200
//! 4. Stop with SIGTERM, wait a grace period, then kill
//!
//! `BackendProcess` is spawned with `kill_on_drop`, so a handle that is
//! dropped without `stop()` still takes the backend down.

pub mod gpu;

use std::fs::File;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use sdk::errors::BenchError;
use tokio::process::{Child, Command};
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

use crate::config::{ModelConfig, ServiceConfig};
use crate::shutdown::Shutdown;

/// Everything needed to launch one backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub launcher: String,
    pub model_path: PathBuf,
    pub port: u16,
    pub dtype: String,
    pub api_key: Option<String>,
    pub devices: Vec<u32>,
    pub log_path: PathBuf,
}

impl LaunchSpec {
    /// Build a launch spec for a local model bound to `port`
    pub fn for_model(
        model: &ModelConfig,
        service: &ServiceConfig,
        port: u16,
        devices: Vec<u32>,
        log_path: PathBuf,
    ) -> Result<Self, BenchError> {
        let model_path = model
            .model_path
            .clone()
            .ok_or_else(|| BenchError::Config("Local model requires model_path".to_string()))?;

        Ok(Self {
            launcher: service.launcher.clone(),
            model_path,
            port,
            dtype: model.endpoints.dtype.clone(),
            api_key: model.api_key(),
            devices,
            log_path,
        })
    }

    /// Tensor-parallel degree; one shard per device
    pub fn tensor_parallel_size(&self) -> usize {
        self.devices.len().max(1)
    }

    /// Value for `CUDA_VISIBLE_DEVICES`
    pub fn visible_devices(&self) -> String {
        self.devices
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Arguments passed to the launcher
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "serve".to_string(),
            self.model_path.to_string_lossy().into_owned(),
            "--port".to_string(),
            self.port.to_string(),
            "--dtype".to_string(),
            self.dtype.clone(),
        ];
        if let Some(key) = &self.api_key {
            args.push("--api-key".to_string());
            args.push(key.clone());
        }
        args.push("--tensor-parallel-size".to_string());
        args.push(self.tensor_parallel_size().to_string());
        args
    }

    fn command(&self, log: &File) -> Result<Command, BenchError> {
        let stdout = log.try_clone()?;
        let stderr = log.try_clone()?;

        let mut command = Command::new(&self.launcher);
        command
            .args(self.args())
            .env("CUDA_VISIBLE_DEVICES", self.visible_devices())
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(true);
        Ok(command)
    }
}

/// Path of the backend log inside a run directory
pub fn backend_log_path(run_dir: &Path) -> PathBuf {
    run_dir.join("vllm_log").join("vllm_backend_service.log")
}

/// Ask the OS for an unused TCP port
pub fn open_port() -> Result<u16, BenchError> {
    let listener = TcpListener::bind("127.0.0.1:0")
        .map_err(|e| BenchError::Service(format!("Failed to find an open port: {}", e)))?;
    Ok(listener.local_addr()?.port())
}

/// A running backend process
#[derive(Debug)]
pub struct BackendProcess {
    child: Child,
    port: u16,
    grace: Duration,
}

impl BackendProcess {
    /// Launch the backend described by `spec`
    pub async fn start(spec: &LaunchSpec, grace: Duration) -> Result<Self, BenchError> {
        if let Some(parent) = spec.log_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let log = File::create(&spec.log_path)?;

        info!(
            "Starting backend: {} {}",
            spec.launcher,
            spec.args()
                .iter()
                .map(|a| if Some(a) == spec.api_key.as_ref() { "***" } else { a.as_str() })
                .collect::<Vec<_>>()
                .join(" ")
        );
        info!("Backend log: {}", spec.log_path.display());

        let child = spec.command(&log)?.spawn().map_err(|e| {
            BenchError::Service(format!("Failed to launch {}: {}", spec.launcher, e))
        })?;

        Ok(Self {
            child,
            port: spec.port,
            grace,
        })
    }

    /// Whether the process has already exited
    pub fn has_exited(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(Some(_)))
    }

    /// Poll health until the backend is ready.
    ///
    /// # Errors
    ///
    /// Fails if the process exits, `startup_timeout` elapses, or shutdown is
    /// requested first.
    pub async fn wait_until_ready(
        &mut self,
        client: &reqwest::Client,
        startup_timeout: Duration,
        poll_interval: Duration,
        shutdown: &Shutdown,
    ) -> Result<(), BenchError> {
        let started = Instant::now();
        let deadline = started + startup_timeout;

        loop {
            if health_check(client, self.port).await {
                info!(
                    "Backend ready on port {} after {:.1}s",
                    self.port,
                    started.elapsed().as_secs_f64()
                );
                return Ok(());
            }
            if self.has_exited() {
                return Err(BenchError::Service(
                    "Backend exited before becoming healthy".to_string(),
                ));
            }
            if Instant::now() >= deadline {
                return Err(BenchError::Service(format!(
                    "Backend not healthy after {}s",
                    startup_timeout.as_secs()
                )));
            }

            debug!("Waiting for backend on port {}", self.port);
            tokio::select! {
                _ = tokio::time::sleep(poll_interval) => {}
                _ = shutdown.wait() => return Err(BenchError::Interrupted),
            }
        }
    }

    /// Stop the backend: SIGTERM, wait out the grace period, then kill
    pub async fn stop(mut self) -> Result<(), BenchError> {
        if self.has_exited() {
            return Ok(());
        }

        #[cfg(unix)]
        if let Some(pid) = self.child.id() {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            info!("Sending SIGTERM to backend process {}", pid);
            if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                warn!("Failed to send SIGTERM to backend: {}", e);
            }
        }

        match timeout(self.grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                info!("Backend stopped ({})", status);
                Ok(())
            }
            Ok(Err(e)) => Err(BenchError::Io(e)),
            Err(_) => {
                warn!(
                    "Backend did not stop within {}s, killing",
                    self.grace.as_secs()
                );
                self.child.kill().await?;
                Ok(())
            }
        }
    }
}

/// `GET http://localhost:{port}/health` answered 200
pub async fn health_check(client: &reqwest::Client, port: u16) -> bool {
    let url = format!("http://localhost:{}/health", port);
    match client.get(&url).send().await {
        Ok(response) => response.status() == reqwest::StatusCode::OK,
        Err(_) => false,
    }
}

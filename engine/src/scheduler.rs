//! Character Task Scheduler
//!
//! Fans out one task per dataset record across a bounded worker pool and
//! hands results back in input order.
//!
//! - At most `workers` tasks run at once (tokio tasks gated by a semaphore)
//! - Each task reports `(index, outcome)` over a channel as it finishes
//! - A failed or panicking task is logged with its index and dropped;
//!   sibling tasks keep running
//! - Successful results are re-sorted by index before they are returned
//! - A triggered `Shutdown` stops new tasks from starting and aborts the
//!   ones in flight; results that already arrived are still returned

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use sdk::errors::BenchError;
use sdk::types::IndexedResult;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{error, info, info_span, warn, Instrument};

use crate::shutdown::Shutdown;

/// Completion counters for a running batch
#[derive(Debug)]
pub struct Progress {
    total: usize,
    completed: AtomicUsize,
    failed: AtomicUsize,
}

/// Point-in-time view of `Progress`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
}

impl Progress {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            completed: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        }
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            total: self.total,
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    fn record(&self, success: bool) -> usize {
        if !success {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
        self.completed.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// A task that did not produce a result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    pub index: usize,
    pub error: String,
}

/// Outcome of a scheduled batch
#[derive(Debug)]
pub struct ScheduleReport<T> {
    /// Successful results, sorted by input index
    pub results: Vec<IndexedResult<T>>,

    /// Failed tasks, sorted by input index
    pub failures: Vec<TaskFailure>,

    /// Whether shutdown cut the batch short
    pub cancelled: bool,
}

impl<T> ScheduleReport<T> {
    /// Result values in input order
    pub fn into_values(self) -> Vec<T> {
        self.results.into_iter().map(|r| r.value).collect()
    }
}

/// Bounded parallel runner for per-character tasks
pub struct Scheduler {
    workers: usize,
    shutdown: Shutdown,
    progress: Mutex<Option<Arc<Progress>>>,
}

impl Scheduler {
    /// Create a scheduler running at most `workers` tasks at once (minimum 1)
    pub fn new(workers: usize, shutdown: Shutdown) -> Self {
        Self {
            workers: workers.max(1),
            shutdown,
            progress: Mutex::new(None),
        }
    }

    /// Progress of the batch currently (or most recently) running.
    ///
    /// Readable from another task while `run` is in progress.
    pub fn progress(&self) -> Option<Arc<Progress>> {
        self.progress
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Run `task` once per item.
    ///
    /// `task` receives the item's input index alongside the item.
    pub async fn run<I, T, F, Fut>(&self, items: Vec<I>, task: F) -> ScheduleReport<T>
    where
        I: Send + 'static,
        T: Send + 'static,
        F: Fn(usize, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, BenchError>> + Send + 'static,
    {
        let total = items.len();
        let progress = Arc::new(Progress::new(total));
        *self
            .progress
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(Arc::clone(&progress));

        let semaphore = Arc::new(Semaphore::new(self.workers));
        let (tx, mut rx) = mpsc::unbounded_channel::<(usize, Result<T, BenchError>)>();
        let task = Arc::new(task);
        let mut join_set = JoinSet::new();

        info!("Scheduling {} tasks on {} workers", total, self.workers);

        for (index, item) in items.into_iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let task = Arc::clone(&task);
            let tx = tx.clone();

            join_set.spawn(
                async move {
                    // Closed semaphore means shutdown: never start
                    let Ok(_permit) = semaphore.acquire_owned().await else {
                        return;
                    };

                    let outcome = AssertUnwindSafe((*task)(index, item))
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|panic| {
                            Err(BenchError::Task {
                                index,
                                message: panic_message(panic.as_ref()),
                            })
                        });

                    let _ = tx.send((index, outcome));
                }
                .instrument(info_span!("character", index)),
            );
        }
        drop(tx);

        let mut results = Vec::with_capacity(total);
        let mut failures = Vec::new();
        let mut cancelled = false;

        loop {
            tokio::select! {
                biased;
                message = rx.recv() => match message {
                    Some((index, outcome)) => {
                        Self::collect(index, outcome, &progress, &mut results, &mut failures);
                    }
                    None => break,
                },
                _ = self.shutdown.wait() => {
                    let snapshot = progress.snapshot();
                    warn!(
                        "Shutdown requested, abandoning {} unfinished tasks",
                        snapshot.total - snapshot.completed
                    );
                    cancelled = true;
                    semaphore.close();
                    join_set.abort_all();
                    break;
                }
            }
        }

        // Keep results that arrived while shutting down
        while let Ok((index, outcome)) = rx.try_recv() {
            Self::collect(index, outcome, &progress, &mut results, &mut failures);
        }
        join_set.shutdown().await;

        results.sort_by_key(|r: &IndexedResult<T>| r.index);
        failures.sort_by_key(|f: &TaskFailure| f.index);

        info!(
            "Batch finished: {} succeeded, {} failed, {} total",
            results.len(),
            failures.len(),
            total
        );

        ScheduleReport {
            results,
            failures,
            cancelled,
        }
    }

    fn collect<T>(
        index: usize,
        outcome: Result<T, BenchError>,
        progress: &Progress,
        results: &mut Vec<IndexedResult<T>>,
        failures: &mut Vec<TaskFailure>,
    ) {
        let done = progress.record(outcome.is_ok());
        match outcome {
            Ok(value) => {
                info!("[{}/{}] Task {} completed", done, progress.total, index);
                results.push(IndexedResult::new(index, value));
            }
            Err(e) => {
                error!(
                    "[{}/{}] Task failed at index {}: {}",
                    done, progress.total, index, e
                );
                failures.push(TaskFailure {
                    index,
                    error: e.to_string(),
                });
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}

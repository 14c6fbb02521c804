//! Shutdown signalling
//!
//! A shared flag that stops the scheduler from starting new character tasks
//! and lets long waits (backend health polling, in-flight tasks) bail out
//! early. It is triggered by SIGINT/SIGTERM in the binary, or directly by
//! callers and tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

#[derive(Debug, Default)]
struct Inner {
    flag: AtomicBool,
    notify: Notify,
}

/// Cloneable handle to one shutdown flag
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    inner: Arc<Inner>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown and wake every waiter
    pub fn trigger(&self) {
        self.inner.flag.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_triggered(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    /// Resolve once shutdown has been requested. Cancel-safe.
    pub async fn wait(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_triggered() {
                return;
            }
            notified.await;
        }
    }

    /// Trigger this shutdown on Ctrl-C or SIGTERM
    #[cfg(unix)]
    pub fn install_signal_handlers(&self) -> std::io::Result<JoinHandle<()>> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        let shutdown = self.clone();

        Ok(tokio::spawn(async move {
            tokio::select! {
                _ = sigterm.recv() => tracing::warn!("Received SIGTERM signal"),
                _ = sigint.recv() => tracing::warn!("Received interrupt signal"),
            }
            shutdown.trigger();
        }))
    }

    /// Trigger this shutdown on Ctrl-C
    #[cfg(not(unix))]
    pub fn install_signal_handlers(&self) -> std::io::Result<JoinHandle<()>> {
        let shutdown = self.clone();
        Ok(tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Received interrupt signal");
                shutdown.trigger();
            }
        }))
    }
}

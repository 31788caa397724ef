//! Worker lifecycle: start, wait for a shutdown signal, stop within a deadline.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tracing::{info, warn};

use crate::error::AgentError;

/// A long-running process driven by [`WorkerRunner`].
#[async_trait]
pub trait Worker: Send + Sync {
    /// Called once before the runner starts waiting for shutdown.
    async fn start(&self) -> Result<(), AgentError>;

    /// Called once on shutdown. Should let in-flight work finish.
    async fn stop(&self) -> Result<(), AgentError>;

    fn name(&self) -> &str;
}

/// Runs a [`Worker`] until SIGINT/SIGTERM or a programmatic notification.
pub struct WorkerRunner;

impl WorkerRunner {
    /// Run a worker to completion.
    ///
    /// `stop()` gets at most `shutdown_timeout`; after that the runner gives up
    /// on it and returns anyway.
    pub async fn run(
        worker: Arc<dyn Worker>,
        shutdown_timeout: Duration,
        shutdown_notify: Option<Arc<Notify>>,
    ) -> Result<(), AgentError> {
        let name = worker.name().to_string();
        info!(worker = %name, "starting worker");
        worker.start().await?;
        info!(worker = %name, "worker started");

        wait_for_shutdown(shutdown_notify).await;
        info!(worker = %name, timeout = ?shutdown_timeout, "shutdown signal received, stopping worker");

        match tokio::time::timeout(shutdown_timeout, worker.stop()).await {
            Ok(Ok(())) => info!(worker = %name, "worker stopped gracefully"),
            Ok(Err(e)) => warn!(worker = %name, error = %e, "worker stop returned error"),
            Err(_) => warn!(worker = %name, "worker stop timed out, forcing shutdown"),
        }

        info!(worker = %name, "worker shutdown complete");
        Ok(())
    }
}

async fn wait_for_shutdown(external: Option<Arc<Notify>>) {
    match external {
        Some(notify) => {
            tokio::select! {
                _ = shutdown_signal() => {}
                _ = notify.notified() => {}
            }
        }
        None => shutdown_signal().await,
    }
}

/// Resolve on SIGINT or SIGTERM (Ctrl+C on non-unix targets).
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
            (Ok(mut sigint), Ok(mut sigterm)) => {
                tokio::select! {
                    _ = sigint.recv() => {}
                    _ = sigterm.recv() => {}
                }
            }
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "failed to register signal handlers, falling back to ctrl_c");
                ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    ctrl_c().await;
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl_c; only programmatic shutdown will work");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    struct Counting {
        starts: AtomicU32,
        stops: AtomicU32,
        stop_delay: Duration,
    }

    impl Counting {
        fn new(stop_delay: Duration) -> Self {
            Self {
                starts: AtomicU32::new(0),
                stops: AtomicU32::new(0),
                stop_delay,
            }
        }
    }

    #[async_trait]
    impl Worker for Counting {
        async fn start(&self) -> Result<(), AgentError> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn stop(&self) -> Result<(), AgentError> {
            tokio::time::sleep(self.stop_delay).await;
            self.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    #[tokio::test]
    async fn start_then_stop_on_notify() {
        let worker = Arc::new(Counting::new(Duration::ZERO));
        let shutdown = Arc::new(Notify::new());

        let w = worker.clone();
        let s = shutdown.clone();
        let handle = tokio::spawn(async move {
            WorkerRunner::run(w, Duration::from_secs(1), Some(s)).await
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(worker.starts.load(Ordering::SeqCst), 1);
        assert_eq!(worker.stops.load(Ordering::SeqCst), 0);

        shutdown.notify_one();
        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("runner should finish")
            .expect("runner should not panic");
        assert!(result.is_ok());
        assert_eq!(worker.stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn slow_stop_is_abandoned_after_timeout() {
        let worker = Arc::new(Counting::new(Duration::from_secs(30)));
        let shutdown = Arc::new(Notify::new());
        shutdown.notify_one();

        let started = std::time::Instant::now();
        WorkerRunner::run(worker.clone(), Duration::from_millis(100), Some(shutdown))
            .await
            .unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(worker.stops.load(Ordering::SeqCst), 0);
    }
}

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tally_core::config::AgentConfig;
use tally_dispatch::{Dispatcher, SubmitReply};
use tally_scheduler::Outcome;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::compute::compute;
use crate::error::AgentError;
use crate::worker::Worker;

#[derive(Debug, Default)]
struct PoolStats {
    computed: AtomicU64,
    failed: AtomicU64,
    stale: AtomicU64,
    errors: AtomicU64,
}

/// Counters across all loops of a pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolSnapshot {
    /// Tasks answered with a value and acknowledged.
    pub computed: u64,
    /// Tasks answered with a failure (division by zero, unknown operator).
    pub failed: u64,
    /// Submits the orchestrator no longer recognised.
    pub stale: u64,
    /// Fetch or submit calls that did not get through.
    pub errors: u64,
}

/// `computing_power` independent loops that fetch, compute and submit tasks.
pub struct WorkerPool {
    name: String,
    dispatcher: Arc<dyn Dispatcher>,
    config: AgentConfig,
    stats: Arc<PoolStats>,
    stop_tx: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(name: impl Into<String>, dispatcher: Arc<dyn Dispatcher>, config: AgentConfig) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            name: name.into(),
            dispatcher,
            config,
            stats: Arc::new(PoolStats::default()),
            stop_tx,
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn size(&self) -> usize {
        self.config.computing_power.max(1)
    }

    pub fn stats(&self) -> PoolSnapshot {
        PoolSnapshot {
            computed: self.stats.computed.load(Ordering::Relaxed),
            failed: self.stats.failed.load(Ordering::Relaxed),
            stale: self.stats.stale.load(Ordering::Relaxed),
            errors: self.stats.errors.load(Ordering::Relaxed),
        }
    }

    /// Start the loops. Fails if they are already running.
    pub async fn spawn(&self) -> Result<(), AgentError> {
        let mut handles = self.handles.lock().await;
        if !handles.is_empty() {
            return Err(AgentError::AlreadyRunning(self.name.clone()));
        }
        self.stop_tx.send_replace(false);

        for index in 0..self.size() {
            let ctx = LoopContext {
                index,
                dispatcher: self.dispatcher.clone(),
                poll_interval: self.config.poll_interval(),
                stats: self.stats.clone(),
                stop: self.stop_tx.subscribe(),
            };
            handles.push(tokio::spawn(ctx.run()));
        }
        info!(pool = %self.name, workers = handles.len(), poll_ms = self.config.poll_interval_ms, "worker pool started");
        Ok(())
    }

    /// Ask every loop to stop after its current task and wait for all of them.
    pub async fn shutdown(&self) -> Result<(), AgentError> {
        self.stop_tx.send_replace(true);
        let handles: Vec<_> = self.handles.lock().await.drain(..).collect();
        let mut first_panic = None;
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(pool = %self.name, error = %e, "worker loop ended abnormally");
                if first_panic.is_none() && e.is_panic() {
                    first_panic = Some(e.to_string());
                }
            }
        }
        info!(pool = %self.name, stats = ?self.stats(), "worker pool stopped");
        match first_panic {
            Some(msg) => Err(AgentError::LoopPanicked(msg)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Worker for WorkerPool {
    async fn start(&self) -> Result<(), AgentError> {
        self.spawn().await
    }

    async fn stop(&self) -> Result<(), AgentError> {
        self.shutdown().await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

struct LoopContext {
    index: usize,
    dispatcher: Arc<dyn Dispatcher>,
    poll_interval: Duration,
    stats: Arc<PoolStats>,
    stop: watch::Receiver<bool>,
}

impl LoopContext {
    async fn run(mut self) {
        debug!(worker = self.index, "worker loop started");
        while !self.stopping() {
            let task = match self.dispatcher.fetch().await {
                Ok(Some(task)) => task,
                Ok(None) => {
                    self.idle().await;
                    continue;
                }
                Err(e) => {
                    self.stats.errors.fetch_add(1, Ordering::Relaxed);
                    warn!(worker = self.index, error = %e, "fetch failed");
                    self.idle().await;
                    continue;
                }
            };

            info!(
                worker = self.index,
                task_id = %task.task_id,
                expression_id = %task.expression_id,
                left = task.left,
                right = task.right,
                operator = %task.operator,
                cost_ms = task.cost_ms,
                "task received"
            );

            // The cost is simulated work; finish it even if a stop arrives meanwhile.
            tokio::time::sleep(task.cost()).await;
            let outcome = compute(&task);
            let failed = matches!(outcome, Outcome::Failed(_));
            if let Outcome::Failed(reason) = &outcome {
                warn!(worker = self.index, task_id = %task.task_id, reason = %reason, "task failed");
            }

            match self.dispatcher.submit(task.task_id, outcome).await {
                Ok(SubmitReply::Ack) => {
                    let counter = if failed { &self.stats.failed } else { &self.stats.computed };
                    counter.fetch_add(1, Ordering::Relaxed);
                }
                Ok(SubmitReply::UnknownTask(id)) => {
                    self.stats.stale.fetch_add(1, Ordering::Relaxed);
                    warn!(worker = self.index, task_id = %id, "orchestrator does not know this task any more, result dropped");
                }
                Err(e) => {
                    self.stats.errors.fetch_add(1, Ordering::Relaxed);
                    warn!(worker = self.index, task_id = %task.task_id, error = %e, "submit failed, task will be reclaimed by its lease");
                    self.idle().await;
                }
            }
        }
        debug!(worker = self.index, "worker loop stopped");
    }

    /// A stop was requested or the pool is gone.
    fn stopping(&self) -> bool {
        *self.stop.borrow() || self.stop.has_changed().is_err()
    }

    /// Pause for the poll interval, cut short by a stop request.
    async fn idle(&mut self) {
        tokio::select! {
            _ = tokio::time::sleep(self.poll_interval) => {}
            _ = self.stop.changed() => {}
        }
    }
}

//! Periodic jobs that run next to the dispatch server.
//!
//! Every loop exits once `shutdown` turns `true` or its sender is dropped.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tally_core::ExpressionId;
use tally_scheduler::{ExpressionStatus, Orchestrator};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// How often the queue depth is logged while work is waiting.
pub const QUEUE_LOG_INTERVAL: Duration = Duration::from_secs(2);

/// Reclaim expired task leases every `interval`.
pub fn spawn_lease_reaper(
    orchestrator: Arc<Orchestrator>,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(every(interval, shutdown, move || {
        match orchestrator.reclaim_expired() {
            Ok(0) => {}
            Ok(n) => info!(reclaimed = n, "expired task leases returned to the queue"),
            Err(e) => warn!(error = %e, "lease reaper failed"),
        }
    }))
}

/// Log queue depths every `interval` while anything is pending or in flight.
pub fn spawn_queue_monitor(
    orchestrator: Arc<Orchestrator>,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(every(interval, shutdown, move || {
        match orchestrator.scheduler().metrics() {
            Ok(m) if m.pending == 0 && m.in_flight == 0 => {}
            Ok(m) => info!(
                pending = m.pending,
                in_flight = m.in_flight,
                completed = m.tasks_completed,
                "task queue"
            ),
            Err(e) => warn!(error = %e, "failed to read queue depth"),
        }
    }))
}

/// Poll `ids` until each one is terminal, logging its final state once.
///
/// Resolves when every id has been reported or shutdown is requested.
pub fn spawn_result_reporter(
    orchestrator: Arc<Orchestrator>,
    ids: Vec<ExpressionId>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut waiting: BTreeSet<ExpressionId> = ids.into_iter().collect();
        let mut ticker = tokio::time::interval(interval);
        while !waiting.is_empty() {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }
            waiting.retain(|id| match orchestrator.status(*id) {
                Ok(view) => match view.status {
                    ExpressionStatus::Completed => {
                        info!(expression_id = %id, source = %view.source, result = %view.result_display().unwrap_or_default(), "expression completed");
                        false
                    }
                    ExpressionStatus::Failed => {
                        warn!(expression_id = %id, source = %view.source, error = view.error.as_deref().unwrap_or(""), "expression failed");
                        false
                    }
                    ExpressionStatus::Pending | ExpressionStatus::InProgress => true,
                },
                Err(e) => {
                    warn!(expression_id = %id, error = %e, "expression disappeared");
                    false
                }
            });
        }
    })
}

async fn every<F>(interval: Duration, mut shutdown: watch::Receiver<bool>, mut job: F)
where
    F: FnMut() + Send,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick fires immediately; skip it so jobs start one interval in.
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => job(),
            _ = shutdown.changed() => break,
        }
    }
}

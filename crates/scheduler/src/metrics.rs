use serde::Serialize;

/// Scheduler counters, read as a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerMetrics {
    pub expressions_accepted: u64,
    pub expressions_completed: u64,
    pub expressions_failed: u64,
    pub tasks_created: u64,
    pub tasks_dispatched: u64,
    pub tasks_completed: u64,
    /// Leases that expired and were put back on the queue.
    pub tasks_reclaimed: u64,
    /// Submits rejected as unknown (duplicate or stale).
    pub unknown_submits: u64,
    /// Queue depth at snapshot time.
    pub pending: usize,
    /// In-flight store size at snapshot time.
    pub in_flight: usize,
}

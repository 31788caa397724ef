//! Worker pool against an in-process orchestrator.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tally_agent::{Worker, WorkerPool, WorkerRunner};
use tally_core::config::{AgentConfig, CostConfig};
use tally_core::{ExpressionId, OwnerId, TaskId};
use tally_dispatch::{DispatchError, Dispatcher, LocalDispatcher, SubmitReply};
use tally_scheduler::{ExpressionStatus, ExpressionView, Orchestrator, Outcome, TaskDescriptor};
use tokio::sync::Notify;

fn agent_config(workers: usize) -> AgentConfig {
    AgentConfig {
        computing_power: workers,
        poll_interval_ms: 10,
    }
}

async fn wait_terminal(orch: &Orchestrator, ids: &[ExpressionId]) -> Vec<ExpressionView> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let views: Vec<_> = ids.iter().map(|id| orch.status(*id).unwrap()).collect();
        if views.iter().all(|v| v.status.is_terminal()) {
            return views;
        }
        assert!(tokio::time::Instant::now() < deadline, "expressions never finished: {views:?}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn pool_computes_every_expression() {
    let orch = Arc::new(Orchestrator::in_memory(CostConfig::zero()));
    let alice = OwnerId::new("alice");
    let sources = ["3+4*2", "(2+3)*4", "2(3+4)", "-5+10", "10/4", "1-2-3"];
    let ids: Vec<_> = sources
        .iter()
        .map(|s| orch.submit(s, &alice, "").unwrap())
        .collect();

    let pool = WorkerPool::new("test", Arc::new(LocalDispatcher::new(orch.clone())), agent_config(4));
    assert_eq!(pool.size(), 4);
    pool.spawn().await.unwrap();
    assert!(pool.spawn().await.is_err(), "second spawn must be refused");

    let views = wait_terminal(&orch, &ids).await;
    pool.shutdown().await.unwrap();

    let results: Vec<_> = views.iter().map(|v| v.result).collect();
    assert_eq!(
        results,
        vec![Some(11.0), Some(20.0), Some(14.0), Some(5.0), Some(2.5), Some(-4.0)]
    );
    assert!(views.iter().all(|v| v.status == ExpressionStatus::Completed));

    let stats = pool.stats();
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.computed, orch.scheduler().metrics().unwrap().tasks_completed);
}

#[tokio::test]
async fn division_by_zero_fails_the_expression() {
    let orch = Arc::new(Orchestrator::in_memory(CostConfig::zero()));
    let id = orch.submit("1/(2-2)+3*4", &OwnerId::new("bob"), "").unwrap();

    let pool = WorkerPool::new("test", Arc::new(LocalDispatcher::new(orch.clone())), agent_config(2));
    pool.spawn().await.unwrap();
    let views = wait_terminal(&orch, &[id]).await;
    pool.shutdown().await.unwrap();

    assert_eq!(views[0].status, ExpressionStatus::Failed);
    assert_eq!(views[0].error.as_deref(), Some("division by zero"));
    assert_eq!(pool.stats().failed, 1);
    assert_eq!(orch.scheduler().pending_len().unwrap(), 0);
}

/// Always unreachable.
struct Down(AtomicU32);

#[async_trait]
impl Dispatcher for Down {
    async fn fetch(&self) -> Result<Option<TaskDescriptor>, DispatchError> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Err(DispatchError::Timeout(Duration::from_millis(1)))
    }

    async fn submit(&self, task_id: TaskId, _outcome: Outcome) -> Result<SubmitReply, DispatchError> {
        Ok(SubmitReply::UnknownTask(task_id))
    }
}

#[tokio::test]
async fn transport_failures_are_retried_until_shutdown() {
    let down = Arc::new(Down(AtomicU32::new(0)));
    let pool = WorkerPool::new("test", down.clone(), agent_config(1));
    pool.spawn().await.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    tokio::time::timeout(Duration::from_secs(5), pool.shutdown())
        .await
        .expect("shutdown should not hang")
        .unwrap();

    let attempts = down.0.load(Ordering::SeqCst);
    assert!(attempts >= 2, "expected retries, got {attempts}");
    assert_eq!(pool.stats().errors, u64::from(attempts));
}

#[tokio::test]
async fn runner_drives_pool_lifecycle() {
    let orch = Arc::new(Orchestrator::in_memory(CostConfig::zero()));
    let id = orch.submit("6*7", &OwnerId::new("carol"), "").unwrap();

    let pool = Arc::new(WorkerPool::new(
        "runner",
        Arc::new(LocalDispatcher::new(orch.clone())),
        agent_config(1),
    ));
    assert_eq!(pool.name(), "runner");

    let shutdown = Arc::new(Notify::new());
    let handle = {
        let pool = pool.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { WorkerRunner::run(pool, Duration::from_secs(5), Some(shutdown)).await })
    };

    let views = wait_terminal(&orch, &[id]).await;
    assert_eq!(views[0].result, Some(42.0));

    shutdown.notify_one();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("runner should finish")
        .expect("runner should not panic")
        .unwrap();
    assert_eq!(pool.stats().computed, 1);
}

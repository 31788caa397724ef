use std::sync::Arc;

use async_trait::async_trait;
use tally_core::TaskId;
use tally_scheduler::{Orchestrator, Outcome, SchedulerError, TaskDescriptor};
use tracing::debug;

use crate::error::DispatchError;
use crate::protocol::SubmitReply;
use crate::traits::Dispatcher;

/// Calls the orchestrator directly. Used by in-process workers and as the
/// backend of [`crate::DispatchServer`].
#[derive(Clone)]
pub struct LocalDispatcher {
    orchestrator: Arc<Orchestrator>,
}

impl LocalDispatcher {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }
}

// Orchestrator calls may write to a file-backed store, so they run on the
// blocking pool instead of the async worker threads.
#[async_trait]
impl Dispatcher for LocalDispatcher {
    async fn fetch(&self) -> Result<Option<TaskDescriptor>, DispatchError> {
        let orchestrator = Arc::clone(&self.orchestrator);
        Ok(tokio::task::spawn_blocking(move || orchestrator.fetch()).await??)
    }

    async fn submit(&self, task_id: TaskId, outcome: Outcome) -> Result<SubmitReply, DispatchError> {
        let orchestrator = Arc::clone(&self.orchestrator);
        let applied =
            tokio::task::spawn_blocking(move || orchestrator.complete(task_id, outcome)).await?;
        match applied {
            Ok(applied) => {
                debug!(%task_id, expression_id = %applied.expression_id(), "submit applied");
                Ok(SubmitReply::Ack)
            }
            Err(SchedulerError::UnknownTask(id)) => Ok(SubmitReply::UnknownTask(id)),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use tally_core::config::CostConfig;
    use tally_core::OwnerId;

    use super::*;

    #[tokio::test]
    async fn unknown_task_is_a_reply_not_an_error() {
        let orch = Arc::new(Orchestrator::in_memory(CostConfig::zero()));
        orch.submit("6/3", &OwnerId::new("alice"), "").unwrap();
        let dispatcher = LocalDispatcher::new(orch);

        let task = dispatcher.fetch().await.unwrap().unwrap();
        assert_eq!(task.operator, "/");
        assert!(dispatcher.fetch().await.unwrap().is_none());

        let first = dispatcher
            .submit(task.task_id, Outcome::Value(2.0))
            .await
            .unwrap();
        assert_eq!(first, SubmitReply::Ack);

        let second = dispatcher
            .submit(task.task_id, Outcome::Value(2.0))
            .await
            .unwrap();
        assert_eq!(second, SubmitReply::UnknownTask(task.task_id));
    }
}

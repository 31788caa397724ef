//! Submission, query and worker-facing surface around the [`Scheduler`].
//!
//! Every lifecycle change that has to survive a restart goes through here:
//! acceptance, first dispatch, completion, failure and deletion are written to
//! the [`ExpressionStore`].

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use serde::Serialize;
use tally_core::config::CostConfig;
use tally_core::{ExpressionId, OwnerId, TaskId};
use tally_expr::{compile, ExprTree};
use tracing::{debug, info, warn};

use crate::auth::{AllowAll, Authenticator};
use crate::error::SchedulerError;
use crate::expression::{Expression, ExpressionStatus, ExpressionView};
use crate::registry::{Applied, Scheduler};
use crate::store::{ExpressionStore, MemoryStore};
use crate::task::{Outcome, TaskDescriptor};

/// Counts from [`Orchestrator::recover`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    /// Completed or Failed records restored as they were.
    pub terminal: usize,
    /// Unfinished records parsed again and queued from scratch.
    pub rescheduled: usize,
    /// Unfinished records whose text no longer compiles; marked Failed.
    pub rejected: usize,
}

pub struct Orchestrator {
    scheduler: Scheduler,
    store: Arc<dyn ExpressionStore>,
    auth: Arc<dyn Authenticator>,
    /// Held while a record is read from the scheduler and written to the store.
    writes: Mutex<()>,
}

impl Orchestrator {
    pub fn new(
        scheduler: Scheduler,
        store: Arc<dyn ExpressionStore>,
        auth: Arc<dyn Authenticator>,
    ) -> Self {
        Self {
            scheduler,
            store,
            auth,
            writes: Mutex::new(()),
        }
    }

    /// No persistence, no authentication.
    pub fn in_memory(costs: CostConfig) -> Self {
        Self::new(
            Scheduler::new(costs),
            Arc::new(MemoryStore::new()),
            Arc::new(AllowAll),
        )
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Authenticate, validate and parse `text`, then schedule it.
    ///
    /// Any rejection leaves no expression behind, in memory or in the store.
    pub fn submit(
        &self,
        text: &str,
        owner: &OwnerId,
        token: &str,
    ) -> Result<ExpressionId, SchedulerError> {
        self.auth.verify(owner, token)?;
        let tree = compile(text).map_err(|e| {
            debug!(%owner, kind = e.kind(), error = %e, "expression rejected");
            e
        })?;

        let view = self.scheduler.accept(text, owner.clone(), tree)?;
        if let Err(e) = self.save_current(view.id) {
            let _writes = self.write_lock()?;
            self.scheduler.delete(view.id)?;
            if let Err(cleanup) = self.store.remove(view.id) {
                warn!(expression_id = %view.id, error = %cleanup, "failed to remove rolled back record");
            }
            return Err(e);
        }
        info!(expression_id = %view.id, %owner, status = %view.status, "expression accepted");
        Ok(view.id)
    }

    pub fn status(&self, id: ExpressionId) -> Result<ExpressionView, SchedulerError> {
        self.scheduler
            .get(id)?
            .ok_or(SchedulerError::UnknownExpression(id))
    }

    pub fn list_by_owner(&self, owner: &OwnerId) -> Result<Vec<ExpressionView>, SchedulerError> {
        self.scheduler.by_owner(owner)
    }

    pub fn delete(&self, id: ExpressionId) -> Result<ExpressionView, SchedulerError> {
        let _writes = self.write_lock()?;
        let view = self
            .scheduler
            .delete(id)?
            .ok_or(SchedulerError::UnknownExpression(id))?;
        self.store.remove(id)?;
        info!(expression_id = %id, "expression deleted");
        Ok(view)
    }

    /// Fetch for a worker. `None` means there is nothing to do right now.
    pub fn fetch(&self) -> Result<Option<TaskDescriptor>, SchedulerError> {
        let Some(dispatched) = self.scheduler.fetch_next()? else {
            return Ok(None);
        };
        if dispatched.started {
            self.persist(dispatched.task.expression_id);
        }
        Ok(Some(dispatched.task))
    }

    /// Submit for a worker.
    pub fn complete(&self, task_id: TaskId, outcome: Outcome) -> Result<Applied, SchedulerError> {
        let applied = self.scheduler.submit(task_id, outcome)?;
        if applied.is_terminal() {
            self.persist(applied.expression_id());
        }
        Ok(applied)
    }

    /// Re-queue tasks whose lease ran out; returns how many.
    pub fn reclaim_expired(&self) -> Result<usize, SchedulerError> {
        Ok(self.scheduler.reclaim_expired(Instant::now())?.len())
    }

    fn write_lock(&self) -> Result<MutexGuard<'_, ()>, SchedulerError> {
        self.writes
            .lock()
            .map_err(|e| SchedulerError::LockPoisoned(format!("store writes: {}", e)))
    }

    /// Save the record as it is now. The read happens under the write lock,
    /// so a slow writer can never put back an older state or a deleted record.
    fn save_current(&self, id: ExpressionId) -> Result<(), SchedulerError> {
        let _writes = self.write_lock()?;
        if let Some(view) = self.scheduler.get(id)? {
            self.store.save(&view)?;
        }
        Ok(())
    }

    /// [`Orchestrator::save_current`]; a failure here does not stop scheduling.
    fn persist(&self, id: ExpressionId) {
        if let Err(e) = self.save_current(id) {
            warn!(expression_id = %id, error = %e, "failed to persist expression");
        }
    }

    /// Reload every stored record after a restart.
    ///
    /// Terminal records come back unchanged. Unfinished ones are validated and
    /// parsed again and every one of their operations is re-executed.
    pub fn recover(&self) -> Result<RecoveryReport, SchedulerError> {
        let mut report = RecoveryReport::default();

        for mut record in self.store.load_all()? {
            let id = record.id;
            if record.status.is_terminal() {
                let tree = compile(&record.source)
                    .unwrap_or_else(|_| ExprTree::leaf(record.result.unwrap_or_default()));
                self.scheduler.restore(Expression::from_view(record, tree))?;
                report.terminal += 1;
                continue;
            }

            match compile(&record.source) {
                Ok(tree) => {
                    record.status = ExpressionStatus::Pending;
                    let tasks = self.scheduler.restore(Expression::from_view(record, tree))?;
                    debug!(expression_id = %id, tasks, "expression rescheduled");
                    self.persist(id);
                    report.rescheduled += 1;
                }
                Err(e) => {
                    warn!(expression_id = %id, error = %e, "stored expression no longer compiles");
                    record.status = ExpressionStatus::Failed;
                    record.error = Some(e.to_string());
                    self.store.save(&record)?;
                    self.scheduler
                        .restore(Expression::from_view(record, ExprTree::leaf(0.0)))?;
                    report.rejected += 1;
                }
            }
        }

        info!(
            terminal = report.terminal,
            rescheduled = report.rescheduled,
            rejected = report.rejected,
            "recovery finished"
        );
        Ok(report)
    }
}

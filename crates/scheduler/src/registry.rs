use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tally_core::config::CostConfig;
use tally_core::{ExpressionId, OwnerId, TaskId};
use tally_expr::{EvalError, ExprTree, NodeId, TreeError};
use tracing::{debug, info, warn};

use crate::error::SchedulerError;
use crate::expression::{Expression, ExpressionStatus, ExpressionView};
use crate::metrics::SchedulerMetrics;
use crate::task::{cost_of, Outcome, Task, TaskDescriptor};

/// A task handed to a worker.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatched {
    pub task: TaskDescriptor,
    /// This was the expression's first dispatch (Pending -> InProgress).
    pub started: bool,
}

/// Effect of a Submit on the owning expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    Progressed { expression_id: ExpressionId },
    Completed { expression_id: ExpressionId, result: f64 },
    Failed { expression_id: ExpressionId, reason: String },
}

impl Applied {
    pub fn expression_id(&self) -> ExpressionId {
        match self {
            Applied::Progressed { expression_id }
            | Applied::Completed { expression_id, .. }
            | Applied::Failed { expression_id, .. } => *expression_id,
        }
    }

    /// The expression reached a terminal state with this submit.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Applied::Progressed { .. })
    }
}

/// Pending queue, in-flight store and counters.
///
/// A created task stays in `in_flight` until its result is applied; `pending`
/// holds the ids still waiting for a worker, in the order they became ready.
struct DispatchState {
    pending: VecDeque<TaskId>,
    in_flight: HashMap<TaskId, Task>,
    next_task: TaskId,
    metrics: SchedulerMetrics,
}

impl DispatchState {
    fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            in_flight: HashMap::new(),
            next_task: TaskId(1),
            metrics: SchedulerMetrics::default(),
        }
    }

    fn create_task(
        &mut self,
        expr: &mut Expression,
        node: NodeId,
        costs: &CostConfig,
    ) -> Result<TaskId, SchedulerError> {
        let (operator, left, right) = expr.tree.operands(node).ok_or(TreeError::NotReady(node))?;
        expr.tree.set_dispatched(node, true)?;

        let id = self.next_task;
        self.next_task = id.next();
        let task = Task {
            id,
            expression_id: expr.id,
            operator,
            left,
            right,
            cost: cost_of(costs, operator),
            node,
            leased_at: None,
        };
        debug!(
            task_id = %id,
            expression_id = %expr.id,
            %operator,
            left,
            right,
            "task created"
        );
        self.pending.push_back(id);
        self.in_flight.insert(id, task);
        self.metrics.tasks_created += 1;
        Ok(id)
    }

    /// Drop every queued and in-flight task of one expression.
    fn purge(&mut self, expression_id: ExpressionId) -> Vec<Task> {
        let ids: Vec<TaskId> = self
            .in_flight
            .values()
            .filter(|t| t.expression_id == expression_id)
            .map(|t| t.id)
            .collect();
        let dropped: Vec<Task> = ids.iter().filter_map(|id| self.in_flight.remove(id)).collect();
        let in_flight = &self.in_flight;
        self.pending.retain(|id| in_flight.contains_key(id));
        dropped
    }
}

struct Registry {
    expressions: BTreeMap<ExpressionId, Expression>,
    dispatch: DispatchState,
    next_expression: ExpressionId,
}

impl Registry {
    fn discover(&mut self, id: ExpressionId, costs: &CostConfig) -> Result<usize, SchedulerError> {
        let expr = self
            .expressions
            .get_mut(&id)
            .ok_or(SchedulerError::UnknownExpression(id))?;
        if expr.status.is_terminal() {
            return Ok(0);
        }
        let ready = expr.tree.ready_nodes();
        for node in &ready {
            self.dispatch.create_task(expr, *node, costs)?;
        }
        Ok(ready.len())
    }

    fn insert(&mut self, mut expr: Expression, costs: &CostConfig) -> Result<usize, SchedulerError> {
        let id = expr.id;
        if self.expressions.contains_key(&id) {
            self.dispatch.purge(id);
        }
        if !expr.status.is_terminal() {
            if let Some(value) = expr.tree.root_value() {
                expr.complete(value);
                self.dispatch.metrics.expressions_completed += 1;
            }
        }
        if id >= self.next_expression {
            self.next_expression = id.next();
        }
        self.expressions.insert(id, expr);
        self.discover(id, costs)
    }

    fn fetch_next(&mut self, now: Instant) -> Option<Dispatched> {
        while let Some(id) = self.dispatch.pending.pop_front() {
            let Some(task) = self.dispatch.in_flight.get_mut(&id) else {
                continue;
            };
            if task.leased_at.is_some() {
                continue;
            }
            task.leased_at = Some(now);
            self.dispatch.metrics.tasks_dispatched += 1;

            let mut started = false;
            if let Some(expr) = self.expressions.get_mut(&task.expression_id) {
                if expr.status == ExpressionStatus::Pending {
                    expr.status = ExpressionStatus::InProgress;
                    started = true;
                }
            }
            return Some(Dispatched {
                task: task.descriptor(),
                started,
            });
        }
        None
    }

    fn apply(
        &mut self,
        task_id: TaskId,
        outcome: Outcome,
        costs: &CostConfig,
    ) -> Result<Applied, SchedulerError> {
        let Some(task) = self.dispatch.in_flight.remove(&task_id) else {
            self.dispatch.metrics.unknown_submits += 1;
            return Err(SchedulerError::UnknownTask(task_id));
        };
        if task.leased_at.is_none() {
            // Reclaimed and re-queued, then answered by the original worker.
            self.dispatch.pending.retain(|id| *id != task_id);
        }

        let outcome = match outcome {
            Outcome::Value(value) if !value.is_finite() => {
                Outcome::Failed(EvalError::NonFinite.to_string())
            }
            other => other,
        };

        let expression_id = task.expression_id;
        let expr = self
            .expressions
            .get_mut(&expression_id)
            .ok_or(SchedulerError::UnknownTask(task_id))?;

        match outcome {
            Outcome::Value(value) => {
                let parent = expr.tree.contract(task.node, value)?;
                self.dispatch.metrics.tasks_completed += 1;
                if let Some(parent) = parent {
                    self.dispatch.create_task(expr, parent, costs)?;
                }
                match expr.tree.root_value() {
                    Some(root) => {
                        expr.complete(root);
                        self.dispatch.metrics.expressions_completed += 1;
                        let result = expr.result.unwrap_or(root);
                        info!(%expression_id, result, "expression completed");
                        Ok(Applied::Completed {
                            expression_id,
                            result,
                        })
                    }
                    None => Ok(Applied::Progressed { expression_id }),
                }
            }
            Outcome::Failed(reason) => {
                expr.fail(reason.clone());
                // The tree stays for queries; no node of it has a task any more.
                let dropped = self.dispatch.purge(expression_id);
                for node in dropped.iter().map(|t| t.node).chain([task.node]) {
                    expr.tree.set_dispatched(node, false)?;
                }
                self.dispatch.metrics.expressions_failed += 1;
                warn!(%expression_id, %task_id, dropped = dropped.len(), %reason, "expression failed");
                Ok(Applied::Failed {
                    expression_id,
                    reason,
                })
            }
        }
    }

    fn reclaim_expired(&mut self, now: Instant, lease: Duration) -> Vec<TaskId> {
        let mut expired: Vec<TaskId> = self
            .dispatch
            .in_flight
            .values()
            .filter(|t| t.lease_expired(now, lease))
            .map(|t| t.id)
            .collect();
        expired.sort();
        for id in &expired {
            if let Some(task) = self.dispatch.in_flight.get_mut(id) {
                task.leased_at = None;
            }
            self.dispatch.pending.push_back(*id);
        }
        self.dispatch.metrics.tasks_reclaimed += expired.len() as u64;
        expired
    }
}

/// Owns every expression and the dispatch state behind one lock.
///
/// All operations are short and CPU-bound; none of them blocks on I/O while
/// holding the lock.
pub struct Scheduler {
    registry: Mutex<Registry>,
    costs: CostConfig,
    lease: Option<Duration>,
}

impl Scheduler {
    pub fn new(costs: CostConfig) -> Self {
        Self {
            registry: Mutex::new(Registry {
                expressions: BTreeMap::new(),
                dispatch: DispatchState::new(),
                next_expression: ExpressionId(1),
            }),
            costs,
            lease: None,
        }
    }

    /// Re-queue fetched tasks that stay unanswered for longer than `lease`.
    pub fn with_lease(mut self, lease: Option<Duration>) -> Self {
        self.lease = lease;
        self
    }

    pub fn costs(&self) -> &CostConfig {
        &self.costs
    }

    pub fn lease(&self) -> Option<Duration> {
        self.lease
    }

    fn lock(&self) -> Result<MutexGuard<'_, Registry>, SchedulerError> {
        self.registry
            .lock()
            .map_err(|e| SchedulerError::LockPoisoned(format!("scheduler registry: {}", e)))
    }

    /// Register a parsed expression as Pending and queue its ready operations.
    ///
    /// A tree that is already a single value completes immediately.
    pub fn accept(
        &self,
        source: impl Into<String>,
        owner: OwnerId,
        tree: ExprTree,
    ) -> Result<ExpressionView, SchedulerError> {
        let mut registry = self.lock()?;
        let id = registry.next_expression;
        let expr = Expression::new(id, source.into(), owner, tree);
        registry.dispatch.metrics.expressions_accepted += 1;
        let created = registry.insert(expr, &self.costs)?;
        let expr = registry
            .expressions
            .get(&id)
            .ok_or(SchedulerError::UnknownExpression(id))?;
        debug!(
            expression_id = %id,
            operations = expr.tree.pending_operations(),
            ready = created,
            "expression accepted"
        );
        Ok(expr.view())
    }

    /// Put back an expression loaded from storage, keeping its id.
    ///
    /// Non-terminal expressions are discovered from scratch.
    pub fn restore(&self, expr: Expression) -> Result<usize, SchedulerError> {
        let mut registry = self.lock()?;
        registry.insert(expr, &self.costs)
    }

    /// Queue a task for every ready node that has none yet. Idempotent.
    pub fn discover(&self, id: ExpressionId) -> Result<usize, SchedulerError> {
        self.lock()?.discover(id, &self.costs)
    }

    /// Pop the head of the pending queue, if any.
    pub fn fetch_next(&self) -> Result<Option<Dispatched>, SchedulerError> {
        self.fetch_next_at(Instant::now())
    }

    /// [`Scheduler::fetch_next`] with an explicit lease start.
    pub fn fetch_next_at(&self, now: Instant) -> Result<Option<Dispatched>, SchedulerError> {
        Ok(self.lock()?.fetch_next(now))
    }

    pub fn apply_result(&self, task_id: TaskId, value: f64) -> Result<Applied, SchedulerError> {
        self.submit(task_id, Outcome::Value(value))
    }

    /// Mark the owning expression Failed and drop the rest of its tasks.
    pub fn apply_failure(
        &self,
        task_id: TaskId,
        reason: impl Into<String>,
    ) -> Result<Applied, SchedulerError> {
        self.submit(task_id, Outcome::Failed(reason.into()))
    }

    pub fn submit(&self, task_id: TaskId, outcome: Outcome) -> Result<Applied, SchedulerError> {
        self.lock()?.apply(task_id, outcome, &self.costs)
    }

    /// Return expired leases to the tail of the queue. No-op without a lease.
    pub fn reclaim_expired(&self, now: Instant) -> Result<Vec<TaskId>, SchedulerError> {
        let Some(lease) = self.lease else {
            return Ok(Vec::new());
        };
        let reclaimed = self.lock()?.reclaim_expired(now, lease);
        if !reclaimed.is_empty() {
            warn!(count = reclaimed.len(), "re-queued tasks with expired leases");
        }
        Ok(reclaimed)
    }

    pub fn get(&self, id: ExpressionId) -> Result<Option<ExpressionView>, SchedulerError> {
        Ok(self.lock()?.expressions.get(&id).map(Expression::view))
    }

    /// Copy of an expression including its current tree.
    pub fn snapshot(&self, id: ExpressionId) -> Result<Option<Expression>, SchedulerError> {
        Ok(self.lock()?.expressions.get(&id).cloned())
    }

    pub fn by_owner(&self, owner: &OwnerId) -> Result<Vec<ExpressionView>, SchedulerError> {
        Ok(self
            .lock()?
            .expressions
            .values()
            .filter(|e| &e.owner == owner)
            .map(Expression::view)
            .collect())
    }

    /// Remove an expression and every task it still has queued or in flight.
    pub fn delete(&self, id: ExpressionId) -> Result<Option<ExpressionView>, SchedulerError> {
        let mut registry = self.lock()?;
        let Some(expr) = registry.expressions.remove(&id) else {
            return Ok(None);
        };
        let dropped = registry.dispatch.purge(id).len();
        debug!(expression_id = %id, dropped, "expression deleted");
        Ok(Some(expr.view()))
    }

    pub fn pending_len(&self) -> Result<usize, SchedulerError> {
        Ok(self.lock()?.dispatch.pending.len())
    }

    pub fn in_flight_len(&self) -> Result<usize, SchedulerError> {
        Ok(self.lock()?.dispatch.in_flight.len())
    }

    pub fn metrics(&self) -> Result<SchedulerMetrics, SchedulerError> {
        let registry = self.lock()?;
        let mut metrics = registry.dispatch.metrics.clone();
        metrics.pending = registry.dispatch.pending.len();
        metrics.in_flight = registry.dispatch.in_flight.len();
        Ok(metrics)
    }
}

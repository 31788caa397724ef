use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tally_core::config::CostConfig;
use tally_core::{ExpressionId, TaskId};
use tally_expr::{NodeId, Operator};

/// Simulated latency for one operator.
pub fn cost_of(costs: &CostConfig, op: Operator) -> Duration {
    let ms = match op {
        Operator::Add => costs.addition_ms,
        Operator::Sub => costs.subtraction_ms,
        Operator::Mul => costs.multiplication_ms,
        Operator::Div => costs.division_ms,
    };
    Duration::from_millis(ms)
}

/// One atomic binary operation extracted from a ready node.
///
/// Operands are copies of the leaf values; `node` only locates the slot the
/// result is written back to.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: TaskId,
    pub expression_id: ExpressionId,
    pub operator: Operator,
    pub left: f64,
    pub right: f64,
    pub cost: Duration,
    pub node: NodeId,
    /// Set while a worker holds the task; `None` while it waits in the queue.
    pub leased_at: Option<Instant>,
}

impl Task {
    pub fn descriptor(&self) -> TaskDescriptor {
        TaskDescriptor {
            task_id: self.id,
            expression_id: self.expression_id,
            left: self.left,
            right: self.right,
            operator: self.operator.symbol().to_string(),
            cost_ms: self.cost.as_millis() as u64,
        }
    }

    pub fn lease_expired(&self, now: Instant, lease: Duration) -> bool {
        self.leased_at
            .is_some_and(|at| now.saturating_duration_since(at) >= lease)
    }
}

/// What a worker receives from Fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    pub task_id: TaskId,
    pub expression_id: ExpressionId,
    pub left: f64,
    pub right: f64,
    /// Operator symbol: `+`, `-`, `*` or `/`.
    pub operator: String,
    pub cost_ms: u64,
}

impl TaskDescriptor {
    pub fn cost(&self) -> Duration {
        Duration::from_millis(self.cost_ms)
    }
}

/// What a worker reports back through Submit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Value(f64),
    /// The operation could not be computed (division by zero, unknown operator).
    Failed(String),
}

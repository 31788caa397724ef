use tally_expr::Operator;
use tally_scheduler::{Outcome, TaskDescriptor};

/// Compute one task with the same rules as the reference evaluator.
///
/// Division by zero and unrecognised operators become [`Outcome::Failed`]
/// so the scheduler can fail the owning expression.
pub fn compute(task: &TaskDescriptor) -> Outcome {
    match Operator::from_symbol(&task.operator).and_then(|op| op.apply(task.left, task.right)) {
        Ok(value) => Outcome::Value(value),
        Err(e) => Outcome::Failed(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use tally_core::{ExpressionId, TaskId};

    use super::*;

    fn task(left: f64, op: &str, right: f64) -> TaskDescriptor {
        TaskDescriptor {
            task_id: TaskId(1),
            expression_id: ExpressionId(1),
            left,
            right,
            operator: op.to_string(),
            cost_ms: 0,
        }
    }

    #[test]
    fn applies_each_operator() {
        assert_eq!(compute(&task(3.0, "+", 4.0)), Outcome::Value(7.0));
        assert_eq!(compute(&task(3.0, "-", 4.0)), Outcome::Value(-1.0));
        assert_eq!(compute(&task(3.0, "*", 4.0)), Outcome::Value(12.0));
        assert_eq!(compute(&task(3.0, "/", 4.0)), Outcome::Value(0.75));
    }

    #[test]
    fn reports_failures_instead_of_panicking() {
        assert_eq!(
            compute(&task(1.0, "/", 0.0)),
            Outcome::Failed("division by zero".into())
        );
        assert_eq!(
            compute(&task(1.0, "^", 2.0)),
            Outcome::Failed("unknown operator '^'".into())
        );
    }
}

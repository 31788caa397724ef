use tally_core::{ExpressionId, TaskId};
use tally_expr::{ExprError, TreeError};

use crate::auth::AuthError;
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// Submit for a task that is not in the in-flight store (duplicate or stale).
    #[error("unknown task id {0}")]
    UnknownTask(TaskId),

    #[error("unknown expression id {0}")]
    UnknownExpression(ExpressionId),

    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),

    #[error("unauthorized: {0}")]
    Unauthorized(#[from] AuthError),

    /// Text failed validation or parsing; nothing was created.
    #[error("{0}")]
    Rejected(#[from] ExprError),

    #[error("tree error: {0}")]
    Tree(#[from] TreeError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl SchedulerError {
    /// Machine-readable kind, matching [`ExprError::kind`] for rejected text.
    pub fn kind(&self) -> &'static str {
        match self {
            SchedulerError::UnknownTask(_) => "unknown_task",
            SchedulerError::UnknownExpression(_) => "unknown_expression",
            SchedulerError::LockPoisoned(_) => "internal_error",
            SchedulerError::Unauthorized(_) => "unauthorized",
            SchedulerError::Rejected(e) => e.kind(),
            SchedulerError::Tree(_) => "internal_error",
            SchedulerError::Store(_) => "storage_error",
        }
    }
}

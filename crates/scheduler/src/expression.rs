use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tally_core::{ExpressionId, OwnerId};
use tally_expr::ExprTree;

/// Round to the two-decimal precision results are reported with.
pub fn round_result(value: f64) -> f64 {
    let scaled = value * 100.0;
    if scaled.is_finite() {
        scaled.round() / 100.0
    } else {
        // Too large to carry a fractional part.
        value
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpressionStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl ExpressionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ExpressionStatus::Completed | ExpressionStatus::Failed)
    }
}

impl fmt::Display for ExpressionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExpressionStatus::Pending => "pending",
            ExpressionStatus::InProgress => "in_progress",
            ExpressionStatus::Completed => "completed",
            ExpressionStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// An accepted expression and its exclusively owned tree.
#[derive(Debug, Clone)]
pub struct Expression {
    pub id: ExpressionId,
    pub source: String,
    pub owner: OwnerId,
    pub status: ExpressionStatus,
    /// Rounded final value; only set once Completed.
    pub result: Option<f64>,
    /// Failure reason; only set once Failed.
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub(crate) tree: ExprTree,
}

impl Expression {
    pub fn new(id: ExpressionId, source: String, owner: OwnerId, tree: ExprTree) -> Self {
        Self {
            id,
            source,
            owner,
            status: ExpressionStatus::Pending,
            result: None,
            error: None,
            created_at: Utc::now(),
            tree,
        }
    }

    /// Rebuild from a persisted record with a freshly parsed tree.
    pub fn from_view(view: ExpressionView, tree: ExprTree) -> Self {
        Self {
            id: view.id,
            source: view.source,
            owner: view.owner,
            status: view.status,
            result: view.result,
            error: view.error,
            created_at: view.created_at,
            tree,
        }
    }

    pub fn tree(&self) -> &ExprTree {
        &self.tree
    }

    pub fn view(&self) -> ExpressionView {
        ExpressionView {
            id: self.id,
            source: self.source.clone(),
            owner: self.owner.clone(),
            status: self.status,
            result: self.result,
            error: self.error.clone(),
            created_at: self.created_at,
        }
    }

    pub(crate) fn complete(&mut self, value: f64) {
        self.status = ExpressionStatus::Completed;
        self.result = Some(round_result(value));
    }

    pub(crate) fn fail(&mut self, reason: impl Into<String>) {
        self.status = ExpressionStatus::Failed;
        self.error = Some(reason.into());
    }
}

/// Read-only projection of an expression. Also the persisted record shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpressionView {
    pub id: ExpressionId,
    pub source: String,
    pub owner: OwnerId,
    pub status: ExpressionStatus,
    pub result: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ExpressionView {
    /// Result formatted with two decimals, e.g. `11.00`.
    pub fn result_display(&self) -> Option<String> {
        self.result.map(|v| format!("{v:.2}"))
    }
}

impl fmt::Display for ExpressionView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {} [{}]", self.id, self.source, self.status)?;
        if let Some(result) = self.result_display() {
            write!(f, " = {result}")?;
        }
        if let Some(error) = &self.error {
            write!(f, ": {error}")?;
        }
        Ok(())
    }
}

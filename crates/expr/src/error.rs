use thiserror::Error;

use crate::tree::NodeId;
use crate::validate::ValidationIssue;

/// A character the lexer does not recognize.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized character '{ch}' at position {position}")]
pub struct LexError {
    pub ch: char,
    pub position: usize,
}

/// One or more character-level rule violations, reported together.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("incorrect expression: {}", render_issues(.issues))]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationError {
    pub fn contains(&self, kind: &crate::validate::IssueKind) -> bool {
        self.issues.iter().any(|issue| &issue.kind == kind)
    }
}

fn render_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(|issue| issue.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Grammar-level failures raised by the parser.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructuralError {
    #[error("expected ')' at position {position}")]
    ExpectedClosingParen { position: usize },

    #[error("unexpected token '{found}' at position {position}")]
    UnexpectedToken { found: String, position: usize },

    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("trailing input '{found}' at position {position}")]
    TrailingInput { found: String, position: usize },

    #[error("invalid number '{text}' at position {position}")]
    InvalidNumber { text: String, position: usize },

    #[error("parentheses nested deeper than {limit} at position {position}")]
    TooDeep { limit: usize, position: usize },
}

/// Evaluation-time failures, shared by the reference evaluator and workers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("division by zero")]
    DivisionByZero,

    #[error("unknown operator '{0}'")]
    UnknownOperator(String),

    #[error("result is not a finite number")]
    NonFinite,
}

/// Misuse of the tree mutation API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("node {0} does not exist")]
    MissingNode(NodeId),

    #[error("node {0} is not an operator with two resolved operands")]
    NotReady(NodeId),
}

/// Anything that stops text from becoming a tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExprError {
    #[error(transparent)]
    Lex(#[from] LexError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Structural(#[from] StructuralError),
}

impl ExprError {
    /// Stable machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            ExprError::Lex(_) => "lex_error",
            ExprError::Validation(_) => "validation_error",
            ExprError::Structural(_) => "structural_error",
        }
    }

    /// Individual human-readable reasons (one per violation).
    pub fn reasons(&self) -> Vec<String> {
        match self {
            ExprError::Validation(e) => e.issues.iter().map(|i| i.to_string()).collect(),
            other => vec![other.to_string()],
        }
    }
}

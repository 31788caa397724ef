//! Arithmetic expression front end: lexing, static validation, parsing into
//! an arena-backed binary tree, and a reference evaluator.
//!
//! Submission goes through [`compile`], which runs the character-level
//! [`validate`] pass first and only then builds the tree with [`parse`].

pub mod error;
pub mod eval;
pub mod lexer;
pub mod operator;
pub mod parser;
pub mod tree;
pub mod validate;

pub use error::{EvalError, ExprError, LexError, StructuralError, TreeError, ValidationError};
pub use eval::evaluate;
pub use lexer::{tokenize, Lexer, Token, TokenKind};
pub use operator::Operator;
pub use parser::{parse, parse_tokens};
pub use tree::{ExprTree, Node, NodeId};
pub use validate::{validate, IssueKind, ValidationIssue};

/// Validate and parse expression text into a tree ready for scheduling.
pub fn compile(text: &str) -> Result<ExprTree, ExprError> {
    validate(text)?;
    Ok(parse(text)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_runs_validation_before_parsing() {
        let err = compile("2++2").unwrap_err();
        assert_eq!(err.kind(), "validation_error");

        let tree = compile("2(3+4)").unwrap();
        assert_eq!(evaluate(&tree).unwrap(), 14.0);
    }

    #[test]
    fn parser_still_catches_what_validation_lets_through() {
        // `)` followed by a number passes the character checks but leaves
        // trailing input for the grammar.
        let err = compile("(1)2").unwrap_err();
        assert_eq!(err.kind(), "structural_error");
    }
}

//! Recursive-descent parser.
//!
//! ```text
//! Expression := Term (('+' | '-') Term)*
//! Term       := Factor (('*' | '/') Factor)*
//! Factor     := ('+' | '-')* Primary ('(' Expression ')')*
//! Primary    := Number | '(' Expression ')'
//! ```
//!
//! Leading sign runs become `0 - x` / `0 + x` nodes, applied outermost-last.
//! A parenthesized group directly after a factor multiplies it.
//!
//! Every `Expression` entered below the top level is one level of nesting;
//! more than [`MAX_NESTING`] levels is rejected before the stack runs out.

use crate::error::{ExprError, StructuralError};
use crate::lexer::{tokenize, Token, TokenKind};
use crate::operator::Operator;
use crate::tree::{ExprTree, NodeId};

/// Deepest parenthesis nesting the parser accepts.
pub const MAX_NESTING: usize = 256;

/// Tokenize and parse. Does not run [`crate::validate`].
pub fn parse(text: &str) -> Result<ExprTree, ExprError> {
    let tokens = tokenize(text)?;
    Ok(parse_tokens(&tokens)?)
}

/// Parse a token stream; the whole stream must be consumed up to `End`.
pub fn parse_tokens(tokens: &[Token]) -> Result<ExprTree, StructuralError> {
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
        tree: ExprTree::empty(),
    };
    let root = parser.expression()?;
    let next = parser.peek();
    if next.kind != TokenKind::End {
        return Err(StructuralError::TrailingInput {
            found: next.text.clone(),
            position: next.position,
        });
    }
    parser.tree.set_root(root);
    Ok(parser.tree)
}

struct Parser<'t> {
    tokens: &'t [Token],
    pos: usize,
    depth: usize,
    tree: ExprTree,
}

impl<'t> Parser<'t> {
    fn peek(&self) -> &'t Token {
        // A hand-built stream without a trailing `End` ends where it runs out.
        self.tokens.get(self.pos).unwrap_or(&END)
    }

    fn advance(&mut self) -> &'t Token {
        let token = self.peek();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    /// Next token as an operator from `allowed`, without consuming it.
    fn peek_operator(&self, allowed: &[Operator]) -> Option<Operator> {
        let token = self.peek();
        if token.kind != TokenKind::Operator {
            return None;
        }
        token
            .text
            .chars()
            .next()
            .and_then(Operator::from_char)
            .filter(|op| allowed.contains(op))
    }

    fn expression(&mut self) -> Result<NodeId, StructuralError> {
        if self.depth > MAX_NESTING {
            return Err(StructuralError::TooDeep {
                limit: MAX_NESTING,
                position: self.peek().position,
            });
        }
        self.depth += 1;
        let node = self.sum();
        self.depth -= 1;
        node
    }

    fn sum(&mut self) -> Result<NodeId, StructuralError> {
        let mut node = self.term()?;
        while let Some(op) = self.peek_operator(&[Operator::Add, Operator::Sub]) {
            self.advance();
            let right = self.term()?;
            node = self.tree.push_internal(op, node, right);
        }
        Ok(node)
    }

    fn term(&mut self) -> Result<NodeId, StructuralError> {
        let mut node = self.factor()?;
        while let Some(op) = self.peek_operator(&[Operator::Mul, Operator::Div]) {
            self.advance();
            let right = self.factor()?;
            node = self.tree.push_internal(op, node, right);
        }
        Ok(node)
    }

    fn factor(&mut self) -> Result<NodeId, StructuralError> {
        let mut signs = Vec::new();
        while let Some(op) = self.peek_operator(&[Operator::Add, Operator::Sub]) {
            self.advance();
            signs.push(op);
        }

        let mut node = self.primary()?;
        while self.peek().kind == TokenKind::LeftParen {
            self.advance();
            let group = self.expression()?;
            self.expect_closing()?;
            node = self.tree.push_internal(Operator::Mul, node, group);
        }

        for op in signs.into_iter().rev() {
            let zero = self.tree.push_leaf(0.0);
            node = self.tree.push_internal(op, zero, node);
        }
        Ok(node)
    }

    fn primary(&mut self) -> Result<NodeId, StructuralError> {
        let token = self.advance();
        match token.kind {
            TokenKind::Number => {
                let invalid = || StructuralError::InvalidNumber {
                    text: token.text.clone(),
                    position: token.position,
                };
                let value: f64 = token.text.parse().map_err(|_| invalid())?;
                if !value.is_finite() {
                    return Err(invalid());
                }
                Ok(self.tree.push_leaf(value))
            }
            TokenKind::LeftParen => {
                let inner = self.expression()?;
                self.expect_closing()?;
                Ok(inner)
            }
            TokenKind::End => Err(StructuralError::UnexpectedEnd),
            TokenKind::Operator | TokenKind::RightParen => Err(StructuralError::UnexpectedToken {
                found: token.text.clone(),
                position: token.position,
            }),
        }
    }

    fn expect_closing(&mut self) -> Result<(), StructuralError> {
        let token = self.advance();
        if token.kind == TokenKind::RightParen {
            Ok(())
        } else {
            Err(StructuralError::ExpectedClosingParen {
                position: token.position,
            })
        }
    }
}

static END: Token = Token {
    kind: TokenKind::End,
    text: String::new(),
    position: 0,
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LexError;
    use crate::eval::evaluate;

    fn shape(text: &str) -> String {
        parse(text).unwrap().to_string()
    }

    #[test]
    fn builds_left_associative_chains() {
        assert_eq!(shape("1-2-3"), "((1 - 2) - 3)");
        assert_eq!(shape("8/4*2"), "((8 / 4) * 2)");
        assert_eq!(shape("3+4*2"), "(3 + (4 * 2))");
    }

    #[test]
    fn folds_sign_runs_outermost_last() {
        assert_eq!(shape("--5"), "(0 - (0 - 5))");
        assert_eq!(shape("+-5"), "(0 + (0 - 5))");
        assert_eq!(evaluate(&parse("--5").unwrap()), Ok(5.0));
    }

    #[test]
    fn trailing_groups_multiply() {
        assert_eq!(shape("2(3+4)"), "(2 * (3 + 4))");
        assert_eq!(shape("2(3)(4)"), "((2 * 3) * 4)");
        assert_eq!(shape("(1+1)(2)"), "((1 + 1) * 2)");
    }

    #[test]
    fn literal_cases() {
        let value = |t: &str| evaluate(&parse(t).unwrap()).unwrap();
        assert_eq!(value("2+3*4"), 14.0);
        assert_eq!(value("(2+3)*4"), 20.0);
        assert_eq!(value("2(3+4)"), 14.0);
        assert_eq!(value("-5+10"), 5.0);
        assert!(parse("10/0").is_ok());
    }

    #[test]
    fn missing_closing_paren() {
        let err = parse("(1+2").unwrap_err();
        assert_eq!(
            err,
            ExprError::Structural(StructuralError::ExpectedClosingParen { position: 4 })
        );
        assert!(matches!(
            parse("2(3").unwrap_err(),
            ExprError::Structural(StructuralError::ExpectedClosingParen { .. })
        ));
    }

    #[test]
    fn unexpected_tokens_where_primary_required() {
        assert!(matches!(
            parse("*3").unwrap_err(),
            ExprError::Structural(StructuralError::UnexpectedToken { position: 0, .. })
        ));
        assert!(matches!(
            parse(")").unwrap_err(),
            ExprError::Structural(StructuralError::UnexpectedToken { .. })
        ));
        assert_eq!(
            parse("1+").unwrap_err(),
            ExprError::Structural(StructuralError::UnexpectedEnd)
        );
        assert_eq!(
            parse("").unwrap_err(),
            ExprError::Structural(StructuralError::UnexpectedEnd)
        );
    }

    #[test]
    fn trailing_input_is_rejected() {
        assert_eq!(
            parse("1 2").unwrap_err(),
            ExprError::Structural(StructuralError::TrailingInput {
                found: "2".into(),
                position: 2
            })
        );
        assert!(matches!(
            parse("(1))").unwrap_err(),
            ExprError::Structural(StructuralError::TrailingInput { position: 3, .. })
        ));
    }

    #[test]
    fn bad_numbers_and_characters() {
        assert!(matches!(
            parse("1+.").unwrap_err(),
            ExprError::Structural(StructuralError::InvalidNumber { .. })
        ));
        assert_eq!(
            parse("2 % 3").unwrap_err(),
            ExprError::Lex(LexError { ch: '%', position: 2 })
        );
    }

    #[test]
    fn overflowing_literal_is_invalid() {
        let huge = "9".repeat(400);
        assert!(matches!(
            parse(&format!("{huge}-{huge}")).unwrap_err(),
            ExprError::Structural(StructuralError::InvalidNumber { position: 0, .. })
        ));
    }

    #[test]
    fn nesting_is_bounded() {
        let nested = |depth: usize| format!("{}1{}", "(".repeat(depth), ")".repeat(depth));
        assert_eq!(evaluate(&parse(&nested(MAX_NESTING)).unwrap()), Ok(1.0));

        assert_eq!(
            parse(&nested(MAX_NESTING + 1)).unwrap_err(),
            ExprError::Structural(StructuralError::TooDeep {
                limit: MAX_NESTING,
                position: MAX_NESTING + 1,
            })
        );
        assert!(matches!(
            crate::compile(&nested(10_000)).unwrap_err(),
            ExprError::Structural(StructuralError::TooDeep { .. })
        ));
        assert!(matches!(
            parse(&format!("2{}", "(3".repeat(10_000))).unwrap_err(),
            ExprError::Structural(StructuralError::TooDeep { .. })
        ));
    }

    #[test]
    fn long_chains_do_not_recurse() {
        let text = vec!["1"; 100_000].join("+");
        let tree = crate::compile(&text).unwrap();
        assert_eq!(evaluate(&tree), Ok(100_000.0));
        assert!(tree.to_string().starts_with(&"(".repeat(99_999)));
    }

    #[test]
    fn hand_built_stream_without_end() {
        let tokens = vec![Token {
            kind: TokenKind::Number,
            text: "4".into(),
            position: 0,
        }];
        let tree = parse_tokens(&tokens).unwrap();
        assert_eq!(tree.root_value(), Some(4.0));
    }
}

//! Character-level checks that run before the grammar sees the text.
//!
//! Every rule is evaluated and every violation is collected, so a caller gets
//! the full list of problems in one round trip. Whitespace is ignored, but
//! reported positions are character offsets into the original text.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IssueKind {
    Empty,
    InvalidCharacter { ch: char },
    InvalidStart { ch: char },
    InvalidEnd { ch: char },
    AdjacentOperators,
    AdjacentSeparators,
    SeparatorNextToParenthesis,
    SeparatorNextToOperator,
    EmptyParentheses,
    DivisionByZeroLiteral,
    UnmatchedRightParenthesis,
    MultipleSeparators,
    UnbalancedParentheses { left: usize, right: usize },
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueKind::Empty => write!(f, "expression is empty"),
            IssueKind::InvalidCharacter { ch } => write!(f, "invalid character '{ch}'"),
            IssueKind::InvalidStart { ch } => write!(f, "expression cannot start with '{ch}'"),
            IssueKind::InvalidEnd { ch } => write!(f, "expression cannot end with '{ch}'"),
            IssueKind::AdjacentOperators => write!(f, "two operators in a row"),
            IssueKind::AdjacentSeparators => write!(f, "two separators in a row"),
            IssueKind::SeparatorNextToParenthesis => write!(f, "separator next to a parenthesis"),
            IssueKind::SeparatorNextToOperator => write!(f, "separator next to an operator"),
            IssueKind::EmptyParentheses => write!(f, "empty parentheses"),
            IssueKind::DivisionByZeroLiteral => write!(f, "division by zero"),
            IssueKind::UnmatchedRightParenthesis => {
                write!(f, "closing parenthesis without an opening one")
            }
            IssueKind::MultipleSeparators => write!(f, "more than one separator in a number"),
            IssueKind::UnbalancedParentheses { left, right } => {
                write!(f, "unbalanced parentheses ({left} opening, {right} closing)")
            }
        }
    }
}

/// One rule violation, tagged with the offending character offset when there is one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub kind: IssueKind,
    pub position: Option<usize>,
}

impl ValidationIssue {
    fn at(kind: IssueKind, position: usize) -> Self {
        Self {
            kind,
            position: Some(position),
        }
    }

    fn whole(kind: IssueKind) -> Self {
        Self {
            kind,
            position: None,
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.position {
            Some(p) => write!(f, "{} at position {p}", self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

fn is_operator(c: char) -> bool {
    matches!(c, '+' | '-' | '*' | '/')
}

fn is_paren(c: char) -> bool {
    matches!(c, '(' | ')')
}

fn is_allowed(c: char) -> bool {
    c.is_ascii_digit() || c == '.' || is_paren(c) || is_operator(c)
}

/// Run every character rule over `text`.
pub fn validate(text: &str) -> Result<(), ValidationError> {
    let chars: Vec<(usize, char)> = text
        .chars()
        .enumerate()
        .filter(|(_, c)| !c.is_whitespace())
        .collect();

    if chars.is_empty() {
        return Err(ValidationError {
            issues: vec![ValidationIssue::whole(IssueKind::Empty)],
        });
    }

    let mut issues = Vec::new();
    let mut left = 0usize;
    let mut right = 0usize;
    let mut depth = 0usize;
    let mut separators_in_run = 0usize;

    for (i, &(pos, c)) in chars.iter().enumerate() {
        if !is_allowed(c) {
            issues.push(ValidationIssue::at(IssueKind::InvalidCharacter { ch: c }, pos));
            separators_in_run = 0;
            continue;
        }

        if i == 0 && !(c.is_ascii_digit() || c == '(' || c == '-') {
            issues.push(ValidationIssue::at(IssueKind::InvalidStart { ch: c }, pos));
        }

        if let Some(&(_, prev)) = i.checked_sub(1).and_then(|p| chars.get(p)) {
            if let Some(kind) = pair_issue(prev, c) {
                issues.push(ValidationIssue::at(kind, pos));
            }
        }

        match c {
            '(' => {
                left += 1;
                depth += 1;
            }
            ')' => {
                right += 1;
                if depth == 0 {
                    issues.push(ValidationIssue::at(IssueKind::UnmatchedRightParenthesis, pos));
                } else {
                    depth -= 1;
                }
            }
            '/' if chars.get(i + 1).is_some_and(|&(_, next)| next == '0') => {
                issues.push(ValidationIssue::at(IssueKind::DivisionByZeroLiteral, pos));
            }
            _ => {}
        }

        if c == '.' {
            separators_in_run += 1;
            let after_digit = i > 0 && chars[i - 1].1.is_ascii_digit();
            if separators_in_run > 1 && after_digit {
                issues.push(ValidationIssue::at(IssueKind::MultipleSeparators, pos));
            }
        } else if !c.is_ascii_digit() {
            separators_in_run = 0;
        }

        if i == chars.len() - 1 && !(c.is_ascii_digit() || c == ')') {
            issues.push(ValidationIssue::at(IssueKind::InvalidEnd { ch: c }, pos));
        }
    }

    if left != right {
        issues.push(ValidationIssue::whole(IssueKind::UnbalancedParentheses {
            left,
            right,
        }));
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(ValidationError { issues })
    }
}

/// Rule broken by `prev` immediately followed by `next`, if any.
fn pair_issue(prev: char, next: char) -> Option<IssueKind> {
    if !is_allowed(prev) {
        return None;
    }
    match (prev, next) {
        (a, b) if is_operator(a) && is_operator(b) => Some(IssueKind::AdjacentOperators),
        ('.', '.') => Some(IssueKind::AdjacentSeparators),
        ('.', p) | (p, '.') if is_paren(p) => Some(IssueKind::SeparatorNextToParenthesis),
        ('.', o) | (o, '.') if is_operator(o) => Some(IssueKind::SeparatorNextToOperator),
        ('(', ')') => Some(IssueKind::EmptyParentheses),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(text: &str) -> Vec<IssueKind> {
        validate(text)
            .unwrap_err()
            .issues
            .into_iter()
            .map(|i| i.kind)
            .collect()
    }

    #[test]
    fn accepts_well_formed_expressions() {
        for text in ["3+4*2", "-5+10", "2(3+4)", "(1.5 + 2) / 0.5", "10/0.25", "((7))"] {
            assert!(validate(text).is_ok(), "{text} should be accepted");
        }
    }

    #[test]
    fn empty_and_blank_input() {
        assert_eq!(kinds(""), vec![IssueKind::Empty]);
        assert_eq!(kinds("  \t"), vec![IssueKind::Empty]);
    }

    #[test]
    fn adjacent_operators() {
        let err = validate("2++2").unwrap_err();
        assert!(err.contains(&IssueKind::AdjacentOperators));
        assert_eq!(err.issues[0].position, Some(2));
    }

    #[test]
    fn empty_parentheses() {
        assert!(validate("()").unwrap_err().contains(&IssueKind::EmptyParentheses));
    }

    #[test]
    fn unbalanced_parentheses() {
        let err = validate("(1+2").unwrap_err();
        assert!(err.contains(&IssueKind::UnbalancedParentheses { left: 1, right: 0 }));
    }

    #[test]
    fn unmatched_closing_parenthesis() {
        let kinds = kinds("1)+(2");
        assert!(kinds.contains(&IssueKind::UnmatchedRightParenthesis));
        assert!(!kinds.iter().any(|k| matches!(k, IssueKind::UnbalancedParentheses { .. })));
    }

    #[test]
    fn division_by_zero_literals() {
        assert!(validate("1/0").unwrap_err().contains(&IssueKind::DivisionByZeroLiteral));
        assert!(validate("1/0.0").unwrap_err().contains(&IssueKind::DivisionByZeroLiteral));
        assert!(validate("1/0.5").unwrap_err().contains(&IssueKind::DivisionByZeroLiteral));
        assert!(validate("1/05").unwrap_err().contains(&IssueKind::DivisionByZeroLiteral));
        assert!(validate("1/ 0").unwrap_err().contains(&IssueKind::DivisionByZeroLiteral));
        assert!(validate("10/2").is_ok());
        assert!(validate("1/50").is_ok());
        // Only a literal zero; computed zeros are caught at evaluation time.
        assert!(validate("1/(2-2)").is_ok());
    }

    #[test]
    fn separator_rules() {
        assert!(validate("1..2").unwrap_err().contains(&IssueKind::AdjacentSeparators));
        assert!(validate("1.2.3").unwrap_err().contains(&IssueKind::MultipleSeparators));
        assert!(validate("(.5)")
            .unwrap_err()
            .contains(&IssueKind::SeparatorNextToParenthesis));
        assert!(validate("1+.5")
            .unwrap_err()
            .contains(&IssueKind::SeparatorNextToOperator));
    }

    #[test]
    fn start_and_end_characters() {
        assert_eq!(kinds("*2"), vec![IssueKind::InvalidStart { ch: '*' }]);
        assert_eq!(kinds("2+"), vec![IssueKind::InvalidEnd { ch: '+' }]);
    }

    #[test]
    fn invalid_characters_report_original_positions() {
        let err = validate("1 + x").unwrap_err();
        assert_eq!(
            err.issues,
            vec![ValidationIssue {
                kind: IssueKind::InvalidCharacter { ch: 'x' },
                position: Some(4),
            }]
        );
    }

    #[test]
    fn violations_accumulate() {
        // starts with '*', '++', '()', unbalanced, ends with '('
        let kinds = kinds("*1++()(");
        assert!(kinds.contains(&IssueKind::InvalidStart { ch: '*' }));
        assert!(kinds.contains(&IssueKind::AdjacentOperators));
        assert!(kinds.contains(&IssueKind::EmptyParentheses));
        assert!(kinds.contains(&IssueKind::InvalidEnd { ch: '(' }));
        assert!(kinds.contains(&IssueKind::UnbalancedParentheses { left: 2, right: 1 }));
    }

    #[test]
    fn error_message_lists_every_reason() {
        let err = validate("2++").unwrap_err();
        assert_eq!(
            err.to_string(),
            "incorrect expression: two operators in a row at position 2; \
             expression cannot end with '+' at position 2"
        );
    }
}

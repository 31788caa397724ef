use std::iter::{Enumerate, Peekable};
use std::str::Chars;

use crate::error::LexError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Number,
    Operator,
    LeftParen,
    RightParen,
    End,
}

/// A lexeme with its character offset in the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Literal text for numbers and operators; the bracket itself for parens; empty for `End`.
    pub text: String,
    pub position: usize,
}

impl Token {
    fn new(kind: TokenKind, text: impl Into<String>, position: usize) -> Self {
        Self {
            kind,
            text: text.into(),
            position,
        }
    }

    pub fn is_operator(&self, symbol: char) -> bool {
        self.kind == TokenKind::Operator && self.text.starts_with(symbol)
    }
}

/// Single-pass tokenizer. Yields tokens left to right and finishes with
/// exactly one `End` token (or the first error), after which it is exhausted.
pub struct Lexer<'a> {
    chars: Peekable<Enumerate<Chars<'a>>>,
    /// Position just past the last consumed character.
    cursor: usize,
    done: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            chars: text.chars().enumerate().peekable(),
            cursor: 0,
            done: false,
        }
    }

    fn bump(&mut self) -> Option<(usize, char)> {
        let next = self.chars.next();
        if let Some((pos, _)) = next {
            self.cursor = pos + 1;
        }
        next
    }

    /// Digits with at most one `.`; a second separator starts a new token.
    fn number(&mut self, start: usize, first: char) -> Token {
        let mut text = String::from(first);
        let mut seen_dot = first == '.';
        while let Some(&(_, c)) = self.chars.peek() {
            if c.is_ascii_digit() {
                text.push(c);
            } else if c == '.' && !seen_dot {
                seen_dot = true;
                text.push(c);
            } else {
                break;
            }
            self.bump();
        }
        Token::new(TokenKind::Number, text, start)
    }
}

impl Iterator for Lexer<'_> {
    type Item = Result<Token, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            let Some((pos, c)) = self.bump() else {
                self.done = true;
                return Some(Ok(Token::new(TokenKind::End, "", self.cursor)));
            };
            let token = match c {
                c if c.is_whitespace() => continue,
                '(' => Token::new(TokenKind::LeftParen, "(", pos),
                ')' => Token::new(TokenKind::RightParen, ")", pos),
                '+' | '-' | '*' | '/' => Token::new(TokenKind::Operator, c, pos),
                c if c.is_ascii_digit() || c == '.' => self.number(pos, c),
                other => {
                    self.done = true;
                    return Some(Err(LexError {
                        ch: other,
                        position: pos,
                    }));
                }
            };
            return Some(Ok(token));
        }
    }
}

/// Tokenize the whole input; the last token is always `End`.
pub fn tokenize(text: &str) -> Result<Vec<Token>, LexError> {
    Lexer::new(text).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(text: &str) -> Vec<TokenKind> {
        tokenize(text).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn tokenizes_operators_parens_and_numbers() {
        use TokenKind::*;
        assert_eq!(
            kinds("2 * (3.5 - 1)"),
            vec![Number, Operator, LeftParen, Number, Operator, Number, RightParen, End]
        );

        let tokens = tokenize("12.75+3").unwrap();
        assert_eq!(tokens[0].text, "12.75");
        assert_eq!(tokens[1].text, "+");
        assert_eq!(tokens[2].position, 6);
    }

    #[test]
    fn positions_count_skipped_whitespace() {
        let tokens = tokenize("  7 /  2").unwrap();
        assert_eq!(tokens[0].position, 2);
        assert_eq!(tokens[1].position, 4);
        assert_eq!(tokens[2].position, 7);
        assert_eq!(tokens[3].kind, TokenKind::End);
        assert_eq!(tokens[3].position, 8);
    }

    #[test]
    fn second_separator_starts_new_number() {
        let tokens = tokenize("1.2.3").unwrap();
        assert_eq!(tokens[0].text, "1.2");
        assert_eq!(tokens[1].text, ".3");
        assert_eq!(tokens[1].position, 3);
    }

    #[test]
    fn empty_input_is_just_end() {
        assert_eq!(kinds(""), vec![TokenKind::End]);
        assert_eq!(kinds("   "), vec![TokenKind::End]);
    }

    #[test]
    fn unknown_character_names_offender_and_position() {
        let err = tokenize("1 + x").unwrap_err();
        assert_eq!(err, LexError { ch: 'x', position: 4 });
        assert_eq!(err.to_string(), "unrecognized character 'x' at position 4");
    }

    #[test]
    fn lexer_is_exhausted_after_end_or_error() {
        let mut lexer = Lexer::new("1");
        assert!(matches!(lexer.next(), Some(Ok(t)) if t.kind == TokenKind::Number));
        assert!(matches!(lexer.next(), Some(Ok(t)) if t.kind == TokenKind::End));
        assert!(lexer.next().is_none());

        let mut lexer = Lexer::new("^1");
        assert!(matches!(lexer.next(), Some(Err(_))));
        assert!(lexer.next().is_none());
    }
}

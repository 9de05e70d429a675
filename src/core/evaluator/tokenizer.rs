//! Tokenizer for substituted formula text
//!
//! After column substitution a formula may only contain digits, `.`, the
//! operators `+ - * /`, parentheses, whitespace and `DATE(...)` literals.
//! Anything else is rejected before parsing. A doubled sign with nothing
//! between (`--`, `++`) is a syntax error; separated signs are unary.

use chrono::NaiveDate;
use std::iter::Peekable;
use std::str::Chars;

use crate::core::dates::parse_date;
use crate::error::{LedgerError, LedgerResult};

/// A token in a substituted formula
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Unsigned decimal literal (`12`, `0.5`, `.5`)
    Number(f64),
    /// `DATE(<iso date>)`
    Date(NaiveDate),
    /// One of `+ - * /`
    Operator(char),
    OpenParen,
    CloseParen,
}

pub struct Tokenizer<'a> {
    source: &'a str,
    chars: Peekable<Chars<'a>>,
    position: usize,
}

impl<'a> Tokenizer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.chars().peekable(),
            position: 0,
        }
    }

    /// Tokenize the whole input
    pub fn tokenize(mut self) -> LedgerResult<Vec<Token>> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token()? {
            tokens.push(token);
        }
        Ok(tokens)
    }

    fn next_token(&mut self) -> LedgerResult<Option<Token>> {
        self.skip_whitespace();

        let Some(c) = self.peek() else {
            return Ok(None);
        };
        let token = match c {
            '(' => {
                self.advance();
                Token::OpenParen
            }
            ')' => {
                self.advance();
                Token::CloseParen
            }
            '+' | '-' => {
                let start = self.position;
                self.advance();
                if self.peek() == Some(c) {
                    return Err(LedgerError::FormulaSyntax {
                        message: format!("Unexpected '{}{}'", c, c),
                        position: start,
                    });
                }
                Token::Operator(c)
            }
            '*' | '/' => {
                self.advance();
                Token::Operator(c)
            }
            c if c.is_ascii_digit() || c == '.' => self.read_number()?,
            'D' if self.rest().starts_with("DATE(") => self.read_date()?,
            _ => return Err(self.unsafe_expression()),
        };
        Ok(Some(token))
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.next();
        if let Some(c) = c {
            self.position += c.len_utf8();
        }
        c
    }

    fn rest(&self) -> &'a str {
        &self.source[self.position..]
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.advance();
        }
    }

    fn unsafe_expression(&self) -> LedgerError {
        LedgerError::UnsafeExpression(format!(
            "Unsafe characters detected in formula: {}",
            self.source
        ))
    }

    /// Digits with at most one decimal point; a second point is a syntax error
    fn read_number(&mut self) -> LedgerResult<Token> {
        let start = self.position;
        let mut literal = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || c == '.' {
                literal.push(c);
                self.advance();
            } else {
                break;
            }
        }
        literal
            .parse::<f64>()
            .map(Token::Number)
            .map_err(|_| LedgerError::FormulaSyntax {
                message: format!("Invalid number: {}", literal),
                position: start,
            })
    }

    /// `DATE(` up to the first `)`
    fn read_date(&mut self) -> LedgerResult<Token> {
        let start = self.position;
        let rest = self.rest();
        let Some(close) = rest.find(')') else {
            return Err(LedgerError::FormulaSyntax {
                message: "Unterminated DATE literal".to_string(),
                position: start,
            });
        };
        let inner = rest["DATE(".len()..close].trim();
        for _ in rest[..=close].chars() {
            self.advance();
        }
        parse_date(inner)
            .map(Token::Date)
            .ok_or_else(|| LedgerError::InvalidDate(inner.to_string()))
    }
}

/// Tokenize a substituted formula
pub fn tokenize(source: &str) -> LedgerResult<Vec<Token>> {
    Tokenizer::new(source).tokenize()
}

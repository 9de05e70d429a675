//! Recursive-descent parser and tree-walking evaluator for formula arithmetic
//!
//! Grammar:
//!
//! ```text
//! expression := term (("+" | "-") term)*
//! term       := unary (("*" | "/") unary)*
//! unary      := ("+" | "-") unary | primary
//! primary    := NUMBER | DATE | "(" expression ")"
//! ```

use chrono::NaiveDate;

use super::tokenizer::Token;
use crate::core::dates::days_since_epoch;
use crate::error::{LedgerError, LedgerResult};

/// Abstract syntax tree of a formula
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    /// Evaluates to whole days since 1970-01-01
    Date(NaiveDate),
    BinaryOp {
        op: char,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    UnaryOp {
        op: char,
        operand: Box<Expr>,
    },
}

pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            position: 0,
        }
    }

    /// Parse the tokens into an AST
    pub fn parse(mut self) -> LedgerResult<Expr> {
        if self.tokens.is_empty() {
            return Err(self.error("Empty expression"));
        }
        let expr = self.expression()?;
        if let Some(token) = self.peek() {
            return Err(self.error(format!("Unexpected token after expression: {:?}", token)));
        }
        Ok(expr)
    }

    fn error(&self, message: impl Into<String>) -> LedgerError {
        LedgerError::FormulaSyntax {
            message: message.into(),
            position: self.position,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn match_token(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn match_operator(&mut self, ops: &[char]) -> Option<char> {
        match self.peek() {
            Some(Token::Operator(op)) if ops.contains(op) => {
                let op = *op;
                self.position += 1;
                Some(op)
            }
            _ => None,
        }
    }

    fn expression(&mut self) -> LedgerResult<Expr> {
        let mut left = self.term()?;
        while let Some(op) = self.match_operator(&['+', '-']) {
            let right = self.term()?;
            left = Expr::BinaryOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn term(&mut self) -> LedgerResult<Expr> {
        let mut left = self.unary()?;
        while let Some(op) = self.match_operator(&['*', '/']) {
            let right = self.unary()?;
            left = Expr::BinaryOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn unary(&mut self) -> LedgerResult<Expr> {
        if let Some(op) = self.match_operator(&['+', '-']) {
            let operand = self.unary()?;
            return Ok(Expr::UnaryOp {
                op,
                operand: Box::new(operand),
            });
        }
        self.primary()
    }

    fn primary(&mut self) -> LedgerResult<Expr> {
        let expr = match self.peek() {
            Some(Token::Number(n)) => Expr::Number(*n),
            Some(Token::Date(date)) => Expr::Date(*date),
            Some(Token::OpenParen) => {
                self.position += 1;
                let inner = self.expression()?;
                if !self.match_token(&Token::CloseParen) {
                    return Err(self.error("Expected ')'"));
                }
                return Ok(inner);
            }
            Some(token) => return Err(self.error(format!("Unexpected token: {:?}", token))),
            None => return Err(self.error("Unexpected end of expression")),
        };
        self.position += 1;
        Ok(expr)
    }
}

/// Evaluate an expression tree with IEEE float semantics (`1/0` is infinite)
pub fn evaluate(expr: &Expr) -> f64 {
    match expr {
        Expr::Number(n) => *n,
        Expr::Date(date) => days_since_epoch(*date) as f64,
        Expr::UnaryOp { op, operand } => {
            let value = evaluate(operand);
            if *op == '-' {
                -value
            } else {
                value
            }
        }
        Expr::BinaryOp { op, left, right } => {
            let (l, r) = (evaluate(left), evaluate(right));
            match op {
                '+' => l + r,
                '-' => l - r,
                '*' => l * r,
                _ => l / r,
            }
        }
    }
}

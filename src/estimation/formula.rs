//! Quantity formula evaluation.
//!
//! A formula is a small arithmetic expression over named line inputs, such as
//! `area/100` or `(length * width) / 9`. Evaluation happens in two steps:
//!
//! 1. Every whole-word occurrence of an input name is replaced with the
//!    input's numeric literal.
//! 2. The remaining text must be pure arithmetic (numbers, `+ - * /`,
//!    parentheses, whitespace). It is tokenized and parsed by a recursive
//!    descent parser; nothing else is ever executed.
//!
//! Arithmetic runs on `Decimal` with checked operations. Division by zero or
//! overflow makes the result non-finite, which evaluates to zero.

use std::collections::HashMap;
use std::str::FromStr;

use regex::{NoExpand, Regex};
use rust_decimal::Decimal;

use crate::error::FormulaError;

/// Evaluate `formula` against `inputs`.
pub fn evaluate(formula: &str, inputs: &HashMap<String, Decimal>) -> Result<Decimal, FormulaError> {
    let substituted = substitute(formula, inputs)?;

    if let Some(identifier) = first_identifier(&substituted) {
        return Err(invalid(formula, format!("unknown identifier '{}'", identifier)));
    }

    let tokens = tokenize(&substituted).map_err(|reason| invalid(formula, reason))?;
    let expr = Parser::new(&tokens)
        .parse()
        .map_err(|reason| invalid(formula, reason))?;

    Ok(expr.eval().unwrap_or(Decimal::ZERO))
}

/// Scale a quantity by a waste allowance. `waste_pct` is a fraction and is
/// applied as given, including negative values. `None` on overflow.
pub fn apply_waste(qty: Decimal, waste_pct: Decimal) -> Option<Decimal> {
    Decimal::ONE
        .checked_add(waste_pct)
        .and_then(|scale| qty.checked_mul(scale))
}

fn invalid(formula: &str, reason: impl Into<String>) -> FormulaError {
    FormulaError::InvalidFormula {
        formula: formula.to_string(),
        reason: reason.into(),
    }
}

/// Replace whole-word input names with their values.
fn substitute(formula: &str, inputs: &HashMap<String, Decimal>) -> Result<String, FormulaError> {
    let mut keys: Vec<&String> = inputs.keys().collect();
    // Longest first so the output does not depend on map iteration order.
    keys.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

    let mut text = formula.to_string();
    for key in keys {
        if key.is_empty() {
            continue;
        }
        let pattern = Regex::new(&format!(r"\b{}\b", regex::escape(key)))
            .map_err(|e| invalid(formula, format!("bad input name '{}': {}", key, e)))?;
        let value = inputs[key];
        let literal = if value.is_sign_negative() && !value.is_zero() {
            format!("({})", value)
        } else {
            value.to_string()
        };
        text = pattern.replace_all(&text, NoExpand(&literal)).into_owned();
    }
    Ok(text)
}

/// First alphabetic word left after substitution, if any.
fn first_identifier(text: &str) -> Option<String> {
    let start = text.find(|c: char| c.is_alphabetic())?;
    let word: String = text[start..]
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    Some(word)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(Decimal),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

fn tokenize(text: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => {
                i += 1;
            }
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let literal: String = chars[start..i].iter().collect();
                tokens.push(Token::Number(parse_number(&literal)?));
            }
            other => return Err(format!("unexpected character '{}'", other)),
        }
    }

    if tokens.is_empty() {
        return Err("empty formula".to_string());
    }
    Ok(tokens)
}

fn parse_number(literal: &str) -> Result<Decimal, String> {
    if literal.matches('.').count() > 1 || literal == "." {
        return Err(format!("malformed number '{}'", literal));
    }
    let normalized = match (literal.starts_with('.'), literal.ends_with('.')) {
        (true, _) => format!("0{}", literal),
        (false, true) => literal.trim_end_matches('.').to_string(),
        _ => literal.to_string(),
    };
    Decimal::from_str(&normalized).map_err(|e| format!("malformed number '{}': {}", literal, e))
}

#[derive(Debug)]
enum Expr {
    Number(Decimal),
    Neg(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl Expr {
    /// `None` when the result is not finite.
    fn eval(&self) -> Option<Decimal> {
        match self {
            Expr::Number(n) => Some(*n),
            Expr::Neg(inner) => inner.eval().map(|v| -v),
            Expr::Binary(op, lhs, rhs) => {
                let (a, b) = (lhs.eval()?, rhs.eval()?);
                match op {
                    BinOp::Add => a.checked_add(b),
                    BinOp::Sub => a.checked_sub(b),
                    BinOp::Mul => a.checked_mul(b),
                    BinOp::Div => a.checked_div(b),
                }
            }
        }
    }
}

/// Grammar:
///
/// ```text
/// expr   := term (('+' | '-') term)*
/// term   := factor (('*' | '/') factor)*
/// factor := ('+' | '-') factor | NUMBER | '(' expr ')'
/// ```
struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, pos: 0 }
    }

    fn parse(mut self) -> Result<Expr, String> {
        let expr = self.expr()?;
        match self.peek() {
            None => Ok(expr),
            Some(token) => Err(format!("unexpected {:?} at position {}", token, self.pos)),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.pos);
        self.pos += 1;
        token
    }

    fn expr(&mut self) -> Result<Expr, String> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn term(&mut self) -> Result<Expr, String> {
        let mut lhs = self.factor()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.factor()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn factor(&mut self) -> Result<Expr, String> {
        match self.next().cloned() {
            Some(Token::Plus) => self.factor(),
            Some(Token::Minus) => Ok(Expr::Neg(Box::new(self.factor()?))),
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::LParen) => {
                let inner = self.expr()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err("missing closing parenthesis".to_string()),
                }
            }
            Some(token) => Err(format!("unexpected {:?}", token)),
            None => Err("unexpected end of formula".to_string()),
        }
    }
}

//! Arithmetic-only calculator for `calculator` tool nodes.
//!
//! Input text is first reduced to the characters `0-9 + - * / ( ) .`; the
//! remainder is parsed by a small recursive-descent evaluator. Nothing but
//! numeric arithmetic is ever evaluated.

use std::sync::OnceLock;

use chrono::Utc;
use regex::Regex;
use serde_json::json;
use thiserror::Error;

const MAX_NESTING: usize = 64;
// Integers up to 2^53 survive the f64 → i64 conversion exactly.
const MAX_EXACT_INT: f64 = 9_007_199_254_740_992.0;

#[derive(Debug, Error, PartialEq)]
pub enum CalcError {
    #[error("empty expression")]
    Empty,
    #[error("unexpected '{found}' at position {pos}")]
    Unexpected { found: char, pos: usize },
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("malformed number at position {0}")]
    BadNumber(usize),
    #[error("parentheses nested deeper than {MAX_NESTING}")]
    TooDeep,
    #[error("result is not a finite number")]
    NotFinite,
}

const ALLOWED: &str = "0123456789+-*/().";

fn strip_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"[^0-9+\-*/().]").ok())
        .as_ref()
}

/// Remove every character that cannot be part of an arithmetic expression.
pub fn sanitize(input: &str) -> String {
    match strip_pattern() {
        Some(re) => re.replace_all(input, "").into_owned(),
        None => input.chars().filter(|c| ALLOWED.contains(*c)).collect(),
    }
}

/// Evaluate an already sanitized expression.
pub fn evaluate(expr: &str) -> Result<f64, CalcError> {
    if expr.is_empty() {
        return Err(CalcError::Empty);
    }
    let mut parser = Parser {
        src: expr.as_bytes(),
        pos: 0,
        depth: 0,
    };
    let value = parser.expression()?;
    if let Some(&b) = parser.src.get(parser.pos) {
        return Err(CalcError::Unexpected {
            found: b as char,
            pos: parser.pos,
        });
    }
    if !value.is_finite() {
        return Err(CalcError::NotFinite);
    }
    Ok(value)
}

/// Run the calculator tool on raw node input, producing the node's payload.
///
/// Evaluation failures become an error payload rather than a node failure.
pub fn calculate(input: &str) -> serde_json::Value {
    let calculation = sanitize(input);
    let timestamp = Utc::now().to_rfc3339();

    match evaluate(&calculation) {
        Ok(result) => json!({
            "expression": input,
            "calculation": calculation,
            "result": number_value(result),
            "timestamp": timestamp,
        }),
        Err(e) => {
            tracing::debug!(expression = %calculation, error = %e, "Calculator rejected expression");
            json!({
                "expression": input,
                "error": "Invalid mathematical expression",
                "timestamp": timestamp,
            })
        }
    }
}

fn number_value(n: f64) -> serde_json::Value {
    if n.fract() == 0.0 && n.abs() <= MAX_EXACT_INT {
        json!(n as i64)
    } else {
        json!(n)
    }
}

struct Parser<'a> {
    src: &'a [u8],
    pos: usize,
    depth: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    // expression := term (('+' | '-') term)*
    fn expression(&mut self) -> Result<f64, CalcError> {
        let mut acc = self.term()?;
        while let Some(op @ (b'+' | b'-')) = self.peek() {
            self.pos += 1;
            let rhs = self.term()?;
            acc = if op == b'+' { acc + rhs } else { acc - rhs };
        }
        Ok(acc)
    }

    // term := unary (('*' | '/') unary)*, where '**' is left to `power`
    fn term(&mut self) -> Result<f64, CalcError> {
        let mut acc = self.unary()?;
        while let Some(op @ (b'*' | b'/')) = self.peek() {
            self.pos += 1;
            let rhs = self.unary()?;
            acc = if op == b'*' { acc * rhs } else { acc / rhs };
        }
        Ok(acc)
    }

    // unary := ('+' | '-') unary | power
    fn unary(&mut self) -> Result<f64, CalcError> {
        match self.peek() {
            Some(b'-') => {
                self.pos += 1;
                self.nested(|p| p.unary()).map(|v| -v)
            }
            Some(b'+') => {
                self.pos += 1;
                self.nested(|p| p.unary())
            }
            _ => self.power(),
        }
    }

    // power := primary ('**' unary)?
    fn power(&mut self) -> Result<f64, CalcError> {
        let base = self.primary()?;
        if self.src[self.pos..].starts_with(b"**") {
            self.pos += 2;
            let exp = self.nested(|p| p.unary())?;
            return Ok(base.powf(exp));
        }
        Ok(base)
    }

    // primary := number | '(' expression ')'
    fn primary(&mut self) -> Result<f64, CalcError> {
        match self.peek() {
            Some(b'(') => {
                self.pos += 1;
                let value = self.nested(|p| p.expression())?;
                match self.peek() {
                    Some(b')') => {
                        self.pos += 1;
                        Ok(value)
                    }
                    Some(b) => Err(CalcError::Unexpected {
                        found: b as char,
                        pos: self.pos,
                    }),
                    None => Err(CalcError::UnexpectedEnd),
                }
            }
            Some(b'0'..=b'9' | b'.') => self.number(),
            Some(b) => Err(CalcError::Unexpected {
                found: b as char,
                pos: self.pos,
            }),
            None => Err(CalcError::UnexpectedEnd),
        }
    }

    fn number(&mut self) -> Result<f64, CalcError> {
        let start = self.pos;
        let mut seen_dot = false;
        let mut digits = 0;
        while let Some(b) = self.peek() {
            match b {
                b'0'..=b'9' => digits += 1,
                b'.' if !seen_dot => seen_dot = true,
                _ => break,
            }
            self.pos += 1;
        }
        if digits == 0 {
            return Err(CalcError::BadNumber(start));
        }
        // Only ASCII digits and one '.' were consumed.
        let text = std::str::from_utf8(&self.src[start..self.pos])
            .map_err(|_| CalcError::BadNumber(start))?;
        text.parse::<f64>().map_err(|_| CalcError::BadNumber(start))
    }

    fn nested<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, CalcError>,
    ) -> Result<T, CalcError> {
        if self.depth >= MAX_NESTING {
            return Err(CalcError::TooDeep);
        }
        self.depth += 1;
        let out = f(self);
        self.depth -= 1;
        out
    }
}

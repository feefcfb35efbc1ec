//! Condition expression language.
//!
//! A small, whitelisted grammar evaluated entirely in-process: literals
//! (numbers, single- or double-quoted strings, `true`, `false`, `null`),
//! variable references with dotted paths (`alert.severity`), comparison
//! (`==`, `!=`, `<`, `<=`, `>`, `>=`), boolean operators (`&&`, `||`,
//! `!`, with `and`/`or`/`not` word forms), arithmetic (`+`, `-`, `*`,
//! `/`), and parentheses. Nothing here reaches the host: no function
//! calls, no indexing, no assignment.
//!
//! Condition steps use [`evaluate_or_false`], which is fail-closed: any
//! lexing, parsing, or evaluation error logs a warning into the run log
//! and yields `false`.

use std::collections::HashMap;

use serde_json::Value;
use thiserror::Error;

use crate::context::{ExecutionContext, LogLevel};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
    #[error("unexpected character '{ch}' at position {pos}")]
    UnexpectedChar { ch: char, pos: usize },
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("unexpected token '{0}'")]
    UnexpectedToken(String),
    #[error("undefined variable '{0}'")]
    UndefinedVariable(String),
    #[error("invalid operands for '{op}'")]
    InvalidOperands { op: &'static str },
}

/// Evaluate an expression to a boolean using standard truthiness rules.
pub fn evaluate(expression: &str, variables: &HashMap<String, Value>) -> Result<bool, ExprError> {
    evaluate_value(expression, variables).map(|v| truthy(&v))
}

/// Evaluate an expression to its raw value.
pub fn evaluate_value(
    expression: &str,
    variables: &HashMap<String, Value>,
) -> Result<Value, ExprError> {
    let tokens = tokenize(expression)?;
    let ast = Parser::new(tokens).parse()?;
    eval(&ast, variables)
}

/// Fail-closed wrapper for condition steps: errors become `false` with a
/// warning in the run log.
pub fn evaluate_or_false(
    expression: &str,
    ctx: &mut ExecutionContext,
    step_id: &str,
) -> bool {
    match evaluate(expression, &ctx.variables) {
        Ok(value) => value,
        Err(err) => {
            ctx.log(
                LogLevel::Warn,
                format!("condition evaluation failed ({err}), treating as false"),
                Some(step_id),
                Some(Value::String(expression.to_string())),
            );
            false
        }
    }
}

/// Truthiness: false, null, 0, and "" are false; everything else is true.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    True,
    False,
    Null,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Not,
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{n}"),
            Token::Str(s) => write!(f, "'{s}'"),
            Token::Ident(name) => f.write_str(name),
            Token::True => f.write_str("true"),
            Token::False => f.write_str("false"),
            Token::Null => f.write_str("null"),
            Token::EqEq => f.write_str("=="),
            Token::NotEq => f.write_str("!="),
            Token::Lt => f.write_str("<"),
            Token::Le => f.write_str("<="),
            Token::Gt => f.write_str(">"),
            Token::Ge => f.write_str(">="),
            Token::And => f.write_str("&&"),
            Token::Or => f.write_str("||"),
            Token::Not => f.write_str("!"),
            Token::Plus => f.write_str("+"),
            Token::Minus => f.write_str("-"),
            Token::Star => f.write_str("*"),
            Token::Slash => f.write_str("/"),
            Token::LParen => f.write_str("("),
            Token::RParen => f.write_str(")"),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, ExprError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\r' | '\n' => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
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
            '=' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::EqEq);
                    i += 2;
                } else {
                    return Err(ExprError::UnexpectedChar { ch: '=', pos: i });
                }
            }
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::NotEq);
                    i += 2;
                } else {
                    tokens.push(Token::Not);
                    i += 1;
                }
            }
            '<' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Le);
                    i += 2;
                } else {
                    tokens.push(Token::Lt);
                    i += 1;
                }
            }
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Ge);
                    i += 2;
                } else {
                    tokens.push(Token::Gt);
                    i += 1;
                }
            }
            '&' => {
                if chars.get(i + 1) == Some(&'&') {
                    tokens.push(Token::And);
                    i += 2;
                } else {
                    return Err(ExprError::UnexpectedChar { ch: '&', pos: i });
                }
            }
            '|' => {
                if chars.get(i + 1) == Some(&'|') {
                    tokens.push(Token::Or);
                    i += 2;
                } else {
                    return Err(ExprError::UnexpectedChar { ch: '|', pos: i });
                }
            }
            '\'' | '"' => {
                let quote = c;
                let mut s = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        Some(&ch) if ch == quote => {
                            i += 1;
                            break;
                        }
                        Some(&ch) => {
                            s.push(ch);
                            i += 1;
                        }
                        None => return Err(ExprError::UnterminatedString),
                    }
                }
                tokens.push(Token::Str(s));
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                if chars.get(i) == Some(&'.')
                    && chars.get(i + 1).map(|c| c.is_ascii_digit()).unwrap_or(false)
                {
                    i += 1;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
                let text: String = chars[start..i].iter().collect();
                let n = text
                    .parse::<f64>()
                    .map_err(|_| ExprError::UnexpectedChar { ch: c, pos: start })?;
                tokens.push(Token::Number(n));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.')
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.as_str() {
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" => Token::Null,
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    _ => Token::Ident(word),
                });
            }
            other => return Err(ExprError::UnexpectedChar { ch: other, pos: i }),
        }
    }

    Ok(tokens)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
}

impl BinOp {
    fn symbol(&self) -> &'static str {
        match self {
            BinOp::And => "&&",
            BinOp::Or => "||",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
        }
    }
}

#[derive(Debug, Clone)]
enum Expr {
    Literal(Value),
    Var(String),
    Not(Box<Expr>),
    Neg(Box<Expr>),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Parser { tokens, pos: 0 }
    }

    fn parse(mut self) -> Result<Expr, ExprError> {
        let expr = self.parse_or()?;
        match self.peek() {
            None => Ok(expr),
            Some(tok) => Err(ExprError::UnexpectedToken(tok.to_string())),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_or(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_and()?;
        while self.eat(&Token::Or) {
            let rhs = self.parse_and()?;
            lhs = Expr::Binary {
                op: BinOp::Or,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_equality()?;
        while self.eat(&Token::And) {
            let rhs = self.parse_equality()?;
            lhs = Expr::Binary {
                op: BinOp::And,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_comparison()?;
        loop {
            let op = match self.peek() {
                Some(Token::EqEq) => BinOp::Eq,
                Some(Token::NotEq) => BinOp::Ne,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.parse_comparison()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_comparison(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                Some(Token::Lt) => BinOp::Lt,
                Some(Token::Le) => BinOp::Le,
                Some(Token::Gt) => BinOp::Gt,
                Some(Token::Ge) => BinOp::Ge,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.parse_additive()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ExprError> {
        if self.eat(&Token::Not) {
            return Ok(Expr::Not(Box::new(self.parse_unary()?)));
        }
        if self.eat(&Token::Minus) {
            return Ok(Expr::Neg(Box::new(self.parse_unary()?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, ExprError> {
        match self.advance() {
            Some(Token::Number(n)) => {
                let num = serde_json::Number::from_f64(n)
                    .ok_or(ExprError::InvalidOperands { op: "number" })?;
                Ok(Expr::Literal(Value::Number(num)))
            }
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::True) => Ok(Expr::Literal(Value::Bool(true))),
            Some(Token::False) => Ok(Expr::Literal(Value::Bool(false))),
            Some(Token::Null) => Ok(Expr::Literal(Value::Null)),
            Some(Token::Ident(name)) => Ok(Expr::Var(name)),
            Some(Token::LParen) => {
                let expr = self.parse_or()?;
                if self.eat(&Token::RParen) {
                    Ok(expr)
                } else {
                    match self.peek() {
                        Some(tok) => Err(ExprError::UnexpectedToken(tok.to_string())),
                        None => Err(ExprError::UnexpectedEnd),
                    }
                }
            }
            Some(tok) => Err(ExprError::UnexpectedToken(tok.to_string())),
            None => Err(ExprError::UnexpectedEnd),
        }
    }
}

fn eval(expr: &Expr, variables: &HashMap<String, Value>) -> Result<Value, ExprError> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Var(name) => {
            lookup(name, variables).ok_or_else(|| ExprError::UndefinedVariable(name.clone()))
        }
        Expr::Not(inner) => Ok(Value::Bool(!truthy(&eval(inner, variables)?))),
        Expr::Neg(inner) => {
            let v = eval(inner, variables)?;
            let n = as_number(&v).ok_or(ExprError::InvalidOperands { op: "-" })?;
            number_value(-n, "-")
        }
        Expr::Binary { op, lhs, rhs } => match op {
            BinOp::And => {
                if !truthy(&eval(lhs, variables)?) {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(truthy(&eval(rhs, variables)?)))
            }
            BinOp::Or => {
                if truthy(&eval(lhs, variables)?) {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(truthy(&eval(rhs, variables)?)))
            }
            BinOp::Eq => {
                let (a, b) = (eval(lhs, variables)?, eval(rhs, variables)?);
                Ok(Value::Bool(values_equal(&a, &b)))
            }
            BinOp::Ne => {
                let (a, b) = (eval(lhs, variables)?, eval(rhs, variables)?);
                Ok(Value::Bool(!values_equal(&a, &b)))
            }
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                let (a, b) = (eval(lhs, variables)?, eval(rhs, variables)?);
                let ordering = compare(&a, &b).ok_or(ExprError::InvalidOperands {
                    op: op.symbol(),
                })?;
                Ok(Value::Bool(match op {
                    BinOp::Lt => ordering.is_lt(),
                    BinOp::Le => ordering.is_le(),
                    BinOp::Gt => ordering.is_gt(),
                    _ => ordering.is_ge(),
                }))
            }
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div => {
                let (a, b) = (eval(lhs, variables)?, eval(rhs, variables)?);
                let (x, y) = match (as_number(&a), as_number(&b)) {
                    (Some(x), Some(y)) => (x, y),
                    _ => return Err(ExprError::InvalidOperands { op: op.symbol() }),
                };
                let result = match op {
                    BinOp::Add => x + y,
                    BinOp::Sub => x - y,
                    BinOp::Mul => x * y,
                    _ => x / y,
                };
                number_value(result, op.symbol())
            }
        },
    }
}

/// Resolve an identifier: exact key first, then dotted-path descent into
/// nested objects.
fn lookup(name: &str, variables: &HashMap<String, Value>) -> Option<Value> {
    if let Some(v) = variables.get(name) {
        return Some(v.clone());
    }
    let mut parts = name.split('.');
    let mut current = variables.get(parts.next()?)?.clone();
    for part in parts {
        current = current.get(part)?.clone();
    }
    Some(current)
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn number_value(n: f64, op: &'static str) -> Result<Value, ExprError> {
    serde_json::Number::from_f64(n)
        .map(Value::Number)
        .ok_or(ExprError::InvalidOperands { op })
}

fn values_equal(a: &Value, b: &Value) -> bool {
    if let (Value::Number(x), Value::Number(y)) = (a, b) {
        if let (Some(x), Some(y)) = (x.as_f64(), y.as_f64()) {
            return x == y;
        }
    }
    a == b
}

fn compare(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    if let (Some(x), Some(y)) = (as_number(a), as_number(b)) {
        return x.partial_cmp(&y);
    }
    if let (Value::String(x), Value::String(y)) = (a, b) {
        return Some(x.cmp(y));
    }
    None
}

//! Boolean condition expressions over noise parameters.
//!
//! Rule conditions are authored as strings (`"height < 64 && caves > 0.3"`)
//! and compiled once when the bundle is built. Evaluation is deliberately
//! fail-soft: a malformed expression compiles to an always-false condition,
//! a runtime type error evaluates to false, and a missing parameter binding
//! reads as 0. A broken rule skips its action; it never aborts a pass.

use hashbrown::HashSet;
use thiserror::Error;

/// Supplies parameter values during condition evaluation.
///
/// The rule engine binds the built-in `height` parameter and one value per
/// referenced noise field at the voxel being evaluated.
pub trait ParamSource {
    /// Returns the value bound to `name`, or `None` if unbound.
    fn value(&self, name: &str) -> Option<f64>;
}

/// Errors produced while parsing a condition source string.
#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    /// An unexpected character or token.
    #[error("unexpected token at offset {0}")]
    UnexpectedToken(usize),
    /// The source ended mid-expression.
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    /// A numeric literal failed to parse.
    #[error("invalid number: {0}")]
    InvalidNumber(String),
}

/// Errors produced while evaluating an expression.
#[derive(Debug, Error, PartialEq)]
pub enum EvalError {
    /// An operator was applied to operands of the wrong type.
    #[error("type mismatch in expression")]
    TypeMismatch,
}

/// Result of evaluating an expression node.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Value {
    /// A numeric value.
    Num(f64),
    /// A boolean value.
    Bool(bool),
}

/// Unary operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnOp {
    /// Arithmetic negation.
    Neg,
    /// Boolean negation.
    Not,
}

/// Binary operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

/// A parsed expression tree.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    /// Numeric literal.
    Num(f64),
    /// Boolean literal (`true` / `false`).
    Bool(bool),
    /// Named parameter reference.
    Param(String),
    /// Unary operator application.
    Unary(UnOp, Box<Expr>),
    /// Binary operator application.
    Binary(BinOp, Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Parses an expression from its source string.
    pub fn parse(src: &str) -> Result<Expr, ParseError> {
        let tokens = tokenize(src)?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.parse_or()?;
        if parser.pos != parser.tokens.len() {
            return Err(ParseError::UnexpectedToken(parser.pos));
        }
        Ok(expr)
    }

    /// Evaluates the expression against the given parameter bindings.
    ///
    /// Unbound parameters read as 0 (the fail-safe default for missing noise
    /// fields).
    pub fn eval(&self, params: &impl ParamSource) -> Result<Value, EvalError> {
        match self {
            Expr::Num(n) => Ok(Value::Num(*n)),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Param(name) => Ok(Value::Num(params.value(name).unwrap_or(0.0))),
            Expr::Unary(op, inner) => match (op, inner.eval(params)?) {
                (UnOp::Neg, Value::Num(n)) => Ok(Value::Num(-n)),
                (UnOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
                _ => Err(EvalError::TypeMismatch),
            },
            Expr::Binary(op, lhs, rhs) => {
                // Boolean operators short-circuit.
                if matches!(op, BinOp::And | BinOp::Or) {
                    let Value::Bool(l) = lhs.eval(params)? else {
                        return Err(EvalError::TypeMismatch);
                    };
                    match (op, l) {
                        (BinOp::And, false) => return Ok(Value::Bool(false)),
                        (BinOp::Or, true) => return Ok(Value::Bool(true)),
                        _ => {}
                    }
                    let Value::Bool(r) = rhs.eval(params)? else {
                        return Err(EvalError::TypeMismatch);
                    };
                    return Ok(Value::Bool(r));
                }

                let l = lhs.eval(params)?;
                let r = rhs.eval(params)?;
                match (op, l, r) {
                    (BinOp::Add, Value::Num(a), Value::Num(b)) => Ok(Value::Num(a + b)),
                    (BinOp::Sub, Value::Num(a), Value::Num(b)) => Ok(Value::Num(a - b)),
                    (BinOp::Mul, Value::Num(a), Value::Num(b)) => Ok(Value::Num(a * b)),
                    (BinOp::Div, Value::Num(a), Value::Num(b)) => Ok(Value::Num(a / b)),
                    (BinOp::Lt, Value::Num(a), Value::Num(b)) => Ok(Value::Bool(a < b)),
                    (BinOp::Le, Value::Num(a), Value::Num(b)) => Ok(Value::Bool(a <= b)),
                    (BinOp::Gt, Value::Num(a), Value::Num(b)) => Ok(Value::Bool(a > b)),
                    (BinOp::Ge, Value::Num(a), Value::Num(b)) => Ok(Value::Bool(a >= b)),
                    (BinOp::Eq, Value::Num(a), Value::Num(b)) => Ok(Value::Bool(a == b)),
                    (BinOp::Eq, Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(a == b)),
                    (BinOp::Ne, Value::Num(a), Value::Num(b)) => Ok(Value::Bool(a != b)),
                    (BinOp::Ne, Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(a != b)),
                    _ => Err(EvalError::TypeMismatch),
                }
            }
        }
    }

    /// Adds every referenced parameter name to `out`.
    pub fn collect_params(&self, out: &mut HashSet<String>) {
        match self {
            Expr::Num(_) | Expr::Bool(_) => {}
            Expr::Param(name) => {
                out.insert(name.clone());
            }
            Expr::Unary(_, inner) => inner.collect_params(out),
            Expr::Binary(_, lhs, rhs) => {
                lhs.collect_params(out);
                rhs.collect_params(out);
            }
        }
    }
}

/// A compiled rule condition.
///
/// Compilation never fails: a source string that does not parse becomes a
/// condition that always evaluates false.
#[derive(Clone, Debug)]
pub struct Condition {
    expr: Option<Expr>,
    source: String,
}

impl Condition {
    /// Compiles a condition from its source string.
    pub fn compile(src: &str) -> Condition {
        let expr = match Expr::parse(src) {
            Ok(expr) => Some(expr),
            Err(err) => {
                tracing::warn!(source = %src, %err, "malformed rule condition; treating as false");
                None
            }
        };
        Condition {
            expr,
            source: src.to_string(),
        }
    }

    /// A condition that always holds.
    pub fn always_true() -> Condition {
        Condition {
            expr: Some(Expr::Bool(true)),
            source: "true".to_string(),
        }
    }

    /// A condition that never holds. Used to disarm rules whose action
    /// references an unknown block or object.
    pub fn never() -> Condition {
        Condition {
            expr: Some(Expr::Bool(false)),
            source: "false".to_string(),
        }
    }

    /// Evaluates the condition at one voxel.
    ///
    /// Malformed expressions, non-boolean results, and runtime type errors
    /// all evaluate to `false`.
    pub fn is_true(&self, params: &impl ParamSource) -> bool {
        match &self.expr {
            None => false,
            Some(expr) => matches!(expr.eval(params), Ok(Value::Bool(true))),
        }
    }

    /// Adds every referenced parameter name to `out`.
    pub fn collect_params(&self, out: &mut HashSet<String>) {
        if let Some(expr) = &self.expr {
            expr.collect_params(out);
        }
    }

    /// Returns the original source string.
    pub fn source(&self) -> &str {
        &self.source
    }
}

// ---------------------------------------------------------------------------
// Tokenizer and parser
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Num(f64),
    Ident(String),
    LParen,
    RParen,
    Plus,
    Minus,
    Star,
    Slash,
    Lt,
    Le,
    Gt,
    Ge,
    EqEq,
    Ne,
    AndAnd,
    OrOr,
    Bang,
}

fn tokenize(src: &str) -> Result<Vec<Token>, ParseError> {
    let bytes = src.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i] as char;
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
            '<' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Token::Le);
                    i += 2;
                } else {
                    tokens.push(Token::Lt);
                    i += 1;
                }
            }
            '>' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Token::Ge);
                    i += 2;
                } else {
                    tokens.push(Token::Gt);
                    i += 1;
                }
            }
            '=' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Token::EqEq);
                    i += 2;
                } else {
                    return Err(ParseError::UnexpectedToken(i));
                }
            }
            '!' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Token::Ne);
                    i += 2;
                } else {
                    tokens.push(Token::Bang);
                    i += 1;
                }
            }
            '&' => {
                if bytes.get(i + 1) == Some(&b'&') {
                    tokens.push(Token::AndAnd);
                    i += 2;
                } else {
                    return Err(ParseError::UnexpectedToken(i));
                }
            }
            '|' => {
                if bytes.get(i + 1) == Some(&b'|') {
                    tokens.push(Token::OrOr);
                    i += 2;
                } else {
                    return Err(ParseError::UnexpectedToken(i));
                }
            }
            '0'..='9' | '.' => {
                let start = i;
                while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                    i += 1;
                }
                let text = &src[start..i];
                let value = text
                    .parse::<f64>()
                    .map_err(|_| ParseError::InvalidNumber(text.to_string()))?;
                tokens.push(Token::Num(value));
            }
            'a'..='z' | 'A'..='Z' | '_' => {
                let start = i;
                while i < bytes.len()
                    && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_')
                {
                    i += 1;
                }
                tokens.push(Token::Ident(src[start..i].to_string()));
            }
            _ => return Err(ParseError::UnexpectedToken(i)),
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Result<Token, ParseError> {
        let token = self.tokens.get(self.pos).cloned().ok_or(ParseError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(token)
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_and()?;
        while self.peek() == Some(&Token::OrOr) {
            self.pos += 1;
            let rhs = self.parse_and()?;
            lhs = Expr::Binary(BinOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_equality()?;
        while self.peek() == Some(&Token::AndAnd) {
            self.pos += 1;
            let rhs = self.parse_equality()?;
            lhs = Expr::Binary(BinOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_comparison()?;
        loop {
            let op = match self.peek() {
                Some(Token::EqEq) => BinOp::Eq,
                Some(Token::Ne) => BinOp::Ne,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.parse_comparison()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
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
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                Ok(Expr::Unary(UnOp::Neg, Box::new(self.parse_unary()?)))
            }
            Some(Token::Bang) => {
                self.pos += 1;
                Ok(Expr::Unary(UnOp::Not, Box::new(self.parse_unary()?)))
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        match self.next()? {
            Token::Num(n) => Ok(Expr::Num(n)),
            Token::Ident(name) => match name.as_str() {
                "true" => Ok(Expr::Bool(true)),
                "false" => Ok(Expr::Bool(false)),
                _ => Ok(Expr::Param(name)),
            },
            Token::LParen => {
                let inner = self.parse_or()?;
                match self.next()? {
                    Token::RParen => Ok(inner),
                    _ => Err(ParseError::UnexpectedToken(self.pos - 1)),
                }
            }
            _ => Err(ParseError::UnexpectedToken(self.pos - 1)),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

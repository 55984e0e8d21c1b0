//! Sandboxed arithmetic expression language used by machine calculations.
//!
//! Formulas are plain expressions: numbers, quoted strings, `true`/`false`,
//! identifiers bound by a [`DimensionContext`], the operators `+ - * / % ^`,
//! parentheses and a fixed set of math functions. There are no statements,
//! assignments or user-defined functions, so evaluating a formula can only
//! ever produce a value or an [`ExprError`].
//!
//! Identifiers are resolved against the context first and the built-in
//! constants (`pi`, `e`, ...) second. Arithmetic coerces booleans to `1`/`0`
//! and numeric strings to numbers; anything else is a type error.

use crate::dimension::DimensionContext;
use crate::spec::DimensionValue;
use lazy_static::lazy_static;
use regex::Regex;
use std::f64::consts;
use thiserror::Error;

lazy_static! {
    static ref TOKEN_REGEX: Regex = Regex::new(
        r"^(?:(?P<num>(?:[0-9]+\.?[0-9]*|\.[0-9]+)(?:[eE][+-]?[0-9]+)?)|(?P<ident>[A-Za-z_][A-Za-z0-9_]*)|(?P<op>[-+*/%^(),]))"
    )
    .unwrap();
    static ref NUMERIC_TEXT_REGEX: Regex =
        Regex::new(r"^[+-]?(?:[0-9]+\.?[0-9]*|\.[0-9]+)(?:[eE][+-]?[0-9]+)?$").unwrap();
}

/// Positions in messages are 1-based character offsets into the formula.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
    #[error("Unexpected end of expression (char {0})")]
    UnexpectedEnd(usize),
    #[error("Unexpected character \"{ch}\" (char {pos})")]
    UnexpectedChar { ch: char, pos: usize },
    #[error("Unexpected token \"{token}\" (char {pos})")]
    UnexpectedToken { token: String, pos: usize },
    #[error("Parenthesis ) expected (char {0})")]
    MissingParen(usize),
    #[error("Unterminated string (char {0})")]
    UnterminatedString(usize),
    #[error("Expression nested too deeply (char {0})")]
    TooDeep(usize),
    #[error("Undefined symbol {0}")]
    UndefinedSymbol(String),
    #[error("Undefined function {0}")]
    UndefinedFunction(String),
    #[error("Wrong number of arguments in function {name} ({provided} provided, {expected} expected)")]
    WrongArity {
        name: String,
        provided: usize,
        expected: String,
    },
    #[error("Invalid argument in function {name}: {message}")]
    InvalidArgument { name: String, message: String },
    #[error("Cannot convert {0} to a number")]
    NotNumeric(String),
}

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Number(f64),
    Str(String),
    Ident(String),
    Op(char),
    End,
}

#[derive(Debug, Clone, PartialEq)]
struct Token {
    kind: TokenKind,
    text: String,
    pos: usize,
}

// Returns the unescaped contents and the byte length consumed, quotes included.
fn lex_string(input: &str, quote: char) -> Option<(String, usize)> {
    let mut out = String::new();
    let mut chars = input.char_indices().skip(1);
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => {
                let (_, escaped) = chars.next()?;
                out.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    other => other,
                });
            }
            c if c == quote => return Some((out, i + c.len_utf8())),
            c => out.push(c),
        }
    }
    None
}

fn tokenize(src: &str) -> Result<Vec<Token>, ExprError> {
    let mut tokens = Vec::new();
    let mut offset = 0;
    // 1-based character position of `offset`
    let mut pos = 1;

    loop {
        let rest = &src[offset..];
        let trimmed = rest.trim_start();
        pos += rest[..rest.len() - trimmed.len()].chars().count();
        offset += rest.len() - trimmed.len();
        let Some(first) = trimmed.chars().next() else {
            break;
        };

        let (kind, len) = if first == '"' || first == '\'' {
            let (text, len) =
                lex_string(trimmed, first).ok_or(ExprError::UnterminatedString(pos))?;
            (TokenKind::Str(text), len)
        } else {
            let Some(caps) = TOKEN_REGEX.captures(trimmed) else {
                return Err(ExprError::UnexpectedChar { ch: first, pos });
            };
            let kind = if let Some(num) = caps.name("num") {
                let value = num
                    .as_str()
                    .parse::<f64>()
                    .map_err(|_| ExprError::UnexpectedToken {
                        token: num.as_str().to_string(),
                        pos,
                    })?;
                TokenKind::Number(value)
            } else if let Some(ident) = caps.name("ident") {
                TokenKind::Ident(ident.as_str().to_string())
            } else {
                TokenKind::Op(first)
            };
            (kind, caps[0].len())
        };
        let text = trimmed[..len].to_string();
        let next = pos + text.chars().count();
        tokens.push(Token { kind, text, pos });
        offset += len;
        pos = next;
    }

    tokens.push(Token {
        kind: TokenKind::End,
        text: String::new(),
        pos,
    });
    Ok(tokens)
}

/// Deepest nesting a formula may have, counting parentheses, signs, powers and
/// calls while parsing as well as the height of the parsed tree.
pub const MAX_DEPTH: usize = 256;

const MAX_ROUND_DIGITS: f64 = 15.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Plus,
    Minus,
}

impl UnaryOperator {
    fn from_char(c: char) -> Option<Self> {
        match c {
            '+' => Some(UnaryOperator::Plus),
            '-' => Some(UnaryOperator::Minus),
            _ => None,
        }
    }

    fn apply(self, value: f64) -> f64 {
        match self {
            UnaryOperator::Plus => value,
            UnaryOperator::Minus => -value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Power,
}

impl Operator {
    fn additive(c: char) -> Option<Self> {
        match c {
            '+' => Some(Operator::Add),
            '-' => Some(Operator::Subtract),
            _ => None,
        }
    }

    fn multiplicative(c: char) -> Option<Self> {
        match c {
            '*' => Some(Operator::Multiply),
            '/' => Some(Operator::Divide),
            '%' => Some(Operator::Modulo),
            _ => None,
        }
    }

    fn apply(self, lhs: f64, rhs: f64) -> f64 {
        match self {
            Operator::Add => lhs + rhs,
            Operator::Subtract => lhs - rhs,
            Operator::Multiply => lhs * rhs,
            Operator::Divide => lhs / rhs,
            Operator::Modulo => modulo(lhs, rhs),
            Operator::Power => lhs.powf(rhs),
        }
    }
}

/// Parsed formula.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Text(String),
    Bool(bool),
    Symbol(String),
    Unary {
        operator: UnaryOperator,
        operand: Box<Expr>,
    },
    Arithmetic {
        lhs: Box<Expr>,
        operator: Operator,
        rhs: Box<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
}

// A parsed node and the height of its tree.
type Parsed = Result<(Expr, usize), ExprError>;

struct Parser {
    tokens: Vec<Token>,
    index: usize,
    nesting: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        // tokenize always terminates the list with End
        &self.tokens[self.index.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.index < self.tokens.len() - 1 {
            self.index += 1;
        }
        token
    }

    fn peek_op(&self) -> Option<char> {
        match self.peek().kind {
            TokenKind::Op(c) => Some(c),
            _ => None,
        }
    }

    fn unexpected(token: &Token) -> ExprError {
        match token.kind {
            TokenKind::End => ExprError::UnexpectedEnd(token.pos),
            _ => ExprError::UnexpectedToken {
                token: token.text.clone(),
                pos: token.pos,
            },
        }
    }

    fn enter(&mut self, pos: usize) -> Result<(), ExprError> {
        self.nesting += 1;
        if self.nesting > MAX_DEPTH {
            return Err(ExprError::TooDeep(pos));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.nesting -= 1;
    }

    fn node(expr: Expr, height: usize, pos: usize) -> Parsed {
        if height > MAX_DEPTH {
            return Err(ExprError::TooDeep(pos));
        }
        Ok((expr, height))
    }

    fn binary(lhs: (Expr, usize), operator: Operator, rhs: (Expr, usize), pos: usize) -> Parsed {
        let height = lhs.1.max(rhs.1) + 1;
        let expr = Expr::Arithmetic {
            lhs: Box::new(lhs.0),
            operator,
            rhs: Box::new(rhs.0),
        };
        Self::node(expr, height, pos)
    }

    fn parse_additive(&mut self) -> Parsed {
        let mut lhs = self.parse_multiplicative()?;
        while let Some(operator) = self.peek_op().and_then(Operator::additive) {
            let pos = self.advance().pos;
            let rhs = self.parse_multiplicative()?;
            lhs = Self::binary(lhs, operator, rhs, pos)?;
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Parsed {
        let mut lhs = self.parse_unary()?;
        while let Some(operator) = self.peek_op().and_then(Operator::multiplicative) {
            let pos = self.advance().pos;
            let rhs = self.parse_unary()?;
            lhs = Self::binary(lhs, operator, rhs, pos)?;
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Parsed {
        if let Some(operator) = self.peek_op().and_then(UnaryOperator::from_char) {
            let pos = self.advance().pos;
            self.enter(pos)?;
            let (operand, height) = self.parse_unary()?;
            self.leave();
            let expr = Expr::Unary {
                operator,
                operand: Box::new(operand),
            };
            return Self::node(expr, height + 1, pos);
        }
        self.parse_power()
    }

    // `^` is right associative and binds tighter than a leading minus: -2^2 == -4
    fn parse_power(&mut self) -> Parsed {
        let base = self.parse_primary()?;
        if self.peek_op() == Some('^') {
            let pos = self.advance().pos;
            self.enter(pos)?;
            let exponent = self.parse_unary()?;
            self.leave();
            return Self::binary(base, Operator::Power, exponent, pos);
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Parsed {
        let token = self.advance();
        match token.kind {
            TokenKind::Number(n) => Ok((Expr::Number(n), 1)),
            TokenKind::Str(s) => Ok((Expr::Text(s), 1)),
            TokenKind::Ident(name) => {
                if self.peek_op() == Some('(') {
                    self.advance();
                    self.enter(token.pos)?;
                    let args = self.parse_args()?;
                    self.leave();
                    let height = args.iter().map(|(_, h)| *h).max().unwrap_or(0) + 1;
                    let args = args.into_iter().map(|(arg, _)| arg).collect();
                    return Self::node(Expr::Call { name, args }, height, token.pos);
                }
                let expr = match name.as_str() {
                    "true" => Expr::Bool(true),
                    "false" => Expr::Bool(false),
                    _ => Expr::Symbol(name),
                };
                Ok((expr, 1))
            }
            TokenKind::Op('(') => {
                self.enter(token.pos)?;
                let inner = self.parse_additive()?;
                self.expect_close()?;
                self.leave();
                Ok(inner)
            }
            _ => Err(Self::unexpected(&token)),
        }
    }

    fn parse_args(&mut self) -> Result<Vec<(Expr, usize)>, ExprError> {
        let mut args = Vec::new();
        if self.peek_op() == Some(')') {
            self.advance();
            return Ok(args);
        }
        loop {
            args.push(self.parse_additive()?);
            match self.peek_op() {
                Some(',') => {
                    self.advance();
                }
                _ => {
                    self.expect_close()?;
                    return Ok(args);
                }
            }
        }
    }

    fn expect_close(&mut self) -> Result<(), ExprError> {
        if self.peek_op() == Some(')') {
            self.advance();
            return Ok(());
        }
        let token = self.peek();
        match token.kind {
            TokenKind::End => Err(ExprError::MissingParen(token.pos)),
            _ => Err(Self::unexpected(token)),
        }
    }
}

/// Parses a formula into an [`Expr`].
///
/// Formulas nested deeper than [`MAX_DEPTH`] are rejected with
/// [`ExprError::TooDeep`], which keeps parsing and evaluation within a
/// bounded stack.
pub fn parse(src: &str) -> Result<Expr, ExprError> {
    let tokens = tokenize(src)?;
    let mut parser = Parser {
        tokens,
        index: 0,
        nesting: 0,
    };
    let (expr, _) = parser.parse_additive()?;
    let trailing = parser.peek();
    if trailing.kind != TokenKind::End {
        return Err(Parser::unexpected(trailing));
    }
    Ok(expr)
}

/// Parses and evaluates a formula in one step.
pub fn evaluate(src: &str, scope: &DimensionContext) -> Result<DimensionValue, ExprError> {
    parse(src)?.eval(scope)
}

/// Value of a built-in constant.
pub fn constant(name: &str) -> Option<f64> {
    match name {
        "pi" | "PI" => Some(consts::PI),
        "e" | "E" => Some(consts::E),
        "tau" => Some(consts::TAU),
        "phi" => Some(1.618_033_988_749_895),
        "Infinity" => Some(f64::INFINITY),
        "NaN" => Some(f64::NAN),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Function {
    Abs,
    Sqrt,
    Cbrt,
    Exp,
    Log,
    Log2,
    Log10,
    Floor,
    Ceil,
    Fix,
    Sign,
    Round,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Atan2,
    Pow,
    Mod,
    Min,
    Max,
    Hypot,
}

impl Function {
    fn from_name(name: &str) -> Option<Self> {
        let function = match name {
            "abs" => Function::Abs,
            "sqrt" => Function::Sqrt,
            "cbrt" => Function::Cbrt,
            "exp" => Function::Exp,
            "log" => Function::Log,
            "log2" => Function::Log2,
            "log10" => Function::Log10,
            "floor" => Function::Floor,
            "ceil" => Function::Ceil,
            "fix" => Function::Fix,
            "sign" => Function::Sign,
            "round" => Function::Round,
            "sin" => Function::Sin,
            "cos" => Function::Cos,
            "tan" => Function::Tan,
            "asin" => Function::Asin,
            "acos" => Function::Acos,
            "atan" => Function::Atan,
            "atan2" => Function::Atan2,
            "pow" => Function::Pow,
            "mod" => Function::Mod,
            "min" => Function::Min,
            "max" => Function::Max,
            "hypot" => Function::Hypot,
            _ => return None,
        };
        Some(function)
    }

    // (min, max) argument counts; None as max means variadic.
    fn arity(self) -> (usize, Option<usize>) {
        match self {
            Function::Log | Function::Round => (1, Some(2)),
            Function::Atan2 | Function::Pow | Function::Mod => (2, Some(2)),
            Function::Min | Function::Max | Function::Hypot => (1, None),
            Function::Abs
            | Function::Sqrt
            | Function::Cbrt
            | Function::Exp
            | Function::Log2
            | Function::Log10
            | Function::Floor
            | Function::Ceil
            | Function::Fix
            | Function::Sign
            | Function::Sin
            | Function::Cos
            | Function::Tan
            | Function::Asin
            | Function::Acos
            | Function::Atan => (1, Some(1)),
        }
    }

    // Argument counts have already been checked against `arity`.
    fn apply(self, name: &str, args: &[f64]) -> Result<f64, ExprError> {
        let x = args.first().copied().unwrap_or(f64::NAN);
        let y = args.get(1).copied();
        let value = match self {
            Function::Abs => x.abs(),
            Function::Sqrt => x.sqrt(),
            Function::Cbrt => x.cbrt(),
            Function::Exp => x.exp(),
            Function::Log => match y {
                Some(base) => x.ln() / base.ln(),
                None => x.ln(),
            },
            Function::Log2 => x.log2(),
            Function::Log10 => x.log10(),
            Function::Floor => x.floor(),
            Function::Ceil => x.ceil(),
            Function::Fix => x.trunc(),
            Function::Sign => {
                if x == 0.0 || x.is_nan() {
                    x
                } else {
                    x.signum()
                }
            }
            Function::Round => match y {
                Some(digits) => {
                    if digits.fract() != 0.0 || !(0.0..=MAX_ROUND_DIGITS).contains(&digits) {
                        return Err(ExprError::InvalidArgument {
                            name: name.to_string(),
                            message: format!(
                                "digits must be an integer between 0 and {MAX_ROUND_DIGITS}, got {digits}"
                            ),
                        });
                    }
                    let factor = 10f64.powi(digits as i32);
                    (x * factor).round() / factor
                }
                None => x.round(),
            },
            Function::Sin => x.sin(),
            Function::Cos => x.cos(),
            Function::Tan => x.tan(),
            Function::Asin => x.asin(),
            Function::Acos => x.acos(),
            Function::Atan => x.atan(),
            Function::Atan2 => x.atan2(y.unwrap_or(f64::NAN)),
            Function::Pow => x.powf(y.unwrap_or(f64::NAN)),
            Function::Mod => modulo(x, y.unwrap_or(f64::NAN)),
            Function::Min => args.iter().copied().fold(f64::INFINITY, f64::min),
            Function::Max => args.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Function::Hypot => args.iter().map(|a| a * a).sum::<f64>().sqrt(),
        };
        Ok(value)
    }
}

fn to_number(value: &DimensionValue) -> Result<f64, ExprError> {
    match value {
        DimensionValue::Number(n) => Ok(*n),
        DimensionValue::Boolean(b) => Ok(if *b { 1.0 } else { 0.0 }),
        DimensionValue::Text(s) => {
            let trimmed = s.trim();
            if NUMERIC_TEXT_REGEX.is_match(trimmed) {
                trimmed
                    .parse::<f64>()
                    .map_err(|_| ExprError::NotNumeric(format!("\"{s}\"")))
            } else {
                Err(ExprError::NotNumeric(format!("\"{s}\"")))
            }
        }
        DimensionValue::Date(_) => Err(ExprError::NotNumeric("date".to_string())),
    }
}

// Floored modulo; a zero divisor returns the dividend.
fn modulo(x: f64, y: f64) -> f64 {
    if y == 0.0 {
        return x;
    }
    x - y * (x / y).floor()
}

impl Expr {
    /// Evaluates the expression with `scope` as the variable bindings.
    pub fn eval(&self, scope: &DimensionContext) -> Result<DimensionValue, ExprError> {
        match self {
            Expr::Number(n) => Ok(DimensionValue::Number(*n)),
            Expr::Text(s) => Ok(DimensionValue::Text(s.clone())),
            Expr::Bool(b) => Ok(DimensionValue::Boolean(*b)),
            Expr::Symbol(name) => {
                if let Some(value) = scope.get(name) {
                    return Ok(value.clone());
                }
                constant(name)
                    .map(DimensionValue::Number)
                    .ok_or_else(|| ExprError::UndefinedSymbol(name.clone()))
            }
            Expr::Unary { operator, operand } => {
                let value = to_number(&operand.eval(scope)?)?;
                Ok(DimensionValue::Number(operator.apply(value)))
            }
            Expr::Arithmetic { lhs, operator, rhs } => {
                let lhs_val = to_number(&lhs.eval(scope)?)?;
                let rhs_val = to_number(&rhs.eval(scope)?)?;
                Ok(DimensionValue::Number(operator.apply(lhs_val, rhs_val)))
            }
            Expr::Call { name, args } => {
                let function = Function::from_name(name)
                    .ok_or_else(|| ExprError::UndefinedFunction(name.clone()))?;
                let (min, max) = function.arity();
                if args.len() < min || max.is_some_and(|m| args.len() > m) {
                    let expected = match max {
                        Some(m) if m == min => min.to_string(),
                        Some(m) => format!("{min}-{m}"),
                        None => format!("at least {min}"),
                    };
                    return Err(ExprError::WrongArity {
                        name: name.clone(),
                        provided: args.len(),
                        expected,
                    });
                }
                let values = args
                    .iter()
                    .map(|arg| arg.eval(scope).and_then(|v| to_number(&v)))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(DimensionValue::Number(function.apply(name, &values)?))
            }
        }
    }

    /// Identifiers referenced by the expression, in first-use order, without
    /// function names.
    pub fn variables(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_variables(&mut out);
        out
    }

    fn collect_variables(&self, out: &mut Vec<String>) {
        match self {
            Expr::Symbol(name) => {
                if !out.contains(name) {
                    out.push(name.clone());
                }
            }
            Expr::Unary { operand, .. } => operand.collect_variables(out),
            Expr::Arithmetic { lhs, rhs, .. } => {
                lhs.collect_variables(out);
                rhs.collect_variables(out);
            }
            Expr::Call { args, .. } => args.iter().for_each(|a| a.collect_variables(out)),
            Expr::Number(_) | Expr::Text(_) | Expr::Bool(_) => {}
        }
    }
}

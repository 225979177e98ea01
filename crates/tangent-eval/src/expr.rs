//! Expression compiler for differentiable functions given as text.
//!
//! Supports arithmetic (+, -, *, /), powers (`^` or `**`, right-associative
//! and binding tighter than unary minus), parentheses, decimal and
//! scientific literals, the elementary functions of
//! [`tangent_ad::functions`] plus `pow(a, b)` and `log_base(x[, b])`.
//!
//! Text compiles to a flat postfix program that evaluates over [`Value`] on
//! an explicit operand stack, so the same program runs in forward mode,
//! reverse mode or on plain constants, and long operator chains never
//! deepen the call stack.

use std::ops::RangeInclusive;

use tangent_ad::{Elementary, Value, functions};
use tangent_core::{Error, Result};

/// Nesting limit for parentheses, unary operators, powers and calls.
const MAX_DEPTH: usize = 256;

/// Base used by `log_base(x)` when none is given.
const DEFAULT_LOG_BASE: f64 = 10.0;

// ── Program ────────────────────────────────────────────────────

/// One postfix instruction.
#[derive(Debug, Clone, Copy)]
enum Op {
    Number(f64),
    Var(usize), // index into identifiers
    Neg,
    Bin(BinOp),
    Call(Func),
}

#[derive(Debug, Clone, Copy)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

#[derive(Debug, Clone, Copy)]
enum Func {
    Elementary(Elementary),
    Pow,
    LogBase,
}

impl Func {
    fn resolve(name: &str) -> Option<Self> {
        match name {
            "pow" => Some(Func::Pow),
            "log_base" | "logb" => Some(Func::LogBase),
            _ => Elementary::from_name(name).map(Func::Elementary),
        }
    }

    /// Accepted argument counts.
    fn arity(self) -> RangeInclusive<usize> {
        match self {
            Func::Elementary(_) => 1..=1,
            Func::Pow => 2..=2,
            Func::LogBase => 1..=2,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Func::Elementary(f) => f.name(),
            Func::Pow => "pow",
            Func::LogBase => "log_base",
        }
    }
}

/// Every callable name the compiler accepts, aliases excluded.
pub fn function_names() -> Vec<&'static str> {
    Elementary::ALL.iter().map(|f| f.name()).chain(["pow", "log_base"]).collect()
}

// ── Compiled expression ────────────────────────────────────────

/// A compiled expression ready for evaluation.
#[derive(Debug, Clone)]
pub struct CompiledExpr {
    source: String,
    code: Vec<Op>,
    /// Identifiers referenced by this expression (ordered by first occurrence).
    pub identifiers: Vec<String>,
}

impl CompiledExpr {
    /// Parse and compile an expression string.
    pub fn compile(input: &str) -> Result<Self> {
        let tokens = tokenize(input)?;
        if tokens.is_empty() {
            return Err(Error::Expression("empty expression".into()));
        }
        let mut parser = Parser::new(&tokens);
        parser.parse_add()?;
        if parser.pos < parser.tokens.len() {
            return Err(Error::Expression(format!(
                "unexpected token after expression: {:?}",
                parser.tokens[parser.pos]
            )));
        }
        let Parser { code, identifiers, .. } = parser;
        Ok(CompiledExpr { source: input.to_string(), code, identifiers })
    }

    /// The text this expression was compiled from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate with `args` bound to [`identifiers`](Self::identifiers),
    /// position by position.
    pub fn eval(&self, args: &[Value]) -> Result<Value> {
        if args.len() != self.identifiers.len() {
            return Err(Error::Validation(format!(
                "expression '{}' references {} identifiers but {} values were bound",
                self.source,
                self.identifiers.len(),
                args.len()
            )));
        }
        run(&self.code, args)
    }

    /// Evaluate on plain reals (no derivative information).
    pub fn eval_real(&self, values: &[f64]) -> Result<f64> {
        let args: Vec<Value> = values.iter().copied().map(Value::Constant).collect();
        self.eval(&args).map(|v| v.value())
    }
}

// ── Evaluation ─────────────────────────────────────────────────

fn pop(stack: &mut Vec<Value>) -> Result<Value> {
    stack.pop().ok_or_else(|| Error::Expression("operand stack underflow".into()))
}

fn run(code: &[Op], args: &[Value]) -> Result<Value> {
    let mut stack: Vec<Value> = Vec::new();
    for op in code {
        let v = match *op {
            Op::Number(n) => Value::Constant(n),
            Op::Var(i) => args[i].clone(),
            Op::Neg => -pop(&mut stack)?,
            Op::Bin(op) => {
                let rhs = pop(&mut stack)?;
                let lhs = pop(&mut stack)?;
                match op {
                    BinOp::Add => lhs.try_add(&rhs)?,
                    BinOp::Sub => lhs.try_sub(&rhs)?,
                    BinOp::Mul => lhs.try_mul(&rhs)?,
                    BinOp::Div => lhs.try_div(&rhs)?,
                    BinOp::Pow => lhs.try_pow(&rhs)?,
                }
            }
            Op::Call(Func::Elementary(el)) => el.apply(&pop(&mut stack)?)?,
            Op::Call(Func::Pow) => {
                let exponent = pop(&mut stack)?;
                pop(&mut stack)?.try_pow(&exponent)?
            }
            Op::Call(Func::LogBase) => {
                let base = match pop(&mut stack)? {
                    Value::Constant(base) => base,
                    other => {
                        return Err(Error::TypeKind(format!(
                            "log_base needs a constant base, got a {} operand",
                            other.kind()
                        )));
                    }
                };
                functions::log_base(&pop(&mut stack)?, base)?
            }
        };
        stack.push(v);
    }
    let out = pop(&mut stack)?;
    if !stack.is_empty() {
        return Err(Error::Expression(format!("{} operands left on the stack", stack.len())));
    }
    Ok(out)
}

// ── Tokenizer ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
    Comma,
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let bytes = input.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];

        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        if c == b'*' && bytes.get(i + 1) == Some(&b'*') {
            tokens.push(Token::Caret);
            i += 2;
            continue;
        }

        let single = match c {
            b'+' => Some(Token::Plus),
            b'-' => Some(Token::Minus),
            b'*' => Some(Token::Star),
            b'/' => Some(Token::Slash),
            b'^' => Some(Token::Caret),
            b'(' => Some(Token::LParen),
            b')' => Some(Token::RParen),
            b',' => Some(Token::Comma),
            _ => None,
        };
        if let Some(t) = single {
            tokens.push(t);
            i += 1;
            continue;
        }

        if c.is_ascii_digit() || c == b'.' {
            let start = i;
            while i < bytes.len()
                && (bytes[i].is_ascii_digit()
                    || bytes[i] == b'.'
                    || ((bytes[i] == b'e' || bytes[i] == b'E') && exponent_follows(bytes, i))
                    || ((bytes[i] == b'+' || bytes[i] == b'-')
                        && i > start
                        && (bytes[i - 1] == b'e' || bytes[i - 1] == b'E')))
            {
                i += 1;
            }
            let s = &input[start..i];
            let n: f64 =
                s.parse().map_err(|_| Error::Expression(format!("invalid number: '{s}'")))?;
            tokens.push(Token::Num(n));
        } else if c.is_ascii_alphabetic() || c == b'_' {
            let start = i;
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            tokens.push(Token::Ident(input[start..i].to_string()));
        } else {
            let ch = input[i..].chars().next().unwrap_or('?');
            return Err(Error::Expression(format!("unexpected character: '{ch}'")));
        }
    }

    Ok(tokens)
}

/// `bytes[i]` is `e`/`E`: it starts an exponent only if a digit follows,
/// optionally after a sign. Otherwise `2e` in `2*e` style input stays a
/// number followed by an identifier.
fn exponent_follows(bytes: &[u8], i: usize) -> bool {
    match bytes.get(i + 1) {
        Some(b) if b.is_ascii_digit() => true,
        Some(b'+' | b'-') => bytes.get(i + 2).is_some_and(u8::is_ascii_digit),
        _ => false,
    }
}

// ── Parser (recursive descent) ─────────────────────────────────

/// Emits postfix code while it parses; operator chains are loops, only
/// nesting recurses.
struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    depth: usize,
    code: Vec<Op>,
    identifiers: Vec<String>,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, pos: 0, depth: 0, code: Vec::new(), identifiers: Vec::new() }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&Token> {
        let t = self.tokens.get(self.pos);
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, expected: &Token) -> Result<()> {
        match self.advance() {
            Some(t) if t == expected => Ok(()),
            other => Err(Error::Expression(format!("expected {expected:?}, got {other:?}"))),
        }
    }

    fn enter(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(Error::Expression(format!("expression nested deeper than {MAX_DEPTH}")));
        }
        Ok(())
    }

    fn resolve_var(&mut self, name: &str) -> usize {
        if let Some(i) = self.identifiers.iter().position(|b| b == name) {
            i
        } else {
            self.identifiers.push(name.to_string());
            self.identifiers.len() - 1
        }
    }

    // ── Grammar rules ──────────────────────────────────────────

    fn parse_add(&mut self) -> Result<()> {
        self.parse_mul()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => break,
            };
            self.advance();
            self.parse_mul()?;
            self.code.push(Op::Bin(op));
        }
        Ok(())
    }

    fn parse_mul(&mut self) -> Result<()> {
        self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                _ => break,
            };
            self.advance();
            self.parse_unary()?;
            self.code.push(Op::Bin(op));
        }
        Ok(())
    }

    fn parse_unary(&mut self) -> Result<()> {
        self.enter()?;
        match self.peek() {
            Some(Token::Minus) => {
                self.advance();
                self.parse_unary()?;
                self.code.push(Op::Neg);
            }
            Some(Token::Plus) => {
                self.advance();
                self.parse_unary()?;
            }
            _ => self.parse_power()?,
        }
        self.depth -= 1;
        Ok(())
    }

    /// `atom (^ unary)?`; recursing through `parse_unary` makes `^`
    /// right-associative and admits `2^-x`.
    fn parse_power(&mut self) -> Result<()> {
        self.parse_atom()?;
        if matches!(self.peek(), Some(Token::Caret)) {
            self.advance();
            self.parse_unary()?;
            self.code.push(Op::Bin(BinOp::Pow));
        }
        Ok(())
    }

    fn parse_atom(&mut self) -> Result<()> {
        match self.advance().cloned() {
            Some(Token::Num(n)) => self.code.push(Op::Number(n)),
            Some(Token::LParen) => {
                self.enter()?;
                self.parse_add()?;
                self.expect(&Token::RParen)?;
                self.depth -= 1;
            }
            Some(Token::Ident(name)) => {
                if matches!(self.peek(), Some(Token::LParen)) {
                    self.advance(); // consume '('
                    let func = Func::resolve(&name).ok_or_else(|| {
                        Error::Expression(format!("unknown function: '{name}'"))
                    })?;
                    self.parse_call(func)?;
                } else {
                    let i = self.resolve_var(&name);
                    self.code.push(Op::Var(i));
                }
            }
            other => {
                return Err(Error::Expression(format!(
                    "expected number, identifier, or '(', got {other:?}"
                )));
            }
        }
        Ok(())
    }

    /// Arguments after the opening parenthesis, then the call itself.
    fn parse_call(&mut self, func: Func) -> Result<()> {
        self.enter()?;
        self.parse_add()?;
        let mut nargs = 1;
        while matches!(self.peek(), Some(Token::Comma)) {
            self.advance();
            self.parse_add()?;
            nargs += 1;
        }
        self.expect(&Token::RParen)?;
        self.depth -= 1;

        let arity = func.arity();
        if !arity.contains(&nargs) {
            let expected = if arity.start() == arity.end() {
                arity.start().to_string()
            } else {
                format!("{} to {}", arity.start(), arity.end())
            };
            return Err(Error::Expression(format!(
                "function '{}' takes {expected} argument(s), got {nargs}",
                func.name()
            )));
        }
        if matches!(func, Func::LogBase) && nargs == 1 {
            self.code.push(Op::Number(DEFAULT_LOG_BASE));
        }
        self.code.push(Op::Call(func));
        Ok(())
    }
}

// ── Tests ──────────────────────────────────────────────────────

//! The built-in bounded script interpreter
//!
//! A small statement/expression language over JSON values. Scripts receive
//! their context as ordinary variables (`data`, `previous`, `entityName`,
//! ...) and produce a value with `return`. There are no I/O, process, or
//! global facilities in the language, so the deny-list is structural.
//!
//! Budget enforcement: every statement and expression evaluation ticks a
//! step counter and checks the wall-clock deadline; the value-size ceiling
//! is checked wherever a value is produced (bindings, assignments,
//! object/array construction, string concatenation), not just on return,
//! so a script cannot materialize unbounded memory mid-run.
//!
//! ```text
//! let bonus = 10;
//! if (data.age >= 65) { bonus = bonus * 2; }
//! data.bonus = bonus;
//! return data;
//! ```

use crate::engine::{HookVars, ScriptEngine, ScriptError};
use loam_core::{LifecycleEvent, Limits};
use serde_json::{Number, Value};
use std::collections::HashMap;
use std::time::Instant;

// =============================================================================
// Lexer
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    // Keywords
    Let,
    If,
    Else,
    Return,
    True,
    False,
    Null,
    // Punctuation
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Colon,
    Semi,
    Dot,
    Assign,
    // Operators
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Lexer {
            chars: source.char_indices().peekable(),
        }
    }

    fn tokenize(mut self) -> Result<Vec<(usize, Tok)>, ScriptError> {
        let mut tokens = Vec::new();
        while let Some(&(offset, c)) = self.chars.peek() {
            match c {
                ' ' | '\t' | '\r' | '\n' => {
                    self.chars.next();
                }
                '/' => {
                    self.chars.next();
                    if matches!(self.chars.peek(), Some((_, '/'))) {
                        // Line comment
                        for (_, c) in self.chars.by_ref() {
                            if c == '\n' {
                                break;
                            }
                        }
                    } else {
                        tokens.push((offset, Tok::Slash));
                    }
                }
                '(' => tokens.push((offset, self.single(Tok::LParen))),
                ')' => tokens.push((offset, self.single(Tok::RParen))),
                '{' => tokens.push((offset, self.single(Tok::LBrace))),
                '}' => tokens.push((offset, self.single(Tok::RBrace))),
                '[' => tokens.push((offset, self.single(Tok::LBracket))),
                ']' => tokens.push((offset, self.single(Tok::RBracket))),
                ',' => tokens.push((offset, self.single(Tok::Comma))),
                ':' => tokens.push((offset, self.single(Tok::Colon))),
                ';' => tokens.push((offset, self.single(Tok::Semi))),
                '.' => tokens.push((offset, self.single(Tok::Dot))),
                '+' => tokens.push((offset, self.single(Tok::Plus))),
                '-' => tokens.push((offset, self.single(Tok::Minus))),
                '*' => tokens.push((offset, self.single(Tok::Star))),
                '%' => tokens.push((offset, self.single(Tok::Percent))),
                '=' => {
                    self.chars.next();
                    if matches!(self.chars.peek(), Some((_, '='))) {
                        self.chars.next();
                        tokens.push((offset, Tok::Eq));
                    } else {
                        tokens.push((offset, Tok::Assign));
                    }
                }
                '!' => {
                    self.chars.next();
                    if matches!(self.chars.peek(), Some((_, '='))) {
                        self.chars.next();
                        tokens.push((offset, Tok::Ne));
                    } else {
                        tokens.push((offset, Tok::Bang));
                    }
                }
                '<' => {
                    self.chars.next();
                    if matches!(self.chars.peek(), Some((_, '='))) {
                        self.chars.next();
                        tokens.push((offset, Tok::Le));
                    } else {
                        tokens.push((offset, Tok::Lt));
                    }
                }
                '>' => {
                    self.chars.next();
                    if matches!(self.chars.peek(), Some((_, '='))) {
                        self.chars.next();
                        tokens.push((offset, Tok::Ge));
                    } else {
                        tokens.push((offset, Tok::Gt));
                    }
                }
                '&' => {
                    self.chars.next();
                    match self.chars.peek() {
                        Some((_, '&')) => {
                            self.chars.next();
                            tokens.push((offset, Tok::And));
                        }
                        _ => return Err(err_at(offset, "expected '&&'")),
                    }
                }
                '|' => {
                    self.chars.next();
                    match self.chars.peek() {
                        Some((_, '|')) => {
                            self.chars.next();
                            tokens.push((offset, Tok::Or));
                        }
                        _ => return Err(err_at(offset, "expected '||'")),
                    }
                }
                '"' | '\'' => {
                    let quote = c;
                    self.chars.next();
                    let mut s = String::new();
                    let mut closed = false;
                    while let Some((_, c)) = self.chars.next() {
                        if c == quote {
                            closed = true;
                            break;
                        }
                        if c == '\\' {
                            match self.chars.next() {
                                Some((_, 'n')) => s.push('\n'),
                                Some((_, 't')) => s.push('\t'),
                                Some((_, other)) => s.push(other),
                                None => break,
                            }
                        } else {
                            s.push(c);
                        }
                    }
                    if !closed {
                        return Err(err_at(offset, "unterminated string literal"));
                    }
                    tokens.push((offset, Tok::Str(s)));
                }
                c if c.is_ascii_digit() => {
                    let mut text = String::new();
                    let mut is_float = false;
                    while let Some(&(_, c)) = self.chars.peek() {
                        if c.is_ascii_digit() {
                            text.push(c);
                            self.chars.next();
                        } else if c == '.' && !is_float {
                            // Lookahead: `1.x` is field access on a number,
                            // which the parser rejects; only consume the dot
                            // when a digit follows.
                            let mut probe = self.chars.clone();
                            probe.next();
                            match probe.peek() {
                                Some((_, d)) if d.is_ascii_digit() => {
                                    is_float = true;
                                    text.push('.');
                                    self.chars.next();
                                }
                                _ => break,
                            }
                        } else {
                            break;
                        }
                    }
                    let tok = if is_float {
                        Tok::Float(
                            text.parse::<f64>()
                                .map_err(|_| err_at(offset, "bad number literal"))?,
                        )
                    } else {
                        Tok::Int(
                            text.parse::<i64>()
                                .map_err(|_| err_at(offset, "bad number literal"))?,
                        )
                    };
                    tokens.push((offset, tok));
                }
                c if c.is_alphabetic() || c == '_' => {
                    let mut name = String::new();
                    while let Some(&(_, c)) = self.chars.peek() {
                        if c.is_alphanumeric() || c == '_' {
                            name.push(c);
                            self.chars.next();
                        } else {
                            break;
                        }
                    }
                    let tok = match name.as_str() {
                        "let" => Tok::Let,
                        "if" => Tok::If,
                        "else" => Tok::Else,
                        "return" => Tok::Return,
                        "true" => Tok::True,
                        "false" => Tok::False,
                        "null" => Tok::Null,
                        _ => Tok::Ident(name),
                    };
                    tokens.push((offset, tok));
                }
                other => return Err(err_at(offset, format!("unexpected character '{other}'"))),
            }
        }
        Ok(tokens)
    }

    fn single(&mut self, tok: Tok) -> Tok {
        self.chars.next();
        tok
    }
}

fn err_at(offset: usize, message: impl Into<String>) -> ScriptError {
    ScriptError::Parse {
        offset,
        message: message.into(),
    }
}

// =============================================================================
// AST and parser
// =============================================================================

#[derive(Debug, Clone)]
enum Stmt {
    Let(String, Expr),
    Assign(String, Vec<Access>, Expr),
    If(Expr, Vec<Stmt>, Vec<Stmt>),
    Return(Option<Expr>),
    Expr(Expr),
}

#[derive(Debug, Clone)]
enum Access {
    Key(String),
    Index(Expr),
}

#[derive(Debug, Clone)]
enum Expr {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Var(String),
    Field(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Neg(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Object(Vec<(String, Expr)>),
    Array(Vec<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinOp {
    Or,
    And,
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
    Mod,
}

struct Parser {
    tokens: Vec<(usize, Tok)>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<(usize, Tok)>) -> Self {
        Parser { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|(o, _)| *o)
            .unwrap_or(0)
    }

    fn advance(&mut self) -> Option<Tok> {
        let tok = self.tokens.get(self.pos).map(|(_, t)| t.clone());
        self.pos += 1;
        tok
    }

    fn expect(&mut self, expected: Tok) -> Result<(), ScriptError> {
        let offset = self.offset();
        match self.advance() {
            Some(tok) if tok == expected => Ok(()),
            other => Err(err_at(
                offset,
                format!("expected {expected:?}, found {other:?}"),
            )),
        }
    }

    fn program(&mut self) -> Result<Vec<Stmt>, ScriptError> {
        let mut stmts = Vec::new();
        while self.peek().is_some() {
            stmts.push(self.statement()?);
        }
        Ok(stmts)
    }

    fn statement(&mut self) -> Result<Stmt, ScriptError> {
        match self.peek() {
            Some(Tok::Let) => {
                self.advance();
                let offset = self.offset();
                let name = match self.advance() {
                    Some(Tok::Ident(name)) => name,
                    other => return Err(err_at(offset, format!("expected name, found {other:?}"))),
                };
                self.expect(Tok::Assign)?;
                let value = self.expression()?;
                self.expect(Tok::Semi)?;
                Ok(Stmt::Let(name, value))
            }
            Some(Tok::If) => self.if_statement(),
            Some(Tok::Return) => {
                self.advance();
                if matches!(self.peek(), Some(Tok::Semi)) {
                    self.advance();
                    return Ok(Stmt::Return(None));
                }
                let value = self.expression()?;
                self.expect(Tok::Semi)?;
                Ok(Stmt::Return(Some(value)))
            }
            _ => {
                // Assignment (`target.path = expr;`) or bare expression.
                let checkpoint = self.pos;
                if let Some(stmt) = self.try_assignment()? {
                    return Ok(stmt);
                }
                self.pos = checkpoint;
                let expr = self.expression()?;
                self.expect(Tok::Semi)?;
                Ok(Stmt::Expr(expr))
            }
        }
    }

    fn if_statement(&mut self) -> Result<Stmt, ScriptError> {
        self.expect(Tok::If)?;
        self.expect(Tok::LParen)?;
        let cond = self.expression()?;
        self.expect(Tok::RParen)?;
        let then_block = self.block()?;
        let else_block = if matches!(self.peek(), Some(Tok::Else)) {
            self.advance();
            if matches!(self.peek(), Some(Tok::If)) {
                vec![self.if_statement()?]
            } else {
                self.block()?
            }
        } else {
            Vec::new()
        };
        Ok(Stmt::If(cond, then_block, else_block))
    }

    fn block(&mut self) -> Result<Vec<Stmt>, ScriptError> {
        self.expect(Tok::LBrace)?;
        let mut stmts = Vec::new();
        while !matches!(self.peek(), Some(Tok::RBrace)) {
            if self.peek().is_none() {
                return Err(err_at(self.offset(), "unterminated block"));
            }
            stmts.push(self.statement()?);
        }
        self.expect(Tok::RBrace)?;
        Ok(stmts)
    }

    /// Parse `name(.field | [expr])* = expr;` if that is what comes next
    fn try_assignment(&mut self) -> Result<Option<Stmt>, ScriptError> {
        let name = match self.peek() {
            Some(Tok::Ident(name)) => name.clone(),
            _ => return Ok(None),
        };
        self.advance();

        let mut accesses = Vec::new();
        loop {
            match self.peek() {
                Some(Tok::Dot) => {
                    self.advance();
                    let offset = self.offset();
                    match self.advance() {
                        Some(Tok::Ident(field)) => accesses.push(Access::Key(field)),
                        other => {
                            return Err(err_at(
                                offset,
                                format!("expected field name, found {other:?}"),
                            ))
                        }
                    }
                }
                Some(Tok::LBracket) => {
                    self.advance();
                    let index = self.expression()?;
                    self.expect(Tok::RBracket)?;
                    accesses.push(Access::Index(index));
                }
                Some(Tok::Assign) => {
                    self.advance();
                    let value = self.expression()?;
                    self.expect(Tok::Semi)?;
                    return Ok(Some(Stmt::Assign(name, accesses, value)));
                }
                _ => return Ok(None),
            }
        }
    }

    fn expression(&mut self) -> Result<Expr, ScriptError> {
        self.or_expr()
    }

    fn or_expr(&mut self) -> Result<Expr, ScriptError> {
        let mut left = self.and_expr()?;
        while matches!(self.peek(), Some(Tok::Or)) {
            self.advance();
            let right = self.and_expr()?;
            left = Expr::Binary(BinOp::Or, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr, ScriptError> {
        let mut left = self.equality()?;
        while matches!(self.peek(), Some(Tok::And)) {
            self.advance();
            let right = self.equality()?;
            left = Expr::Binary(BinOp::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn equality(&mut self) -> Result<Expr, ScriptError> {
        let mut left = self.comparison()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Eq) => BinOp::Eq,
                Some(Tok::Ne) => BinOp::Ne,
                _ => break,
            };
            self.advance();
            let right = self.comparison()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn comparison(&mut self) -> Result<Expr, ScriptError> {
        let mut left = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Lt) => BinOp::Lt,
                Some(Tok::Le) => BinOp::Le,
                Some(Tok::Gt) => BinOp::Gt,
                Some(Tok::Ge) => BinOp::Ge,
                _ => break,
            };
            self.advance();
            let right = self.term()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn term(&mut self) -> Result<Expr, ScriptError> {
        let mut left = self.factor()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Plus) => BinOp::Add,
                Some(Tok::Minus) => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.factor()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn factor(&mut self) -> Result<Expr, ScriptError> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Star) => BinOp::Mul,
                Some(Tok::Slash) => BinOp::Div,
                Some(Tok::Percent) => BinOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, ScriptError> {
        match self.peek() {
            Some(Tok::Bang) => {
                self.advance();
                Ok(Expr::Not(Box::new(self.unary()?)))
            }
            Some(Tok::Minus) => {
                self.advance();
                Ok(Expr::Neg(Box::new(self.unary()?)))
            }
            _ => self.postfix(),
        }
    }

    fn postfix(&mut self) -> Result<Expr, ScriptError> {
        let mut expr = self.primary()?;
        loop {
            match self.peek() {
                Some(Tok::Dot) => {
                    self.advance();
                    let offset = self.offset();
                    match self.advance() {
                        Some(Tok::Ident(field)) => {
                            expr = Expr::Field(Box::new(expr), field);
                        }
                        other => {
                            return Err(err_at(
                                offset,
                                format!("expected field name, found {other:?}"),
                            ))
                        }
                    }
                }
                Some(Tok::LBracket) => {
                    self.advance();
                    let index = self.expression()?;
                    self.expect(Tok::RBracket)?;
                    expr = Expr::Index(Box::new(expr), Box::new(index));
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn primary(&mut self) -> Result<Expr, ScriptError> {
        let offset = self.offset();
        match self.advance() {
            Some(Tok::Null) => Ok(Expr::Null),
            Some(Tok::True) => Ok(Expr::Bool(true)),
            Some(Tok::False) => Ok(Expr::Bool(false)),
            Some(Tok::Int(n)) => Ok(Expr::Int(n)),
            Some(Tok::Float(n)) => Ok(Expr::Float(n)),
            Some(Tok::Str(s)) => Ok(Expr::Str(s)),
            Some(Tok::Ident(name)) => Ok(Expr::Var(name)),
            Some(Tok::LParen) => {
                let expr = self.expression()?;
                self.expect(Tok::RParen)?;
                Ok(expr)
            }
            Some(Tok::LBrace) => {
                let mut fields = Vec::new();
                if !matches!(self.peek(), Some(Tok::RBrace)) {
                    loop {
                        let offset = self.offset();
                        let key = match self.advance() {
                            Some(Tok::Ident(name)) => name,
                            Some(Tok::Str(s)) => s,
                            other => {
                                return Err(err_at(
                                    offset,
                                    format!("expected object key, found {other:?}"),
                                ))
                            }
                        };
                        self.expect(Tok::Colon)?;
                        fields.push((key, self.expression()?));
                        if matches!(self.peek(), Some(Tok::Comma)) {
                            self.advance();
                        } else {
                            break;
                        }
                    }
                }
                self.expect(Tok::RBrace)?;
                Ok(Expr::Object(fields))
            }
            Some(Tok::LBracket) => {
                let mut items = Vec::new();
                if !matches!(self.peek(), Some(Tok::RBracket)) {
                    loop {
                        items.push(self.expression()?);
                        if matches!(self.peek(), Some(Tok::Comma)) {
                            self.advance();
                        } else {
                            break;
                        }
                    }
                }
                self.expect(Tok::RBracket)?;
                Ok(Expr::Array(items))
            }
            other => Err(err_at(offset, format!("unexpected token {other:?}"))),
        }
    }
}

// =============================================================================
// Evaluator
// =============================================================================

struct Budget {
    deadline: Instant,
    steps_left: u64,
}

impl Budget {
    fn tick(&mut self) -> Result<(), ScriptError> {
        if self.steps_left == 0 {
            return Err(ScriptError::StepBudgetExceeded);
        }
        self.steps_left -= 1;
        // Check the clock every 64 steps; one Instant::now per step would
        // dominate tiny scripts.
        if self.steps_left % 64 == 0 && Instant::now() > self.deadline {
            return Err(ScriptError::WallClockExceeded);
        }
        Ok(())
    }
}

enum Flow {
    Normal,
    Return(Option<Value>),
}

struct Interp {
    env: HashMap<String, Value>,
    budget: Budget,
    max_value_bytes: usize,
}

impl Interp {
    /// Value-size ceiling, applied at the point a value is produced
    fn bound(&self, value: Value) -> Result<Value, ScriptError> {
        if value_size(&value) > self.max_value_bytes {
            return Err(ScriptError::ValueTooLarge {
                limit: self.max_value_bytes,
            });
        }
        Ok(value)
    }

    fn exec_block(&mut self, stmts: &[Stmt]) -> Result<Flow, ScriptError> {
        for stmt in stmts {
            match self.exec(stmt)? {
                Flow::Normal => {}
                done => return Ok(done),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec(&mut self, stmt: &Stmt) -> Result<Flow, ScriptError> {
        self.budget.tick()?;
        match stmt {
            Stmt::Let(name, expr) => {
                let value = self.eval(expr)?;
                let value = self.bound(value)?;
                self.env.insert(name.clone(), value);
                Ok(Flow::Normal)
            }
            Stmt::Assign(name, accesses, expr) => {
                let value = self.eval(expr)?;
                let value = self.bound(value)?;
                if accesses.is_empty() {
                    if !self.env.contains_key(name) {
                        return Err(ScriptError::UndefinedVariable(name.clone()));
                    }
                    self.env.insert(name.clone(), value);
                    return Ok(Flow::Normal);
                }
                // Evaluate index expressions before borrowing the target.
                let mut resolved = Vec::with_capacity(accesses.len());
                for access in accesses {
                    match access {
                        Access::Key(k) => resolved.push(ResolvedAccess::Key(k.clone())),
                        Access::Index(e) => {
                            let idx = self.eval(e)?;
                            resolved.push(ResolvedAccess::from_value(idx)?);
                        }
                    }
                }
                let target = self
                    .env
                    .get_mut(name)
                    .ok_or_else(|| ScriptError::UndefinedVariable(name.clone()))?;
                assign_into(target, &resolved, value)?;
                Ok(Flow::Normal)
            }
            Stmt::If(cond, then_block, else_block) => {
                let cond = self.eval(cond)?;
                if truthy(&cond) {
                    self.exec_block(then_block)
                } else {
                    self.exec_block(else_block)
                }
            }
            Stmt::Return(expr) => {
                let value = match expr {
                    Some(e) => Some(self.eval(e)?),
                    None => None,
                };
                Ok(Flow::Return(value))
            }
            Stmt::Expr(expr) => {
                self.eval(expr)?;
                Ok(Flow::Normal)
            }
        }
    }

    fn eval(&mut self, expr: &Expr) -> Result<Value, ScriptError> {
        self.budget.tick()?;
        match expr {
            Expr::Null => Ok(Value::Null),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Int(n) => Ok(Value::Number(Number::from(*n))),
            Expr::Float(n) => Ok(Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null)),
            Expr::Str(s) => Ok(Value::String(s.clone())),
            Expr::Var(name) => self
                .env
                .get(name)
                .cloned()
                .ok_or_else(|| ScriptError::UndefinedVariable(name.clone())),
            Expr::Field(base, field) => {
                let base = self.eval(base)?;
                Ok(base
                    .as_object()
                    .and_then(|m| m.get(field))
                    .cloned()
                    .unwrap_or(Value::Null))
            }
            Expr::Index(base, index) => {
                let base = self.eval(base)?;
                let index = self.eval(index)?;
                let resolved = match &base {
                    Value::Array(items) => index
                        .as_u64()
                        .and_then(|i| items.get(i as usize))
                        .cloned(),
                    Value::Object(map) => index.as_str().and_then(|k| map.get(k)).cloned(),
                    _ => None,
                };
                Ok(resolved.unwrap_or(Value::Null))
            }
            Expr::Not(inner) => {
                let v = self.eval(inner)?;
                Ok(Value::Bool(!truthy(&v)))
            }
            Expr::Neg(inner) => {
                let v = self.eval(inner)?;
                if let Some(i) = v.as_i64() {
                    Ok(Value::Number(Number::from(-i)))
                } else if let Some(f) = v.as_f64() {
                    Ok(Number::from_f64(-f)
                        .map(Value::Number)
                        .unwrap_or(Value::Null))
                } else {
                    Err(ScriptError::Runtime("cannot negate non-number".to_string()))
                }
            }
            Expr::Binary(op, left, right) => {
                // Short-circuit logical operators.
                if *op == BinOp::And {
                    let l = self.eval(left)?;
                    if !truthy(&l) {
                        return Ok(Value::Bool(false));
                    }
                    let r = self.eval(right)?;
                    return Ok(Value::Bool(truthy(&r)));
                }
                if *op == BinOp::Or {
                    let l = self.eval(left)?;
                    if truthy(&l) {
                        return Ok(Value::Bool(true));
                    }
                    let r = self.eval(right)?;
                    return Ok(Value::Bool(truthy(&r)));
                }
                let l = self.eval(left)?;
                let r = self.eval(right)?;
                let result = binary(*op, l, r)?;
                self.bound(result)
            }
            Expr::Object(fields) => {
                let mut map = serde_json::Map::with_capacity(fields.len());
                for (key, expr) in fields {
                    map.insert(key.clone(), self.eval(expr)?);
                }
                self.bound(Value::Object(map))
            }
            Expr::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.eval(item)?);
                }
                self.bound(Value::Array(out))
            }
        }
    }
}

enum ResolvedAccess {
    Key(String),
    Index(usize),
}

impl ResolvedAccess {
    fn from_value(value: Value) -> Result<Self, ScriptError> {
        match value {
            Value::Number(n) => n
                .as_u64()
                .map(|i| ResolvedAccess::Index(i as usize))
                .ok_or_else(|| ScriptError::Runtime("array index must be non-negative".into())),
            Value::String(s) => Ok(ResolvedAccess::Key(s)),
            other => Err(ScriptError::Runtime(format!(
                "invalid index value {other}"
            ))),
        }
    }
}

fn assign_into(
    target: &mut Value,
    accesses: &[ResolvedAccess],
    value: Value,
) -> Result<(), ScriptError> {
    match accesses {
        [] => {
            *target = value;
            Ok(())
        }
        [ResolvedAccess::Key(key), rest @ ..] => {
            let map = target
                .as_object_mut()
                .ok_or_else(|| ScriptError::Runtime(format!("'{key}' parent is not an object")))?;
            let slot = map.entry(key.clone()).or_insert(Value::Null);
            if !rest.is_empty() && slot.is_null() {
                *slot = Value::Object(serde_json::Map::new());
            }
            assign_into(slot, rest, value)
        }
        [ResolvedAccess::Index(i), rest @ ..] => {
            let items = target
                .as_array_mut()
                .ok_or_else(|| ScriptError::Runtime("indexed parent is not an array".into()))?;
            let slot = items
                .get_mut(*i)
                .ok_or_else(|| ScriptError::Runtime(format!("index {i} out of bounds")))?;
            assign_into(slot, rest, value)
        }
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn binary(op: BinOp, left: Value, right: Value) -> Result<Value, ScriptError> {
    match op {
        BinOp::Eq => Ok(Value::Bool(left == right)),
        BinOp::Ne => Ok(Value::Bool(left != right)),
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            let ordering = compare(&left, &right)?;
            let result = match op {
                BinOp::Lt => ordering.is_lt(),
                BinOp::Le => ordering.is_le(),
                BinOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            };
            Ok(Value::Bool(result))
        }
        BinOp::Add => {
            // String on either side concatenates.
            if left.is_string() || right.is_string() {
                return Ok(Value::String(format!(
                    "{}{}",
                    display(&left),
                    display(&right)
                )));
            }
            arithmetic(op, left, right)
        }
        BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod => arithmetic(op, left, right),
        BinOp::And | BinOp::Or => unreachable!("short-circuited in eval"),
    }
}

fn compare(left: &Value, right: &Value) -> Result<std::cmp::Ordering, ScriptError> {
    if let (Some(l), Some(r)) = (left.as_f64(), right.as_f64()) {
        return l
            .partial_cmp(&r)
            .ok_or_else(|| ScriptError::Runtime("incomparable numbers".into()));
    }
    if let (Some(l), Some(r)) = (left.as_str(), right.as_str()) {
        return Ok(l.cmp(r));
    }
    Err(ScriptError::Runtime(format!(
        "cannot compare {left} with {right}"
    )))
}

fn arithmetic(op: BinOp, left: Value, right: Value) -> Result<Value, ScriptError> {
    // Integer arithmetic stays integral; division always goes through f64.
    if let (Some(l), Some(r)) = (left.as_i64(), right.as_i64()) {
        if op != BinOp::Div {
            let result = match op {
                BinOp::Add => l.checked_add(r),
                BinOp::Sub => l.checked_sub(r),
                BinOp::Mul => l.checked_mul(r),
                BinOp::Mod => {
                    if r == 0 {
                        return Err(ScriptError::Runtime("modulo by zero".into()));
                    }
                    l.checked_rem(r)
                }
                _ => unreachable!(),
            };
            return result
                .map(|n| Value::Number(Number::from(n)))
                .ok_or_else(|| ScriptError::Runtime("integer overflow".into()));
        }
    }
    let (l, r) = match (left.as_f64(), right.as_f64()) {
        (Some(l), Some(r)) => (l, r),
        _ => {
            return Err(ScriptError::Runtime(
                "arithmetic on non-numeric values".into(),
            ))
        }
    };
    let result = match op {
        BinOp::Add => l + r,
        BinOp::Sub => l - r,
        BinOp::Mul => l * r,
        BinOp::Div => {
            if r == 0.0 {
                return Err(ScriptError::Runtime("division by zero".into()));
            }
            l / r
        }
        BinOp::Mod => {
            if r == 0.0 {
                return Err(ScriptError::Runtime("modulo by zero".into()));
            }
            l % r
        }
        _ => unreachable!(),
    };
    Ok(Number::from_f64(result)
        .map(Value::Number)
        .unwrap_or(Value::Null))
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Approximate serialized size, for the value-size ceiling
fn value_size(value: &Value) -> usize {
    match value {
        Value::Null => 4,
        Value::Bool(_) => 5,
        Value::Number(_) => 16,
        Value::String(s) => s.len() + 2,
        Value::Array(items) => 2 + items.iter().map(value_size).sum::<usize>(),
        Value::Object(map) => {
            2 + map
                .iter()
                .map(|(k, v)| k.len() + 3 + value_size(v))
                .sum::<usize>()
        }
    }
}

// =============================================================================
// Engine
// =============================================================================

/// The built-in expression-language engine
#[derive(Debug, Default, Clone, Copy)]
pub struct ExprEngine;

impl ExprEngine {
    pub fn new() -> Self {
        ExprEngine
    }
}

impl ScriptEngine for ExprEngine {
    fn run(
        &self,
        source: &str,
        _event: LifecycleEvent,
        vars: &HookVars,
        limits: &Limits,
    ) -> Result<Option<Value>, ScriptError> {
        let tokens = Lexer::new(source).tokenize()?;
        let program = Parser::new(tokens).program()?;

        let mut env = HashMap::new();
        env.insert("data".to_string(), vars.data.clone());
        env.insert(
            "previous".to_string(),
            vars.previous.clone().unwrap_or(Value::Null),
        );
        env.insert(
            "entityName".to_string(),
            Value::String(vars.entity_name.clone()),
        );
        env.insert(
            "versionName".to_string(),
            Value::String(vars.version_name.clone()),
        );
        env.insert(
            "uniqueIdentifier".to_string(),
            Value::String(vars.unique_identifier.clone()),
        );
        env.insert(
            "oldVersion".to_string(),
            vars.old_version
                .clone()
                .map(Value::String)
                .unwrap_or(Value::Null),
        );
        env.insert(
            "newVersion".to_string(),
            vars.new_version
                .clone()
                .map(Value::String)
                .unwrap_or(Value::Null),
        );
        env.insert(
            "oldData".to_string(),
            vars.old_data.clone().unwrap_or(Value::Null),
        );

        let mut interp = Interp {
            env,
            budget: Budget {
                deadline: Instant::now() + limits.script_wall_clock,
                steps_left: limits.script_max_steps,
            },
            max_value_bytes: limits.script_max_value_bytes,
        };

        let result = match interp.exec_block(&program)? {
            Flow::Return(value) => value,
            Flow::Normal => None,
        };

        if let Some(value) = &result {
            if value_size(value) > limits.script_max_value_bytes {
                return Err(ScriptError::ValueTooLarge {
                    limit: limits.script_max_value_bytes,
                });
            }
        }
        Ok(result)
    }
}

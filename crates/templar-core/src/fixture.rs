//! Fixture front end: a minimal expression parser for tests and rule
//! fixtures.
//!
//! The engine's contract is an already-parsed tree; production hosts bring
//! their own front end. This module exists so fixtures and catalog test
//! cases can be written as text. Grammar: identifiers, int/float/string/
//! bool/null literals, unary `!`/`-`, the binary operators of
//! [`crate::tree::BinaryOp`], member access `a.b`, calls `f(x)` and
//! `a.f(x)`, lambdas `x -> e` / `(x, y) -> e`, and parentheses. Every node
//! carries its byte span; identifiers are type-annotated from an optional
//! environment.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::span::Span;
use crate::tree::{BinaryOp, Expr, ExprKind, Lit, UnaryOp};
use crate::types::TypeExpr;

#[derive(Error, Debug)]
#[error("parse error at byte {pos}: {msg}")]
pub struct ParseError {
    pub pos: usize,
    pub msg: String,
}

/// Identifier name -> static type, used to annotate parsed trees.
pub type TypeEnv = BTreeMap<String, TypeExpr>;

/// Parse a fixture expression with no type annotations.
pub fn parse(source: &str) -> Result<Expr, ParseError> {
    parse_typed(source, &TypeEnv::new())
}

/// Parse a fixture expression, annotating identifiers from `env`.
pub fn parse_typed(source: &str, env: &TypeEnv) -> Result<Expr, ParseError> {
    let mut parser = Parser {
        src: source,
        pos: 0,
        env,
    };
    let expr = parser.parse_expr()?;
    parser.skip_ws();
    if parser.pos < parser.src.len() {
        return Err(parser.error("trailing input"));
    }
    Ok(expr)
}

struct Parser<'s, 'e> {
    src: &'s str,
    pos: usize,
    env: &'e TypeEnv,
}

impl<'s, 'e> Parser<'s, 'e> {
    fn error(&self, msg: impl Into<String>) -> ParseError {
        ParseError {
            pos: self.pos,
            msg: msg.into(),
        }
    }

    fn skip_ws(&mut self) {
        while let Some(c) = self.peek_char() {
            if !c.is_whitespace() {
                break;
            }
            self.pos += c.len_utf8();
        }
    }

    fn at(&self, token: &str) -> bool {
        self.src[self.pos..].starts_with(token)
    }

    fn eat(&mut self, token: &str) -> bool {
        if self.at(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &str) -> Result<(), ParseError> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.error(format!("expected `{}`", token)))
        }
    }

    fn peek_char(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_and()?;
        loop {
            self.skip_ws();
            if self.eat("||") {
                let rhs = self.parse_and()?;
                lhs = combine(BinaryOp::Or, lhs, rhs);
            } else {
                return Ok(lhs);
            }
        }
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_equality()?;
        loop {
            self.skip_ws();
            if self.eat("&&") {
                let rhs = self.parse_equality()?;
                lhs = combine(BinaryOp::And, lhs, rhs);
            } else {
                return Ok(lhs);
            }
        }
    }

    fn parse_equality(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_comparison()?;
        loop {
            self.skip_ws();
            let op = if self.eat("==") {
                BinaryOp::Eq
            } else if self.eat("!=") {
                BinaryOp::Ne
            } else {
                return Ok(lhs);
            };
            let rhs = self.parse_comparison()?;
            lhs = combine(op, lhs, rhs);
        }
    }

    fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_additive()?;
        loop {
            self.skip_ws();
            let op = if self.eat("<=") {
                BinaryOp::Le
            } else if self.eat(">=") {
                BinaryOp::Ge
            } else if self.eat("<") {
                BinaryOp::Lt
            } else if self.eat(">") {
                BinaryOp::Gt
            } else {
                return Ok(lhs);
            };
            let rhs = self.parse_additive()?;
            lhs = combine(op, lhs, rhs);
        }
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_term()?;
        loop {
            self.skip_ws();
            let op = if self.eat("+") {
                BinaryOp::Add
            } else if self.at("-") && !self.at("->") {
                self.pos += 1;
                BinaryOp::Sub
            } else {
                return Ok(lhs);
            };
            let rhs = self.parse_term()?;
            lhs = combine(op, lhs, rhs);
        }
    }

    fn parse_term(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_unary()?;
        loop {
            self.skip_ws();
            let op = if self.eat("*") {
                BinaryOp::Mul
            } else if self.eat("/") {
                BinaryOp::Div
            } else if self.eat("%") {
                BinaryOp::Rem
            } else {
                return Ok(lhs);
            };
            let rhs = self.parse_unary()?;
            lhs = combine(op, lhs, rhs);
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        self.skip_ws();
        let start = self.pos;
        if self.eat("!") {
            let operand = self.parse_unary()?;
            let span = Span::new(start as u32, operand.span.end);
            return Ok(Expr::new(
                ExprKind::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                },
                span,
            ));
        }
        if self.at("-") && !self.at("->") {
            self.pos += 1;
            let operand = self.parse_unary()?;
            let span = Span::new(start as u32, operand.span.end);
            return Ok(Expr::new(
                ExprKind::Unary {
                    op: UnaryOp::Neg,
                    operand: Box::new(operand),
                },
                span,
            ));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;
        loop {
            self.skip_ws();
            if self.eat(".") {
                self.skip_ws();
                let name = self.parse_name()?;
                self.skip_ws();
                if self.at("(") {
                    let args = self.parse_call_args()?;
                    let span = Span::new(expr.span.start, self.pos as u32);
                    expr = Expr::new(
                        ExprKind::Call {
                            recv: Some(Box::new(expr)),
                            name,
                            args,
                        },
                        span,
                    );
                } else {
                    let span = Span::new(expr.span.start, self.pos as u32);
                    expr = Expr::new(
                        ExprKind::Member {
                            object: Box::new(expr),
                            name,
                        },
                        span,
                    );
                }
            } else if self.at("(") {
                // Bare call: the callee must be a plain name.
                let ExprKind::Ident(name) = &expr.kind else {
                    return Err(self.error("call target must be a name"));
                };
                let name = name.clone();
                let args = self.parse_call_args()?;
                let span = Span::new(expr.span.start, self.pos as u32);
                expr = Expr::new(
                    ExprKind::Call {
                        recv: None,
                        name,
                        args,
                    },
                    span,
                );
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_call_args(&mut self) -> Result<Vec<Expr>, ParseError> {
        self.expect("(")?;
        let mut args = Vec::new();
        self.skip_ws();
        if self.eat(")") {
            return Ok(args);
        }
        loop {
            args.push(self.parse_expr()?);
            self.skip_ws();
            if self.eat(",") {
                continue;
            }
            self.expect(")")?;
            return Ok(args);
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        self.skip_ws();
        let start = self.pos;
        match self.peek_char() {
            Some(c) if c.is_ascii_digit() => self.parse_number(),
            Some('"') | Some('\'') => self.parse_string(),
            Some(c) if c.is_alphabetic() || c == '_' => {
                let name = self.parse_name()?;
                let span = Span::new(start as u32, self.pos as u32);
                match name.as_str() {
                    "true" => return Ok(Expr::new(ExprKind::Lit(Lit::Bool(true)), span)),
                    "false" => return Ok(Expr::new(ExprKind::Lit(Lit::Bool(false)), span)),
                    "null" => return Ok(Expr::new(ExprKind::Lit(Lit::Null), span)),
                    _ => {}
                }
                // `x -> body` is a single-parameter lambda.
                let after_name = self.pos;
                self.skip_ws();
                if self.eat("->") {
                    let param = self.make_ident(name, span);
                    let body = self.parse_expr()?;
                    let lambda_span = Span::new(start as u32, body.span.end);
                    return Ok(Expr::new(
                        ExprKind::Lambda {
                            params: vec![param],
                            body: Box::new(body),
                        },
                        lambda_span,
                    ));
                }
                self.pos = after_name;
                Ok(self.make_ident(name, span))
            }
            Some('(') => {
                if let Some(expr) = self.try_parse_paren_lambda(start)? {
                    return Ok(expr);
                }
                self.expect("(")?;
                let inner = self.parse_expr()?;
                self.skip_ws();
                self.expect(")")?;
                let span = Span::new(start as u32, self.pos as u32);
                Ok(Expr::new(ExprKind::Paren(Box::new(inner)), span))
            }
            Some(c) => Err(self.error(format!("unexpected character `{}`", c))),
            None => Err(self.error("unexpected end of input")),
        }
    }

    /// `(a, b) -> body` or `() -> body`; rolls back when the parentheses
    /// turn out to be grouping.
    fn try_parse_paren_lambda(&mut self, start: usize) -> Result<Option<Expr>, ParseError> {
        let saved = self.pos;
        self.pos += 1; // consume `(`
        let mut params = Vec::new();
        self.skip_ws();
        if !self.eat(")") {
            loop {
                self.skip_ws();
                let name_start = self.pos;
                let Ok(name) = self.parse_name() else {
                    self.pos = saved;
                    return Ok(None);
                };
                let span = Span::new(name_start as u32, self.pos as u32);
                params.push(self.make_ident(name, span));
                self.skip_ws();
                if self.eat(",") {
                    continue;
                }
                if self.eat(")") {
                    break;
                }
                self.pos = saved;
                return Ok(None);
            }
        }
        self.skip_ws();
        if !self.eat("->") {
            self.pos = saved;
            return Ok(None);
        }
        let body = self.parse_expr()?;
        let span = Span::new(start as u32, body.span.end);
        Ok(Some(Expr::new(
            ExprKind::Lambda {
                params,
                body: Box::new(body),
            },
            span,
        )))
    }

    fn parse_name(&mut self) -> Result<String, ParseError> {
        let start = self.pos;
        while self.src[self.pos..]
            .starts_with(|c: char| c.is_alphanumeric() || c == '_')
        {
            self.pos += self.peek_char().map_or(1, char::len_utf8);
        }
        if self.pos == start {
            return Err(self.error("expected a name"));
        }
        Ok(self.src[start..self.pos].to_string())
    }

    fn parse_number(&mut self) -> Result<Expr, ParseError> {
        let start = self.pos;
        while self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        let mut is_float = false;
        if self.at(".")
            && self.src[self.pos + 1..]
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_digit())
        {
            is_float = true;
            self.pos += 1;
            while self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        let text = &self.src[start..self.pos];
        let span = Span::new(start as u32, self.pos as u32);
        let lit = if is_float {
            Lit::Float(
                text.parse()
                    .map_err(|_| self.error("invalid float literal"))?,
            )
        } else {
            Lit::Int(
                text.parse()
                    .map_err(|_| self.error("invalid int literal"))?,
            )
        };
        Ok(Expr::new(ExprKind::Lit(lit), span))
    }

    fn parse_string(&mut self) -> Result<Expr, ParseError> {
        let start = self.pos;
        let quote = self.peek_char().unwrap_or('"');
        self.pos += 1;
        let mut value = String::new();
        loop {
            match self.peek_char() {
                Some(c) if c == quote => {
                    self.pos += 1;
                    let span = Span::new(start as u32, self.pos as u32);
                    return Ok(Expr::new(ExprKind::Lit(Lit::Str(value)), span));
                }
                Some('\\') => {
                    self.pos += 1;
                    match self.peek_char() {
                        Some('n') => value.push('\n'),
                        Some('t') => value.push('\t'),
                        Some(c) => value.push(c),
                        None => return Err(self.error("unterminated string")),
                    }
                    self.pos += self.peek_char().map_or(1, char::len_utf8);
                }
                Some(c) => {
                    value.push(c);
                    self.pos += c.len_utf8();
                }
                None => return Err(self.error("unterminated string")),
            }
        }
    }

    fn make_ident(&self, name: String, span: Span) -> Expr {
        let ty = self.env.get(&name).cloned();
        let mut expr = Expr::new(ExprKind::Ident(name), span);
        expr.ty = ty;
        expr
    }
}

fn combine(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    let span = Span::new(lhs.span.start, rhs.span.end);
    Expr::new(
        ExprKind::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
        span,
    )
}

//! Language-agnostic expression trees.
//!
//! The engine consumes trees produced by an external front end. Every node
//! carries the byte span of the text it was parsed from and, where the
//! host's type checker provided one, a static type. Nodes synthesized during
//! rewriting carry a synthetic span and render structurally; nodes with a
//! real span render as the exact original source slice, which is what keeps
//! the unbound parts of rewritten code byte-identical to the input.

use crate::span::Span;
use crate::types::TypeExpr;

/// Literal values. Patterns match these by exact value, not just kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Lit {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Not,
    Neg,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Not => "!",
            UnaryOp::Neg => "-",
        }
    }

    pub fn from_symbol(s: &str) -> Option<Self> {
        match s {
            "!" => Some(UnaryOp::Not),
            "-" => Some(UnaryOp::Neg),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Mul,
    Div,
    Rem,
    Add,
    Sub,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }

    pub fn from_symbol(s: &str) -> Option<Self> {
        match s {
            "*" => Some(BinaryOp::Mul),
            "/" => Some(BinaryOp::Div),
            "%" => Some(BinaryOp::Rem),
            "+" => Some(BinaryOp::Add),
            "-" => Some(BinaryOp::Sub),
            "<" => Some(BinaryOp::Lt),
            "<=" => Some(BinaryOp::Le),
            ">" => Some(BinaryOp::Gt),
            ">=" => Some(BinaryOp::Ge),
            "==" => Some(BinaryOp::Eq),
            "!=" => Some(BinaryOp::Ne),
            "&&" => Some(BinaryOp::And),
            "||" => Some(BinaryOp::Or),
            _ => None,
        }
    }

    /// The operator computing the logical negation of this one, where one
    /// exists. `a == b` negates to `a != b`, `a < b` to `a >= b`.
    pub fn complement(self) -> Option<BinaryOp> {
        match self {
            BinaryOp::Eq => Some(BinaryOp::Ne),
            BinaryOp::Ne => Some(BinaryOp::Eq),
            BinaryOp::Lt => Some(BinaryOp::Ge),
            BinaryOp::Ge => Some(BinaryOp::Lt),
            BinaryOp::Gt => Some(BinaryOp::Le),
            BinaryOp::Le => Some(BinaryOp::Gt),
            _ => None,
        }
    }

    /// Binding strength for rendering. Higher binds tighter.
    fn precedence(self) -> u8 {
        match self {
            BinaryOp::Or => 1,
            BinaryOp::And => 2,
            BinaryOp::Eq | BinaryOp::Ne => 3,
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => 4,
            BinaryOp::Add | BinaryOp::Sub => 5,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => 6,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Ident(String),
    Lit(Lit),
    /// Function call (`recv` is `None`) or method call (`recv` is `Some`).
    Call {
        recv: Option<Box<Expr>>,
        name: String,
        args: Vec<Expr>,
    },
    /// Field or member access, `object.name`.
    Member {
        object: Box<Expr>,
        name: String,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// Closure literal. Parameters are `Ident` nodes.
    Lambda {
        params: Vec<Expr>,
        body: Box<Expr>,
    },
    /// Cosmetic grouping; transparent to unification and structural equality.
    Paren(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
    pub ty: Option<TypeExpr>,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self {
            kind,
            span,
            ty: None,
        }
    }

    pub fn with_ty(mut self, ty: TypeExpr) -> Self {
        self.ty = Some(ty);
        self
    }

    /// A node with no home in the original source.
    pub fn synthetic(kind: ExprKind) -> Self {
        Self::new(kind, Span::synthetic())
    }

    pub fn ident(name: impl Into<String>) -> Self {
        Self::synthetic(ExprKind::Ident(name.into()))
    }

    pub fn lit(lit: Lit) -> Self {
        Self::synthetic(ExprKind::Lit(lit))
    }

    pub fn call(recv: Option<Expr>, name: impl Into<String>, args: Vec<Expr>) -> Self {
        Self::synthetic(ExprKind::Call {
            recv: recv.map(Box::new),
            name: name.into(),
            args,
        })
    }

    pub fn member(object: Expr, name: impl Into<String>) -> Self {
        Self::synthetic(ExprKind::Member {
            object: Box::new(object),
            name: name.into(),
        })
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Self {
        Self::synthetic(ExprKind::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Self::synthetic(ExprKind::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    pub fn lambda(params: Vec<Expr>, body: Expr) -> Self {
        Self::synthetic(ExprKind::Lambda {
            params,
            body: Box::new(body),
        })
    }

    /// Peel cosmetic parentheses.
    pub fn unparenthesized(&self) -> &Expr {
        let mut expr = self;
        while let ExprKind::Paren(inner) = &expr.kind {
            expr = inner;
        }
        expr
    }

    /// True when no node in this subtree was synthesized: the span slice
    /// still reflects the subtree and may be emitted verbatim.
    pub fn is_pristine(&self) -> bool {
        if self.span.is_synthetic() {
            return false;
        }
        match &self.kind {
            ExprKind::Ident(_) | ExprKind::Lit(_) => true,
            ExprKind::Call { recv, args, .. } => {
                recv.as_deref().map_or(true, Expr::is_pristine)
                    && args.iter().all(Expr::is_pristine)
            }
            ExprKind::Member { object, .. } => object.is_pristine(),
            ExprKind::Unary { operand, .. } => operand.is_pristine(),
            ExprKind::Binary { lhs, rhs, .. } => lhs.is_pristine() && rhs.is_pristine(),
            ExprKind::Lambda { params, body } => {
                params.iter().all(Expr::is_pristine) && body.is_pristine()
            }
            ExprKind::Paren(inner) => inner.is_pristine(),
        }
    }
}

/// Structural equality: same shape and values, ignoring spans, type
/// annotations, and parenthesization.
pub fn structural_eq(a: &Expr, b: &Expr) -> bool {
    let a = a.unparenthesized();
    let b = b.unparenthesized();
    match (&a.kind, &b.kind) {
        (ExprKind::Ident(x), ExprKind::Ident(y)) => x == y,
        (ExprKind::Lit(x), ExprKind::Lit(y)) => x == y,
        (
            ExprKind::Call {
                recv: ra,
                name: na,
                args: aa,
            },
            ExprKind::Call {
                recv: rb,
                name: nb,
                args: ab,
            },
        ) => {
            na == nb
                && match (ra, rb) {
                    (None, None) => true,
                    (Some(x), Some(y)) => structural_eq(x, y),
                    _ => false,
                }
                && aa.len() == ab.len()
                && aa.iter().zip(ab).all(|(x, y)| structural_eq(x, y))
        }
        (
            ExprKind::Member {
                object: oa,
                name: na,
            },
            ExprKind::Member {
                object: ob,
                name: nb,
            },
        ) => na == nb && structural_eq(oa, ob),
        (
            ExprKind::Unary {
                op: opa,
                operand: xa,
            },
            ExprKind::Unary {
                op: opb,
                operand: xb,
            },
        ) => opa == opb && structural_eq(xa, xb),
        (
            ExprKind::Binary {
                op: opa,
                lhs: la,
                rhs: ra,
            },
            ExprKind::Binary {
                op: opb,
                lhs: lb,
                rhs: rb,
            },
        ) => opa == opb && structural_eq(la, lb) && structural_eq(ra, rb),
        (
            ExprKind::Lambda {
                params: pa,
                body: ba,
            },
            ExprKind::Lambda {
                params: pb,
                body: bb,
            },
        ) => {
            pa.len() == pb.len()
                && pa.iter().zip(pb).all(|(x, y)| structural_eq(x, y))
                && structural_eq(ba, bb)
        }
        _ => false,
    }
}

/// Render a tree to text.
///
/// A pristine subtree is emitted as its exact source slice; synthesized
/// nodes print structurally with precedence-aware parenthesization.
pub fn render(expr: &Expr, source: &str) -> String {
    let mut out = String::new();
    render_into(expr, source, &mut out);
    out
}

fn render_into(expr: &Expr, source: &str, out: &mut String) {
    if expr.is_pristine() {
        out.push_str(expr.span.text(source));
        return;
    }
    match &expr.kind {
        ExprKind::Ident(name) => out.push_str(name),
        ExprKind::Lit(lit) => render_lit(lit, out),
        ExprKind::Call { recv, name, args } => {
            if let Some(recv) = recv {
                render_operand(recv, source, out);
                out.push('.');
            }
            out.push_str(name);
            out.push('(');
            for (i, arg) in args.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                render_into(arg, source, out);
            }
            out.push(')');
        }
        ExprKind::Member { object, name } => {
            render_operand(object, source, out);
            out.push('.');
            out.push_str(name);
        }
        ExprKind::Unary { op, operand } => {
            out.push_str(op.symbol());
            render_operand(operand, source, out);
        }
        ExprKind::Binary { op, lhs, rhs } => {
            render_binary_side(lhs, *op, false, source, out);
            out.push(' ');
            out.push_str(op.symbol());
            out.push(' ');
            render_binary_side(rhs, *op, true, source, out);
        }
        ExprKind::Lambda { params, body } => {
            if params.len() == 1 {
                render_into(&params[0], source, out);
            } else {
                out.push('(');
                for (i, param) in params.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    render_into(param, source, out);
                }
                out.push(')');
            }
            out.push_str(" -> ");
            render_into(body, source, out);
        }
        ExprKind::Paren(inner) => {
            out.push('(');
            render_into(inner, source, out);
            out.push(')');
        }
    }
}

fn render_lit(lit: &Lit, out: &mut String) {
    match lit {
        Lit::Int(n) => out.push_str(&n.to_string()),
        Lit::Float(f) => out.push_str(&f.to_string()),
        Lit::Str(s) => {
            out.push('"');
            for c in s.chars() {
                match c {
                    '"' => out.push_str("\\\""),
                    '\\' => out.push_str("\\\\"),
                    '\n' => out.push_str("\\n"),
                    '\t' => out.push_str("\\t"),
                    _ => out.push(c),
                }
            }
            out.push('"');
        }
        Lit::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Lit::Null => out.push_str("null"),
    }
}

/// Render a receiver or unary operand, parenthesizing anything looser than
/// a postfix position.
fn render_operand(expr: &Expr, source: &str, out: &mut String) {
    let needs_parens = matches!(
        expr.unparenthesized().kind,
        ExprKind::Binary { .. } | ExprKind::Unary { .. } | ExprKind::Lambda { .. }
    );
    if needs_parens && !matches!(expr.kind, ExprKind::Paren(_)) {
        out.push('(');
        render_into(expr, source, out);
        out.push(')');
    } else {
        render_into(expr, source, out);
    }
}

fn render_binary_side(expr: &Expr, parent: BinaryOp, is_rhs: bool, source: &str, out: &mut String) {
    let needs_parens = match &expr.unparenthesized().kind {
        ExprKind::Binary { op, .. } => {
            let child = op.precedence();
            let this = parent.precedence();
            child < this || (child == this && is_rhs)
        }
        ExprKind::Lambda { .. } => true,
        _ => false,
    };
    if needs_parens && !matches!(expr.kind, ExprKind::Paren(_)) {
        out.push('(');
        render_into(expr, source, out);
        out.push(')');
    } else {
        render_into(expr, source, out);
    }
}

//! templar-core: Core abstractions for template-based tree rewriting
//!
//! This crate provides:
//! - `Expr`: a language-agnostic, span-carrying expression tree
//! - `Span`: byte-offset source spans with a synthetic sentinel
//! - `structural_eq()` / `render()`: equality and printing over trees
//! - `Edit`: a span-based code modification with optional import edit
//! - `apply_edits()`: rightmost-first edit application
//! - `ImportTable` / `resolve_imports()`: import-policy resolution
//! - `TypeExpr` / `TypeContext`: the assignability oracle boundary
//! - `Visitor`: trait for traversing expression trees
//! - `fixture`: a minimal front end for tests and rule fixtures

mod edit;
pub mod fixture;
mod span;
pub mod tree;
pub mod types;
pub mod visitor;

pub use edit::{apply_edits, resolve_imports, Edit, EditError, ImportEdit, ImportPolicy, ImportTable};
pub use span::Span;
pub use tree::{render, structural_eq, BinaryOp, Expr, ExprKind, Lit, UnaryOp};
pub use types::{AssignabilityTable, TypeContext, TypeExpr};
pub use visitor::{visit, Visitor};

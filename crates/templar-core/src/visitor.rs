//! Tree visitor for traversing expression trees.
//!
//! Provides a trait-based visitor pattern. The default implementation
//! handles traversal; implementors override `visit_expr` to act at nodes.

use crate::tree::{Expr, ExprKind};

/// Trait for visiting expression nodes.
///
/// `visit_expr` is called for every node in pre-order. Return `true` to
/// continue traversal into children.
pub trait Visitor<'t> {
    fn visit_expr(&mut self, _expr: &'t Expr) -> bool {
        true
    }

    /// Traverse an expression and its children.
    fn traverse(&mut self, expr: &'t Expr) {
        if !self.visit_expr(expr) {
            return;
        }

        match &expr.kind {
            ExprKind::Ident(_) | ExprKind::Lit(_) => {}
            ExprKind::Call { recv, args, .. } => {
                if let Some(recv) = recv {
                    self.traverse(recv);
                }
                for arg in args {
                    self.traverse(arg);
                }
            }
            ExprKind::Member { object, .. } => {
                self.traverse(object);
            }
            ExprKind::Unary { operand, .. } => {
                self.traverse(operand);
            }
            ExprKind::Binary { lhs, rhs, .. } => {
                self.traverse(lhs);
                self.traverse(rhs);
            }
            ExprKind::Lambda { params, body } => {
                for param in params {
                    self.traverse(param);
                }
                self.traverse(body);
            }
            ExprKind::Paren(inner) => {
                self.traverse(inner);
            }
        }
    }
}

/// Helper function to run a visitor over a tree.
pub fn visit<'t, V: Visitor<'t>>(visitor: &mut V, root: &'t Expr) {
    visitor.traverse(root);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{BinaryOp, Lit};

    struct CountingVisitor {
        idents: Vec<String>,
        nodes: usize,
    }

    impl<'t> Visitor<'t> for CountingVisitor {
        fn visit_expr(&mut self, expr: &'t Expr) -> bool {
            self.nodes += 1;
            if let ExprKind::Ident(name) = &expr.kind {
                self.idents.push(name.clone());
            }
            true
        }
    }

    #[test]
    fn test_visits_every_node() {
        // f(a, b + 1)
        let tree = Expr::call(
            None,
            "f",
            vec![
                Expr::ident("a"),
                Expr::binary(BinaryOp::Add, Expr::ident("b"), Expr::lit(Lit::Int(1))),
            ],
        );
        let mut visitor = CountingVisitor {
            idents: Vec::new(),
            nodes: 0,
        };
        visit(&mut visitor, &tree);
        assert_eq!(visitor.nodes, 5);
        assert_eq!(visitor.idents, vec!["a", "b"]);
    }

    struct PruningVisitor {
        nodes: usize,
    }

    impl<'t> Visitor<'t> for PruningVisitor {
        fn visit_expr(&mut self, expr: &'t Expr) -> bool {
            self.nodes += 1;
            // Do not descend into calls.
            !matches!(expr.kind, ExprKind::Call { .. })
        }
    }

    #[test]
    fn test_prunes_children() {
        let tree = Expr::call(None, "f", vec![Expr::ident("a"), Expr::ident("b")]);
        let mut visitor = PruningVisitor { nodes: 0 };
        visit(&mut visitor, &tree);
        assert_eq!(visitor.nodes, 1);
    }
}

//! Pattern unification against candidate tree fragments.
//!
//! `unify` attempts to bind every placeholder in a compiled pattern to a
//! sub-fragment of the candidate, respecting declared type constraints
//! through the external oracle. Node kinds must match exactly; cosmetic
//! parentheses on the candidate are transparent; literals match by exact
//! value. Unification never mutates the candidate tree — a failed attempt
//! simply discards its partial binding.

use templar_core::tree::{structural_eq, Expr, ExprKind, UnaryOp};
use templar_core::types::TypeContext;

use crate::pattern::{Arity, Pattern, Placeholder, PlaceholderId};

/// Placeholder bindings for one successful match.
///
/// Sequences bound by repeated placeholders live in a flat arena indexed by
/// start/length, so a binding stays immutable and cheap to share between
/// arbitration and rewriting.
#[derive(Debug, Clone)]
pub struct Binding<'t> {
    slots: Vec<Slot<'t>>,
    arena: Vec<&'t Expr>,
}

#[derive(Debug, Clone, Copy)]
enum Slot<'t> {
    Empty,
    Single(&'t Expr),
    Seq { start: usize, len: usize },
}

impl<'t> Binding<'t> {
    fn new(slots: usize) -> Self {
        Self {
            slots: vec![Slot::Empty; slots],
            arena: Vec::new(),
        }
    }

    pub fn single(&self, id: PlaceholderId) -> Option<&'t Expr> {
        match self.slots.get(id)? {
            Slot::Single(expr) => Some(expr),
            _ => None,
        }
    }

    pub fn seq(&self, id: PlaceholderId) -> Option<&[&'t Expr]> {
        match self.slots.get(id)? {
            Slot::Seq { start, len } => Some(&self.arena[*start..*start + *len]),
            _ => None,
        }
    }

    pub fn is_bound(&self, id: PlaceholderId) -> bool {
        !matches!(self.slots.get(id), None | Some(Slot::Empty))
    }
}

/// Unifies one rule's patterns against candidate fragments.
pub struct Unifier<'r, 'c> {
    placeholders: &'r [Placeholder],
    ctx: &'c dyn TypeContext,
}

impl<'r, 'c> Unifier<'r, 'c> {
    pub fn new(placeholders: &'r [Placeholder], ctx: &'c dyn TypeContext) -> Self {
        Self { placeholders, ctx }
    }

    /// Attempt to unify `pattern` with `candidate`.
    pub fn unify<'t>(&self, pattern: &Pattern, candidate: &'t Expr) -> Option<Binding<'t>> {
        let mut binding = Binding::new(self.placeholders.len());
        if self.unify_into(pattern, candidate, &mut binding) {
            Some(binding)
        } else {
            None
        }
    }

    /// Attempt to unify `pattern` with the logical negation of `candidate`:
    /// either the candidate is `!inner` and the pattern unifies with
    /// `inner`, or the candidate is a comparison whose operator is the
    /// complement of the pattern's.
    pub fn unify_negated<'t>(&self, pattern: &Pattern, candidate: &'t Expr) -> Option<Binding<'t>> {
        let candidate = candidate.unparenthesized();

        if let ExprKind::Unary {
            op: UnaryOp::Not,
            operand,
        } = &candidate.kind
        {
            return self.unify(pattern, operand);
        }

        if let (
            Pattern::Binary {
                op: pattern_op,
                lhs: pattern_lhs,
                rhs: pattern_rhs,
            },
            ExprKind::Binary { op, lhs, rhs },
        ) = (pattern, &candidate.kind)
        {
            if pattern_op.complement() == Some(*op) {
                let mut binding = Binding::new(self.placeholders.len());
                if self.unify_into(pattern_lhs, lhs, &mut binding)
                    && self.unify_into(pattern_rhs, rhs, &mut binding)
                {
                    return Some(binding);
                }
            }
        }

        None
    }

    fn unify_into<'t>(
        &self,
        pattern: &Pattern,
        candidate: &'t Expr,
        binding: &mut Binding<'t>,
    ) -> bool {
        let candidate = candidate.unparenthesized();
        match pattern {
            Pattern::Bind(id) => self.bind_single(*id, candidate, binding),
            Pattern::Ident(name) => {
                matches!(&candidate.kind, ExprKind::Ident(n) if n == name)
            }
            Pattern::Lit(lit) => {
                matches!(&candidate.kind, ExprKind::Lit(l) if l == lit)
            }
            Pattern::Call { recv, name, args } => {
                let ExprKind::Call {
                    recv: cand_recv,
                    name: cand_name,
                    args: cand_args,
                } = &candidate.kind
                else {
                    return false;
                };
                if name != cand_name {
                    return false;
                }
                match (recv, cand_recv) {
                    (None, None) => {}
                    (Some(pat), Some(cand)) => {
                        if !self.unify_into(pat, cand, binding) {
                            return false;
                        }
                    }
                    _ => return false,
                }
                self.unify_args(args, cand_args, binding)
            }
            Pattern::Member { object, name } => {
                let ExprKind::Member {
                    object: cand_object,
                    name: cand_name,
                } = &candidate.kind
                else {
                    return false;
                };
                name == cand_name && self.unify_into(object, cand_object, binding)
            }
            Pattern::Unary { op, operand } => {
                let ExprKind::Unary {
                    op: cand_op,
                    operand: cand_operand,
                } = &candidate.kind
                else {
                    return false;
                };
                op == cand_op && self.unify_into(operand, cand_operand, binding)
            }
            Pattern::Binary { op, lhs, rhs } => {
                let ExprKind::Binary {
                    op: cand_op,
                    lhs: cand_lhs,
                    rhs: cand_rhs,
                } = &candidate.kind
                else {
                    return false;
                };
                op == cand_op
                    && self.unify_into(lhs, cand_lhs, binding)
                    && self.unify_into(rhs, cand_rhs, binding)
            }
            Pattern::Lambda { params, body } => {
                let ExprKind::Lambda {
                    params: cand_params,
                    body: cand_body,
                } = &candidate.kind
                else {
                    return false;
                };
                params.len() == cand_params.len()
                    && params
                        .iter()
                        .zip(cand_params)
                        .all(|(p, c)| self.unify_into(p, c, binding))
                    && self.unify_into(body, cand_body, binding)
            }
        }
    }

    /// Argument-list unification. A trailing repeated placeholder binds the
    /// full remaining ordered sequence; otherwise arity must match exactly.
    fn unify_args<'t>(
        &self,
        patterns: &[Pattern],
        candidates: &'t [Expr],
        binding: &mut Binding<'t>,
    ) -> bool {
        let trailing_repeated = match patterns.last() {
            Some(Pattern::Bind(id)) if self.placeholders[*id].arity == Arity::Repeated => {
                Some(*id)
            }
            _ => None,
        };

        match trailing_repeated {
            Some(id) => {
                let fixed = patterns.len() - 1;
                if candidates.len() < fixed {
                    return false;
                }
                for (pattern, candidate) in patterns[..fixed].iter().zip(candidates) {
                    if !self.unify_into(pattern, candidate, binding) {
                        return false;
                    }
                }
                self.bind_seq(id, &candidates[fixed..], binding)
            }
            None => {
                patterns.len() == candidates.len()
                    && patterns
                        .iter()
                        .zip(candidates)
                        .all(|(p, c)| self.unify_into(p, c, binding))
            }
        }
    }

    /// Bind a single-arity placeholder, enforcing the type constraint and
    /// consistency with any earlier occurrence.
    fn bind_single<'t>(
        &self,
        id: PlaceholderId,
        candidate: &'t Expr,
        binding: &mut Binding<'t>,
    ) -> bool {
        if let Some(previous) = binding.single(id) {
            return structural_eq(previous, candidate);
        }
        if !self.type_admits(id, candidate) {
            return false;
        }
        binding.slots[id] = Slot::Single(candidate);
        true
    }

    /// Bind a repeated placeholder to an ordered sequence. Each element must
    /// satisfy the constraint; a second occurrence must bind an
    /// element-wise structurally equal sequence.
    fn bind_seq<'t>(
        &self,
        id: PlaceholderId,
        candidates: &'t [Expr],
        binding: &mut Binding<'t>,
    ) -> bool {
        if let Some(previous) = binding.seq(id) {
            return previous.len() == candidates.len()
                && previous
                    .iter()
                    .zip(candidates)
                    .all(|(p, c)| structural_eq(p, c));
        }
        if !candidates.iter().all(|c| self.type_admits(id, c)) {
            return false;
        }
        let start = binding.arena.len();
        binding.arena.extend(candidates.iter());
        binding.slots[id] = Slot::Seq {
            start,
            len: candidates.len(),
        };
        true
    }

    /// Type gate: an unconstrained placeholder admits anything; a
    /// constrained one requires a candidate type the oracle accepts. No
    /// type information means no match.
    fn type_admits(&self, id: PlaceholderId, candidate: &Expr) -> bool {
        match &self.placeholders[id].constraint {
            None => true,
            Some(constraint) => match &candidate.ty {
                Some(ty) => self.ctx.is_assignable(ty, constraint),
                None => false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use templar_core::fixture::{self, TypeEnv};
    use templar_core::tree::{BinaryOp, Lit};
    use templar_core::types::{AssignabilityTable, TypeExpr};

    fn untyped() -> AssignabilityTable {
        AssignabilityTable::new()
    }

    fn placeholder(name: &str, constraint: Option<&str>, arity: Arity) -> Placeholder {
        Placeholder {
            name: name.to_string(),
            constraint: constraint.map(|c| TypeExpr::parse(c).unwrap()),
            arity,
        }
    }

    fn length_eq_zero_pattern() -> Pattern {
        Pattern::Binary {
            op: BinaryOp::Eq,
            lhs: Box::new(Pattern::Call {
                recv: Some(Box::new(Pattern::Bind(0))),
                name: "length".into(),
                args: vec![],
            }),
            rhs: Box::new(Pattern::Lit(Lit::Int(0))),
        }
    }

    #[test]
    fn test_unify_binds_receiver() {
        let placeholders = vec![placeholder("seq", None, Arity::Single)];
        let ctx = untyped();
        let unifier = Unifier::new(&placeholders, &ctx);

        let source = "xs.length() == 0";
        let tree = fixture::parse(source).unwrap();
        let binding = unifier.unify(&length_eq_zero_pattern(), &tree).unwrap();
        let bound = binding.single(0).unwrap();
        assert_eq!(bound.span.text(source), "xs");
    }

    #[test]
    fn test_unify_rejects_wrong_literal() {
        let placeholders = vec![placeholder("seq", None, Arity::Single)];
        let ctx = untyped();
        let unifier = Unifier::new(&placeholders, &ctx);

        let tree = fixture::parse("xs.length() == 1").unwrap();
        assert!(unifier.unify(&length_eq_zero_pattern(), &tree).is_none());
    }

    #[test]
    fn test_unify_rejects_wrong_kind() {
        let placeholders = vec![placeholder("seq", None, Arity::Single)];
        let ctx = untyped();
        let unifier = Unifier::new(&placeholders, &ctx);

        // Member access, not a call.
        let tree = fixture::parse("xs.length == 0").unwrap();
        assert!(unifier.unify(&length_eq_zero_pattern(), &tree).is_none());
    }

    #[test]
    fn test_unify_sees_through_parens() {
        let placeholders = vec![placeholder("seq", None, Arity::Single)];
        let ctx = untyped();
        let unifier = Unifier::new(&placeholders, &ctx);

        let tree = fixture::parse("((xs.length()) == 0)").unwrap();
        assert!(unifier.unify(&length_eq_zero_pattern(), &tree).is_some());
    }

    #[test]
    fn test_type_constraint_gates_binding() {
        let placeholders = vec![placeholder("seq", Some("Sequence<E>"), Arity::Single)];
        let mut ctx = AssignabilityTable::new();
        ctx.declare("List", "Sequence");
        let unifier = Unifier::new(&placeholders, &ctx);

        let mut env = TypeEnv::new();
        env.insert("xs".into(), TypeExpr::parse("List<String>").unwrap());
        let typed = fixture::parse_typed("xs.length() == 0", &env).unwrap();
        assert!(unifier.unify(&length_eq_zero_pattern(), &typed).is_some());

        // Unknown type: fails closed.
        let untyped_tree = fixture::parse("xs.length() == 0").unwrap();
        assert!(unifier.unify(&length_eq_zero_pattern(), &untyped_tree).is_none());

        // Wrong type: fails.
        let mut env = TypeEnv::new();
        env.insert("xs".into(), TypeExpr::simple("Int"));
        let wrong = fixture::parse_typed("xs.length() == 0", &env).unwrap();
        assert!(unifier.unify(&length_eq_zero_pattern(), &wrong).is_none());
    }

    #[test]
    fn test_consistency_same_placeholder_twice() {
        // `f(x, x)` with both arguments bound to placeholder 0.
        let placeholders = vec![placeholder("x", None, Arity::Single)];
        let ctx = untyped();
        let unifier = Unifier::new(&placeholders, &ctx);
        let pattern = Pattern::Call {
            recv: None,
            name: "f".into(),
            args: vec![Pattern::Bind(0), Pattern::Bind(0)],
        };

        assert!(unifier.unify(&pattern, &fixture::parse("f(a.b, a.b)").unwrap()).is_some());
        // Parenthesization is cosmetic for the consistency check too.
        assert!(unifier.unify(&pattern, &fixture::parse("f(a.b, (a.b))").unwrap()).is_some());
        assert!(unifier.unify(&pattern, &fixture::parse("f(a.b, a.c)").unwrap()).is_none());
    }

    #[test]
    fn test_repeated_binds_tail() {
        let placeholders = vec![
            placeholder("first", None, Arity::Single),
            placeholder("rest", None, Arity::Repeated),
        ];
        let ctx = untyped();
        let unifier = Unifier::new(&placeholders, &ctx);
        let pattern = Pattern::Call {
            recv: None,
            name: "f".into(),
            args: vec![Pattern::Bind(0), Pattern::Bind(1)],
        };

        let source = "f(a, b, c, d)";
        let tree = fixture::parse(source).unwrap();
        let binding = unifier.unify(&pattern, &tree).unwrap();
        let rest = binding.seq(1).unwrap();
        assert_eq!(rest.len(), 3);
        assert_eq!(rest[0].span.text(source), "b");
        assert_eq!(rest[2].span.text(source), "d");

        // Empty tail is a valid sequence.
        let tree = fixture::parse("f(a)").unwrap();
        let binding = unifier.unify(&pattern, &tree).unwrap();
        assert_eq!(binding.seq(1).unwrap().len(), 0);

        // Too few arguments for the fixed prefix.
        let tree = fixture::parse("f()").unwrap();
        assert!(unifier.unify(&pattern, &tree).is_none());
    }

    #[test]
    fn test_exact_arity_without_repeated() {
        let placeholders = vec![placeholder("x", None, Arity::Single)];
        let ctx = untyped();
        let unifier = Unifier::new(&placeholders, &ctx);
        let pattern = Pattern::Call {
            recv: None,
            name: "f".into(),
            args: vec![Pattern::Bind(0)],
        };
        assert!(unifier.unify(&pattern, &fixture::parse("f(a)").unwrap()).is_some());
        assert!(unifier.unify(&pattern, &fixture::parse("f(a, b)").unwrap()).is_none());
        assert!(unifier.unify(&pattern, &fixture::parse("f()").unwrap()).is_none());
    }

    #[test]
    fn test_unify_negated_not_wrapper() {
        let placeholders = vec![placeholder("seq", None, Arity::Single)];
        let ctx = untyped();
        let unifier = Unifier::new(&placeholders, &ctx);

        let tree = fixture::parse("!(xs.length() == 0)").unwrap();
        assert!(unifier.unify(&length_eq_zero_pattern(), &tree).is_none());
        assert!(unifier.unify_negated(&length_eq_zero_pattern(), &tree).is_some());
    }

    #[test]
    fn test_unify_negated_complement_operator() {
        let placeholders = vec![placeholder("seq", None, Arity::Single)];
        let ctx = untyped();
        let unifier = Unifier::new(&placeholders, &ctx);

        // `xs.length() != 0` is the negation of the `== 0` pattern.
        let tree = fixture::parse("xs.length() != 0").unwrap();
        assert!(unifier.unify_negated(&length_eq_zero_pattern(), &tree).is_some());

        // `<` complements to `>=`.
        let lt_pattern = Pattern::Binary {
            op: BinaryOp::Lt,
            lhs: Box::new(Pattern::Bind(0)),
            rhs: Box::new(Pattern::Lit(Lit::Int(1))),
        };
        let tree = fixture::parse("n >= 1").unwrap();
        assert!(unifier.unify_negated(&lt_pattern, &tree).is_some());
    }

    #[test]
    fn test_unify_lambda() {
        let placeholders = vec![
            placeholder("p", None, Arity::Single),
            placeholder("body", None, Arity::Single),
        ];
        let ctx = untyped();
        let unifier = Unifier::new(&placeholders, &ctx);
        let pattern = Pattern::Call {
            recv: Some(Box::new(Pattern::Bind(1))),
            name: "map".into(),
            args: vec![Pattern::Lambda {
                params: vec![Pattern::Bind(0)],
                body: Box::new(Pattern::Bind(0)),
            }],
        };

        // Identity lambda: parameter and body must be the same identifier.
        assert!(unifier.unify(&pattern, &fixture::parse("xs.map(x -> x)").unwrap()).is_some());
        assert!(unifier.unify(&pattern, &fixture::parse("xs.map(x -> y)").unwrap()).is_none());
    }
}

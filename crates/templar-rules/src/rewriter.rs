//! After-template instantiation and edit production.
//!
//! An accepted match is rewritten by substituting its bound fragments into
//! the rule's after-template, producing an owned replacement fragment.
//! Bound fragments are cloned with their original spans intact, so the
//! rendered replacement reproduces the unbound parts of the original code
//! exactly; template structure around them is synthesized.

use templar_core::tree::{render, Expr, ExprKind, UnaryOp};
use templar_core::{Edit, Span};
use thiserror::Error;

use crate::pattern::{CompiledRule, Pattern};
use crate::scanner::Match;
use crate::unify::Binding;

/// Rewriting-time invariant violations. These indicate an engine bug for a
/// correctly-compiled rule and abort processing of the current tree.
#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("rule `{rule}`: no binding for placeholder `{placeholder}` while instantiating the after-template")]
    MissingBinding { rule: String, placeholder: String },

    #[error("rule `{rule}`: sequence placeholder `{placeholder}` instantiated outside an argument list")]
    SequenceOutsideArgs { rule: String, placeholder: String },
}

/// Instantiate the replacement fragment for an accepted match.
///
/// A negated match uses the rule's dedicated negated after-form when one is
/// declared, and otherwise the logical negation of the instantiated
/// after-template.
pub fn instantiate(rule: &CompiledRule, m: &Match<'_>) -> Result<Expr, RewriteError> {
    if m.negated {
        if let Some(negated_form) = &rule.after_negated {
            return instantiate_pattern(negated_form, rule, &m.binding);
        }
        let fragment = instantiate_pattern(&rule.after, rule, &m.binding)?;
        return Ok(negate_fragment(fragment));
    }
    instantiate_pattern(&rule.after, rule, &m.binding)
}

/// Produce the text edit for an accepted match.
pub fn rewrite(rule: &CompiledRule, m: &Match<'_>, source: &str) -> Result<Edit, RewriteError> {
    let fragment = instantiate(rule, m)?;
    let mut edit = Edit::new(m.span, render(&fragment, source), rule.description.clone());
    if let Some(import) = &rule.import {
        edit = edit.with_import(import.clone());
    }
    Ok(edit)
}

fn instantiate_pattern(
    pattern: &Pattern,
    rule: &CompiledRule,
    binding: &Binding<'_>,
) -> Result<Expr, RewriteError> {
    match pattern {
        Pattern::Bind(id) => match binding.single(*id) {
            Some(bound) => Ok(bound.clone()),
            None if binding.seq(*id).is_some() => Err(RewriteError::SequenceOutsideArgs {
                rule: rule.name.clone(),
                placeholder: rule.placeholders[*id].name.clone(),
            }),
            None => Err(RewriteError::MissingBinding {
                rule: rule.name.clone(),
                placeholder: rule.placeholders[*id].name.clone(),
            }),
        },
        Pattern::Ident(name) => Ok(Expr::ident(name.clone())),
        Pattern::Lit(lit) => Ok(Expr::lit(lit.clone())),
        Pattern::Call { recv, name, args } => {
            let recv = recv
                .as_deref()
                .map(|r| instantiate_pattern(r, rule, binding))
                .transpose()?;
            let mut out_args = Vec::with_capacity(args.len());
            for arg in args {
                // A sequence placeholder splices into the variadic position.
                if let Pattern::Bind(id) = arg {
                    if let Some(seq) = binding.seq(*id) {
                        out_args.extend(seq.iter().map(|e| (*e).clone()));
                        continue;
                    }
                }
                out_args.push(instantiate_pattern(arg, rule, binding)?);
            }
            Ok(Expr::call(recv, name.clone(), out_args))
        }
        Pattern::Member { object, name } => Ok(Expr::member(
            instantiate_pattern(object, rule, binding)?,
            name.clone(),
        )),
        Pattern::Unary { op, operand } => Ok(Expr::unary(
            *op,
            instantiate_pattern(operand, rule, binding)?,
        )),
        Pattern::Binary { op, lhs, rhs } => Ok(Expr::binary(
            *op,
            instantiate_pattern(lhs, rule, binding)?,
            instantiate_pattern(rhs, rule, binding)?,
        )),
        Pattern::Lambda { params, body } => {
            let params = params
                .iter()
                .map(|p| instantiate_pattern(p, rule, binding))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Expr::lambda(params, instantiate_pattern(body, rule, binding)?))
        }
    }
}

/// Logically negate an instantiated fragment: complement a comparison,
/// unwrap a double negation, otherwise wrap in `!`.
pub fn negate_fragment(fragment: Expr) -> Expr {
    match fragment.kind {
        ExprKind::Binary { op, lhs, rhs } => match op.complement() {
            // The operator changed, so the fragment no longer reflects any
            // original span.
            Some(complement) => Expr::new(
                ExprKind::Binary {
                    op: complement,
                    lhs,
                    rhs,
                },
                Span::synthetic(),
            ),
            None => Expr::unary(
                UnaryOp::Not,
                Expr::new(ExprKind::Binary { op, lhs, rhs }, fragment.span),
            ),
        },
        ExprKind::Unary {
            op: UnaryOp::Not,
            operand,
        } => *operand,
        kind => Expr::unary(UnaryOp::Not, Expr::new(kind, fragment.span)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arbiter::{arbitrate, DefaultPolicy};
    use crate::compiler::compile_catalog;
    use crate::pattern::RuleSet;
    use crate::scanner::scan;
    use crate::schema::RuleSpec;
    use templar_core::fixture;
    use templar_core::tree::{BinaryOp, Lit};
    use templar_core::types::AssignabilityTable;

    fn ruleset(yaml: &str) -> RuleSet {
        let specs: Vec<RuleSpec> = serde_yaml::from_str(yaml).unwrap();
        let (rules, excluded) = compile_catalog(&specs);
        assert!(excluded.is_empty(), "excluded: {:?}", excluded);
        rules
    }

    fn single_match<'t>(
        rules: &RuleSet,
        tree: &'t Expr,
        ctx: &AssignabilityTable,
    ) -> Match<'t> {
        let matches = scan(tree, rules, ctx);
        let mut accepted = arbitrate(rules, matches, &DefaultPolicy);
        assert_eq!(accepted.len(), 1);
        accepted.pop().unwrap()
    }

    const IS_EMPTY_CATALOG: &str = r#"
- name: length_check_to_is_empty
  description: Prefer isEmpty() over comparing length() with zero
  negatable: true
  placeholders:
    seq: {}
  before:
    - node: binary
      op: "=="
      lhs: { node: call, name: length, recv: { bind: seq } }
      rhs: { lit: 0 }
  after: { node: call, name: isEmpty, recv: { bind: seq } }
"#;

    #[test]
    fn test_rewrite_substitutes_bound_fragment() {
        let rules = ruleset(IS_EMPTY_CATALOG);
        let ctx = AssignabilityTable::new();
        let source = "this.buffer.length() == 0";
        let tree = fixture::parse(source).unwrap();
        let m = single_match(&rules, &tree, &ctx);
        let edit = rewrite(rules.rule(m.rule), &m, source).unwrap();
        assert_eq!(edit.replacement, "this.buffer.isEmpty()");
        assert_eq!(edit.span.text(source), source);
    }

    #[test]
    fn test_rewrite_negated_wraps_with_not() {
        let rules = ruleset(IS_EMPTY_CATALOG);
        let ctx = AssignabilityTable::new();
        let source = "xs.length() != 0";
        let tree = fixture::parse(source).unwrap();
        let m = single_match(&rules, &tree, &ctx);
        assert!(m.negated);
        let edit = rewrite(rules.rule(m.rule), &m, source).unwrap();
        assert_eq!(edit.replacement, "!xs.isEmpty()");
    }

    #[test]
    fn test_rewrite_negated_uses_dedicated_form() {
        let yaml = r#"
- name: length_check_to_is_empty
  description: Prefer isEmpty() over comparing length() with zero
  negatable: true
  placeholders:
    seq: {}
  before:
    - node: binary
      op: "=="
      lhs: { node: call, name: length, recv: { bind: seq } }
      rhs: { lit: 0 }
  after: { node: call, name: isEmpty, recv: { bind: seq } }
  after_negated: { node: call, name: isNotEmpty, recv: { bind: seq } }
"#;
        let rules = ruleset(yaml);
        let ctx = AssignabilityTable::new();
        let source = "xs.length() != 0";
        let tree = fixture::parse(source).unwrap();
        let m = single_match(&rules, &tree, &ctx);
        let edit = rewrite(rules.rule(m.rule), &m, source).unwrap();
        assert_eq!(edit.replacement, "xs.isNotEmpty()");
    }

    #[test]
    fn test_rewrite_splices_sequence() {
        let yaml = r#"
- name: chained_min
  description: Collapse min(min(a, b), rest) into one min
  placeholders:
    a: {}
    b: {}
    rest: { repeated: true }
  before:
    - node: call
      name: min
      args:
        - node: call
          name: min
          args: [ { bind: a }, { bind: b } ]
        - bind: rest
  after:
    node: call
    name: min
    args: [ { bind: a }, { bind: b }, { bind: rest } ]
"#;
        let rules = ruleset(yaml);
        let ctx = AssignabilityTable::new();
        let source = "min(min(x, y), z, w)";
        let tree = fixture::parse(source).unwrap();
        // The inner min(x, y) is not itself a match (its first argument is
        // not a min call), so exactly one match survives.
        let m = single_match(&rules, &tree, &ctx);
        let edit = rewrite(rules.rule(m.rule), &m, source).unwrap();
        assert_eq!(edit.replacement, "min(x, y, z, w)");

        // An empty tail splices to nothing.
        let source = "min(min(x, y))";
        let tree = fixture::parse(source).unwrap();
        let m = single_match(&rules, &tree, &ctx);
        let edit = rewrite(rules.rule(m.rule), &m, source).unwrap();
        assert_eq!(edit.replacement, "min(x, y)");
    }

    #[test]
    fn test_rewrite_carries_import() {
        let yaml = r#"
- name: f_to_g
  description: rename f to helper g
  import:
    symbol: util.Helpers
    policy: always
  placeholders:
    x: {}
  before:
    - node: call
      name: f
      args: [ { bind: x } ]
  after: { node: call, name: g, args: [ { bind: x } ] }
"#;
        let rules = ruleset(yaml);
        let ctx = AssignabilityTable::new();
        let source = "f(a)";
        let tree = fixture::parse(source).unwrap();
        let m = single_match(&rules, &tree, &ctx);
        let edit = rewrite(rules.rule(m.rule), &m, source).unwrap();
        let import = edit.import.unwrap();
        assert_eq!(import.symbol, "util.Helpers");
    }

    #[test]
    fn test_negate_fragment_forms() {
        // Comparison complements.
        let cmp = Expr::binary(BinaryOp::Eq, Expr::ident("a"), Expr::lit(Lit::Int(0)));
        let negated = negate_fragment(cmp);
        assert!(matches!(
            negated.kind,
            ExprKind::Binary { op: BinaryOp::Ne, .. }
        ));

        // Double negation unwraps.
        let not_a = Expr::unary(UnaryOp::Not, Expr::ident("a"));
        assert!(matches!(negate_fragment(not_a).kind, ExprKind::Ident(_)));

        // Anything else wraps.
        let call = Expr::call(Some(Expr::ident("xs")), "isEmpty", vec![]);
        let negated = negate_fragment(call);
        assert!(matches!(
            negated.kind,
            ExprKind::Unary { op: UnaryOp::Not, .. }
        ));

        // `&&` has no complement and wraps.
        let conj = Expr::binary(BinaryOp::And, Expr::ident("a"), Expr::ident("b"));
        let negated = negate_fragment(conj);
        assert!(matches!(
            negated.kind,
            ExprKind::Unary { op: UnaryOp::Not, .. }
        ));
    }
}

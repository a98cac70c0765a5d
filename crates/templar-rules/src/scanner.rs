//! Tree scanner: finds every rule match at every nesting level.

use templar_core::tree::{Expr, ExprKind};
use templar_core::types::TypeContext;
use templar_core::visitor::{visit, Visitor};
use templar_core::Span;

use crate::pattern::RuleSet;
use crate::unify::{Binding, Unifier};

/// One successful unification of a rule alternative with a tree fragment.
#[derive(Debug)]
pub struct Match<'t> {
    /// Position of the rule in the ruleset.
    pub rule: usize,
    /// Which before-alternative matched.
    pub alternative: usize,
    /// Span of the matched fragment.
    pub span: Span,
    /// The matched node itself.
    pub node: &'t Expr,
    pub binding: Binding<'t>,
    /// The pattern matched the logical negation of the fragment.
    pub negated: bool,
    /// Scan sequence number; the final arbitration tie-break.
    pub seq: usize,
}

/// Scan a tree against every rule in the set, collecting all matches.
///
/// Every node is visited once per rule alternative; descent never stops at
/// a match, so matches nested inside other matches are still discovered.
/// For one (node, rule) pair the first alternative that unifies wins, with
/// the negated attempt tried only after every direct alternative failed.
pub fn scan<'t>(tree: &'t Expr, rules: &RuleSet, ctx: &dyn TypeContext) -> Vec<Match<'t>> {
    let mut visitor = ScanVisitor {
        rules,
        ctx,
        matches: Vec::new(),
        seq: 0,
    };
    visit(&mut visitor, tree);
    visitor.matches
}

struct ScanVisitor<'r, 'c, 't> {
    rules: &'r RuleSet,
    ctx: &'c dyn TypeContext,
    matches: Vec<Match<'t>>,
    seq: usize,
}

impl<'r, 'c, 't> Visitor<'t> for ScanVisitor<'r, 'c, 't> {
    fn visit_expr(&mut self, expr: &'t Expr) -> bool {
        // Parenthesized nodes are cosmetic: their inner expression is
        // visited on its own, matching it here too would just produce a
        // duplicate at a wider span.
        if matches!(expr.kind, ExprKind::Paren(_)) {
            return true;
        }

        for (pos, rule) in self.rules.rules().iter().enumerate() {
            let unifier = Unifier::new(&rule.placeholders, self.ctx);

            let mut direct = None;
            for (alternative, pattern) in rule.alternatives.iter().enumerate() {
                if let Some(binding) = unifier.unify(pattern, expr) {
                    direct = Some((alternative, binding));
                    break;
                }
            }

            let (alternative, binding, negated) = match direct {
                Some((alternative, binding)) => (alternative, binding, false),
                None if rule.negatable => {
                    let mut negated = None;
                    for (alternative, pattern) in rule.alternatives.iter().enumerate() {
                        if let Some(binding) = unifier.unify_negated(pattern, expr) {
                            negated = Some((alternative, binding));
                            break;
                        }
                    }
                    match negated {
                        Some((alternative, binding)) => (alternative, binding, true),
                        None => continue,
                    }
                }
                None => continue,
            };

            self.matches.push(Match {
                rule: pos,
                alternative,
                span: expr.span,
                node: expr,
                binding,
                negated,
                seq: self.seq,
            });
            self.seq += 1;
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile_catalog;
    use crate::schema::RuleSpec;
    use templar_core::fixture;
    use templar_core::types::AssignabilityTable;

    fn ruleset(yaml: &str) -> RuleSet {
        let specs: Vec<RuleSpec> = serde_yaml::from_str(yaml).unwrap();
        let (rules, excluded) = compile_catalog(&specs);
        assert!(excluded.is_empty(), "excluded: {:?}", excluded);
        rules
    }

    const CATALOG: &str = r#"
- name: length_check_to_is_empty
  description: Prefer isEmpty() over comparing length() with zero
  negatable: true
  placeholders:
    seq: {}
  before:
    - node: binary
      op: "<="
      lhs: { node: call, name: length, recv: { bind: seq } }
      rhs: { lit: 0 }
    - node: binary
      op: "<"
      lhs: { node: call, name: length, recv: { bind: seq } }
      rhs: { lit: 1 }
    - node: binary
      op: "=="
      lhs: { node: call, name: length, recv: { bind: seq } }
      rhs: { lit: 0 }
  after: { node: call, name: isEmpty, recv: { bind: seq } }
"#;

    #[test]
    fn test_scan_finds_match_and_records_alternative() {
        let rules = ruleset(CATALOG);
        let ctx = AssignabilityTable::new();

        let tree = fixture::parse("xs.length() < 1").unwrap();
        let matches = scan(&tree, &rules, &ctx);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].alternative, 1);
        assert!(!matches[0].negated);
    }

    #[test]
    fn test_scan_finds_nested_matches() {
        let rules = ruleset(CATALOG);
        let ctx = AssignabilityTable::new();

        // A match nested inside a lambda inside a larger expression.
        let source = "filter(items, x -> x.children().length() == 0) || ys.length() <= 0";
        let tree = fixture::parse(source).unwrap();
        let matches = scan(&tree, &rules, &ctx);
        assert_eq!(matches.len(), 2);
        let spans: Vec<&str> = matches.iter().map(|m| m.span.text(source)).collect();
        assert!(spans.contains(&"x.children().length() == 0"));
        assert!(spans.contains(&"ys.length() <= 0"));
    }

    #[test]
    fn test_scan_negated_match() {
        let rules = ruleset(CATALOG);
        let ctx = AssignabilityTable::new();

        let tree = fixture::parse("xs.length() != 0").unwrap();
        let matches = scan(&tree, &rules, &ctx);
        assert_eq!(matches.len(), 1);
        assert!(matches[0].negated);
        // `!=` is the complement of the `==` alternative.
        assert_eq!(matches[0].alternative, 2);
    }

    #[test]
    fn test_scan_no_match_is_empty() {
        let rules = ruleset(CATALOG);
        let ctx = AssignabilityTable::new();

        let tree = fixture::parse("xs.length() == 2").unwrap();
        assert!(scan(&tree, &rules, &ctx).is_empty());
    }

    #[test]
    fn test_scan_multiple_rules_same_node() {
        let yaml = r#"
- name: rule_a
  description: call of f
  placeholders:
    x: {}
  before:
    - node: call
      name: f
      args: [ { bind: x } ]
  after: { node: call, name: g, args: [ { bind: x } ] }

- name: rule_b
  description: call of f with any args
  placeholders:
    rest: { repeated: true }
  before:
    - node: call
      name: f
      args: [ { bind: rest } ]
  after: { node: call, name: h, args: [ { bind: rest } ] }
"#;
        let rules = ruleset(yaml);
        let ctx = AssignabilityTable::new();
        let tree = fixture::parse("f(a)").unwrap();
        let matches = scan(&tree, &rules, &ctx);
        // Both rules match the same node; both are recorded for the arbiter.
        assert_eq!(matches.len(), 2);
    }
}

//! Match arbitration: choosing which of the collected matches are applied.
//!
//! Three stages, each deterministic:
//! 1. suppression — a rule's match drops matches of rules it supersedes at
//!    intersecting locations;
//! 2. containment — a match strictly containing another surviving match is
//!    deferred (the inner rewrite lands first; the fixpoint re-scan gives
//!    the outer rule another chance on the rewritten region);
//! 3. overlap — among truly overlapping survivors, accept greedily in
//!    priority order.

use crate::pattern::RuleSet;
use crate::scanner::Match;

/// Which of two overlapping matches survives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Winner {
    First,
    Second,
}

/// Pluggable priority for truly overlapping matches (partial intersection
/// or equal spans). Must be deterministic for a given catalog.
pub trait OverlapPolicy: Send + Sync {
    fn choose(&self, rules: &RuleSet, a: &Match<'_>, b: &Match<'_>) -> Winner;
}

/// Default priority: catalog declaration order, then specificity of the
/// matched alternative, then first declared alternative, then scan order.
#[derive(Debug, Default)]
pub struct DefaultPolicy;

impl OverlapPolicy for DefaultPolicy {
    fn choose(&self, rules: &RuleSet, a: &Match<'_>, b: &Match<'_>) -> Winner {
        let rule_a = rules.rule(a.rule);
        let rule_b = rules.rule(b.rule);
        let key_a = (
            rule_a.index,
            u32::MAX - rule_a.alt_specificity[a.alternative],
            a.alternative,
            a.seq,
        );
        let key_b = (
            rule_b.index,
            u32::MAX - rule_b.alt_specificity[b.alternative],
            b.alternative,
            b.seq,
        );
        if key_a <= key_b {
            Winner::First
        } else {
            Winner::Second
        }
    }
}

/// Two matches contend for the same text: intersecting spans, or the same
/// node when spans are synthetic (nodes built by an earlier pass).
fn conflicts(a: &Match<'_>, b: &Match<'_>) -> bool {
    std::ptr::eq(a.node, b.node) || a.span.intersects(b.span)
}

/// Reduce the collected matches to the accepted, pairwise-disjoint subset,
/// sorted by span start.
pub fn arbitrate<'t>(
    rules: &RuleSet,
    matches: Vec<Match<'t>>,
    policy: &dyn OverlapPolicy,
) -> Vec<Match<'t>> {
    let mut alive: Vec<bool> = vec![true; matches.len()];

    // Stage 1: suppression. Dropped even absent a span conflict between the
    // pair under the normal rules (containment included).
    for (i, m) in matches.iter().enumerate() {
        let superseder = rules.rule(m.rule);
        if superseder.supersedes.is_empty() {
            continue;
        }
        for (j, other) in matches.iter().enumerate() {
            if i == j || !alive[j] {
                continue;
            }
            let superseded = rules.rule(other.rule);
            if superseder.supersedes.iter().any(|n| *n == superseded.name)
                && conflicts(m, other)
            {
                alive[j] = false;
            }
        }
    }

    // Stage 2: containment. The outer match is deferred to a later pass.
    for i in 0..matches.len() {
        if !alive[i] {
            continue;
        }
        for j in 0..matches.len() {
            if i == j || !alive[j] {
                continue;
            }
            if matches[i].span.strictly_contains(matches[j].span) {
                alive[i] = false;
                break;
            }
        }
    }

    // Stage 3: true overlap. Greedy acceptance in priority order.
    let mut order: Vec<usize> = (0..matches.len()).filter(|&i| alive[i]).collect();
    order.sort_by(|&a, &b| {
        match policy.choose(rules, &matches[a], &matches[b]) {
            Winner::First => std::cmp::Ordering::Less,
            Winner::Second => std::cmp::Ordering::Greater,
        }
    });

    let mut accepted_idx: Vec<usize> = Vec::new();
    for i in order {
        if accepted_idx
            .iter()
            .all(|&j| !conflicts(&matches[i], &matches[j]))
        {
            accepted_idx.push(i);
        }
    }

    accepted_idx.sort_unstable();
    let mut out: Vec<Match<'t>> = matches
        .into_iter()
        .enumerate()
        .filter_map(|(i, m)| accepted_idx.binary_search(&i).is_ok().then_some(m))
        .collect();
    out.sort_by_key(|m| (m.span.start, m.seq));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile_catalog;
    use crate::scanner::scan;
    use crate::schema::RuleSpec;
    use templar_core::fixture;
    use templar_core::types::AssignabilityTable;

    fn ruleset(yaml: &str) -> RuleSet {
        let specs: Vec<RuleSpec> = serde_yaml::from_str(yaml).unwrap();
        let (rules, excluded) = compile_catalog(&specs);
        assert!(excluded.is_empty(), "excluded: {:?}", excluded);
        rules
    }

    #[test]
    fn test_disjoint_matches_all_accepted() {
        let rules = ruleset(
            r#"
- name: f_to_g
  description: rename f to g
  placeholders:
    x: {}
  before:
    - node: call
      name: f
      args: [ { bind: x } ]
  after: { node: call, name: g, args: [ { bind: x } ] }
"#,
        );
        let ctx = AssignabilityTable::new();
        let tree = fixture::parse("f(a) && f(b)").unwrap();
        let matches = scan(&tree, &rules, &ctx);
        let accepted = arbitrate(&rules, matches, &DefaultPolicy);
        assert_eq!(accepted.len(), 2);
        assert!(accepted[0].span.start < accepted[1].span.start);
    }

    #[test]
    fn test_containment_defers_outer() {
        let rules = ruleset(
            r#"
- name: unwrap_h
  description: h(x) becomes x
  placeholders:
    x: {}
  before:
    - node: call
      name: h
      args: [ { bind: x } ]
  after: { bind: x }
"#,
        );
        let ctx = AssignabilityTable::new();
        // h(h(a)): the outer call contains the inner one.
        let source = "h(h(a))";
        let tree = fixture::parse(source).unwrap();
        let matches = scan(&tree, &rules, &ctx);
        assert_eq!(matches.len(), 2);
        let accepted = arbitrate(&rules, matches, &DefaultPolicy);
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].span.text(source), "h(a)");
    }

    #[test]
    fn test_equal_spans_resolved_by_catalog_order() {
        let rules = ruleset(
            r#"
- name: first_rule
  description: f(x) to g(x)
  placeholders:
    x: {}
  before:
    - node: call
      name: f
      args: [ { bind: x } ]
  after: { node: call, name: g, args: [ { bind: x } ] }

- name: second_rule
  description: f with any args to h
  placeholders:
    rest: { repeated: true }
  before:
    - node: call
      name: f
      args: [ { bind: rest } ]
  after: { node: call, name: h, args: [ { bind: rest } ] }
"#,
        );
        let ctx = AssignabilityTable::new();
        let tree = fixture::parse("f(a)").unwrap();

        // Repeated runs select the same winner every time.
        for _ in 0..3 {
            let matches = scan(&tree, &rules, &ctx);
            assert_eq!(matches.len(), 2);
            let accepted = arbitrate(&rules, matches, &DefaultPolicy);
            assert_eq!(accepted.len(), 1);
            assert_eq!(rules.rule(accepted[0].rule).name, "first_rule");
        }
    }

    #[test]
    fn test_suppression_drops_superseded() {
        let rules = ruleset(
            r#"
- name: narrow
  description: f(a) handled specially
  supersedes: [wide]
  before:
    - node: call
      name: f
      args: [ { node: ident, name: a } ]
  after: { node: call, name: special, args: [ { node: ident, name: a } ] }

- name: wide
  description: any f call
  placeholders:
    rest: { repeated: true }
  before:
    - node: call
      name: f
      args: [ { bind: rest } ]
  after: { node: call, name: generic, args: [ { bind: rest } ] }
"#,
        );
        let ctx = AssignabilityTable::new();

        let tree = fixture::parse("f(a)").unwrap();
        let matches = scan(&tree, &rules, &ctx);
        assert_eq!(matches.len(), 2);
        let accepted = arbitrate(&rules, matches, &DefaultPolicy);
        assert_eq!(accepted.len(), 1);
        assert_eq!(rules.rule(accepted[0].rule).name, "narrow");

        // Elsewhere, the superseded rule still applies.
        let tree = fixture::parse("f(b)").unwrap();
        let matches = scan(&tree, &rules, &ctx);
        let accepted = arbitrate(&rules, matches, &DefaultPolicy);
        assert_eq!(accepted.len(), 1);
        assert_eq!(rules.rule(accepted[0].rule).name, "wide");
    }

    #[test]
    fn test_specificity_breaks_ties_within_equal_index() {
        // One rule, two alternatives matching the same node: the first
        // alternative that unifies wins at scan time, so arbitration never
        // sees the pair. What it does see is two different rules at the
        // same span with the same declaration getting distinct indexes, so
        // the index decides; this test pins the specificity ordering used
        // when indexes are equal (same rule matched at the same span via
        // direct and negated scans cannot happen either, hence the direct
        // key comparison).
        let rules = ruleset(
            r#"
- name: only
  description: any call of f
  placeholders:
    x: {}
  before:
    - node: call
      name: f
      args: [ { bind: x } ]
  after: { bind: x }
"#,
        );
        let ctx = AssignabilityTable::new();
        let tree = fixture::parse("f(a)").unwrap();
        let mut matches = scan(&tree, &rules, &ctx);
        let m = matches.pop().unwrap();
        // A match never conflicts with itself in practice; the policy must
        // still answer deterministically.
        let again = scan(&tree, &rules, &ctx).pop().unwrap();
        assert_eq!(DefaultPolicy.choose(&rules, &m, &again), Winner::First);
    }
}

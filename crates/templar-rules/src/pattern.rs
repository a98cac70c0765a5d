//! Compiled pattern model.
//!
//! The rule compiler lowers the serde schema into these types once per
//! catalog; the unifier and rewriter work only on compiled patterns. Rules
//! are immutable after compilation and shared read-only across scans.

use std::collections::{BTreeSet, HashMap};

use templar_core::tree::{BinaryOp, Lit, UnaryOp};
use templar_core::types::TypeExpr;
use templar_core::ImportEdit;

pub type PlaceholderId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Single,
    /// Binds an ordered sequence in a trailing variadic position.
    Repeated,
}

/// A declared, typed pattern variable.
#[derive(Debug, Clone)]
pub struct Placeholder {
    pub name: String,
    /// `None` matches any fragment regardless of type.
    pub constraint: Option<TypeExpr>,
    pub arity: Arity,
}

/// A compiled template tree.
#[derive(Debug, Clone)]
pub enum Pattern {
    /// Placeholder reference.
    Bind(PlaceholderId),
    /// Exact identifier.
    Ident(String),
    /// Exact-value literal.
    Lit(Lit),
    Call {
        recv: Option<Box<Pattern>>,
        name: String,
        args: Vec<Pattern>,
    },
    Member {
        object: Box<Pattern>,
        name: String,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Pattern>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Pattern>,
        rhs: Box<Pattern>,
    },
    Lambda {
        params: Vec<Pattern>,
        body: Box<Pattern>,
    },
}

impl Pattern {
    /// Structural constrainedness, used as an arbitration tie-break: every
    /// concrete node, name, operator, or literal counts; placeholders do
    /// not.
    pub fn specificity(&self) -> u32 {
        match self {
            Pattern::Bind(_) => 0,
            Pattern::Ident(_) => 2,
            Pattern::Lit(_) => 2,
            Pattern::Call { recv, args, .. } => {
                2 + recv.as_deref().map_or(0, Pattern::specificity)
                    + args.iter().map(Pattern::specificity).sum::<u32>()
            }
            Pattern::Member { object, .. } => 2 + object.specificity(),
            Pattern::Unary { operand, .. } => 1 + operand.specificity(),
            Pattern::Binary { lhs, rhs, .. } => 1 + lhs.specificity() + rhs.specificity(),
            Pattern::Lambda { params, body } => {
                1 + params.iter().map(Pattern::specificity).sum::<u32>() + body.specificity()
            }
        }
    }

    /// Collect every placeholder referenced in this pattern.
    pub fn referenced_placeholders(&self, out: &mut BTreeSet<PlaceholderId>) {
        match self {
            Pattern::Bind(id) => {
                out.insert(*id);
            }
            Pattern::Ident(_) | Pattern::Lit(_) => {}
            Pattern::Call { recv, args, .. } => {
                if let Some(recv) = recv {
                    recv.referenced_placeholders(out);
                }
                for arg in args {
                    arg.referenced_placeholders(out);
                }
            }
            Pattern::Member { object, .. } => object.referenced_placeholders(out),
            Pattern::Unary { operand, .. } => operand.referenced_placeholders(out),
            Pattern::Binary { lhs, rhs, .. } => {
                lhs.referenced_placeholders(out);
                rhs.referenced_placeholders(out);
            }
            Pattern::Lambda { params, body } => {
                for param in params {
                    param.referenced_placeholders(out);
                }
                body.referenced_placeholders(out);
            }
        }
    }
}

/// An executable rule: compiled alternatives, after-template, metadata.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    /// Stable catalog index assigned at compile time; the arbitration
    /// priority order, independent of how the catalog was loaded.
    pub index: usize,
    pub name: String,
    pub description: String,
    pub placeholders: Vec<Placeholder>,
    pub alternatives: Vec<Pattern>,
    /// Specificity per alternative, aligned with `alternatives`.
    pub alt_specificity: Vec<u32>,
    pub after: Pattern,
    pub after_negated: Option<Pattern>,
    pub negatable: bool,
    pub import: Option<ImportEdit>,
    pub supersedes: Vec<String>,
    pub behavior_preserving: bool,
}

/// The compiled, immutable ruleset shared across all scans.
#[derive(Debug, Default)]
pub struct RuleSet {
    rules: Vec<CompiledRule>,
    by_name: HashMap<String, usize>,
}

/// Summary of one compiled rule, for listings.
#[derive(Debug, Clone)]
pub struct RuleInfo {
    pub name: String,
    pub description: String,
    pub negatable: bool,
    pub behavior_preserving: bool,
    pub alternatives: usize,
}

impl RuleSet {
    pub fn new(rules: Vec<CompiledRule>) -> Self {
        let by_name = rules
            .iter()
            .enumerate()
            .map(|(pos, r)| (r.name.clone(), pos))
            .collect();
        Self { rules, by_name }
    }

    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rule at a scanner/arbiter position.
    pub fn rule(&self, pos: usize) -> &CompiledRule {
        &self.rules[pos]
    }

    pub fn rule_by_name(&self, name: &str) -> Option<&CompiledRule> {
        self.by_name.get(name).map(|&pos| &self.rules[pos])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Summaries of all compiled rules in catalog order.
    pub fn list_rules(&self) -> Vec<RuleInfo> {
        self.rules
            .iter()
            .map(|r| RuleInfo {
                name: r.name.clone(),
                description: r.description.clone(),
                negatable: r.negatable,
                behavior_preserving: r.behavior_preserving,
                alternatives: r.alternatives.len(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_specificity_prefers_constrained() {
        // `xs.length() == 0` with a bound receiver...
        let constrained = Pattern::Binary {
            op: BinaryOp::Eq,
            lhs: Box::new(Pattern::Call {
                recv: Some(Box::new(Pattern::Bind(0))),
                name: "length".into(),
                args: vec![],
            }),
            rhs: Box::new(Pattern::Lit(Lit::Int(0))),
        };
        // ...is more specific than any comparison of two placeholders.
        let general = Pattern::Binary {
            op: BinaryOp::Eq,
            lhs: Box::new(Pattern::Bind(0)),
            rhs: Box::new(Pattern::Bind(1)),
        };
        assert!(constrained.specificity() > general.specificity());
    }

    #[test]
    fn test_referenced_placeholders() {
        let pattern = Pattern::Call {
            recv: Some(Box::new(Pattern::Bind(2))),
            name: "f".into(),
            args: vec![Pattern::Bind(0), Pattern::Bind(2)],
        };
        let mut out = BTreeSet::new();
        pattern.referenced_placeholders(&mut out);
        assert_eq!(out.into_iter().collect::<Vec<_>>(), vec![0, 2]);
    }
}

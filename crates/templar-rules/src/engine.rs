//! The rewrite pipeline: scan, arbitrate, rewrite, apply — iterated to a
//! bounded fixpoint.
//!
//! Two application strategies, per the edit-applier contract:
//! - `check` produces span edits for one pass; `templar_core::apply_edits`
//!   applies them rightmost-first to text.
//! - `rewrite_to_fixpoint` rebuilds the tree bottom-up after each pass and
//!   re-scans the result, so matches revealed by earlier rewrites (an outer
//!   match deferred behind an inner one, or a fresh match in a rewritten
//!   region) are picked up on the next pass. The pass count is bounded:
//!   a catalog whose after-form re-matches its own before-form terminates
//!   with a diagnosable error instead of oscillating.

use std::collections::HashMap;

use rayon::prelude::*;
use templar_core::tree::{render, Expr, ExprKind};
use templar_core::types::TypeContext;
use templar_core::{resolve_imports, Edit, EditError, ImportEdit, ImportTable, Span};
use thiserror::Error;

use crate::arbiter::{arbitrate, DefaultPolicy, OverlapPolicy};
use crate::findings::Finding;
use crate::pattern::RuleSet;
use crate::rewriter::{instantiate, rewrite, RewriteError};
use crate::scanner::scan;

#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    /// Maximum number of rewriting passes before fixpoint failure.
    pub max_passes: usize,
    /// Apply rules tagged `behavior_preserving: false` instead of reporting
    /// them advisory-only.
    pub apply_non_preserving: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            max_passes: 8,
            apply_non_preserving: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Rewrite(#[from] RewriteError),

    #[error(transparent)]
    Edit(#[from] EditError),

    #[error("fixpoint not reached after {passes} passes; rules still firing: {rules:?}")]
    FixpointExceeded { passes: usize, rules: Vec<String> },
}

/// Result of rewriting one source unit.
#[derive(Debug)]
pub struct Outcome {
    /// The rewritten source text.
    pub text: String,
    /// Findings for every accepted match, applied or advisory.
    pub findings: Vec<Finding>,
    /// Qualified symbols to import, after policy resolution.
    pub imports: Vec<String>,
    /// Rewriting passes performed.
    pub passes: usize,
}

/// One independent source unit for the parallel driver.
#[derive(Debug)]
pub struct SourceUnit {
    pub name: String,
    pub source: String,
    pub tree: Expr,
    pub imports: ImportTable,
}

/// The engine: a compiled ruleset plus arbitration and application policy.
/// Immutable and shared read-only across workers.
pub struct Engine<'r> {
    rules: &'r RuleSet,
    policy: Box<dyn OverlapPolicy>,
    options: EngineOptions,
}

impl<'r> Engine<'r> {
    pub fn new(rules: &'r RuleSet) -> Self {
        Self {
            rules,
            policy: Box::new(DefaultPolicy),
            options: EngineOptions::default(),
        }
    }

    pub fn with_policy(mut self, policy: Box<dyn OverlapPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    /// One scan → arbitrate → rewrite pass, producing text edits.
    ///
    /// Every accepted match yields a finding; only applicable matches
    /// (behavior-preserving, or all of them when the engine was told to
    /// apply non-preserving rewrites) yield edits.
    pub fn check(
        &self,
        tree: &Expr,
        source: &str,
        ctx: &dyn TypeContext,
    ) -> Result<(Vec<Edit>, Vec<Finding>), EngineError> {
        let matches = scan(tree, self.rules, ctx);
        let accepted = arbitrate(self.rules, matches, &*self.policy);

        let mut edits = Vec::new();
        let mut findings = Vec::new();
        for m in &accepted {
            let rule = self.rules.rule(m.rule);
            let edit = rewrite(rule, m, source)?;
            findings.push(Finding {
                rule: rule.name.clone(),
                description: rule.description.clone(),
                span: m.span,
                suggestion: edit.replacement.clone(),
                negated: m.negated,
                behavior_preserving: rule.behavior_preserving,
            });
            if rule.behavior_preserving || self.options.apply_non_preserving {
                edits.push(edit);
            }
        }
        Ok((edits, findings))
    }

    /// Run the full pipeline until no applicable match remains, then render
    /// the rewritten tree and resolve import edits.
    pub fn rewrite_to_fixpoint(
        &self,
        tree: &Expr,
        source: &str,
        ctx: &dyn TypeContext,
        imports: &ImportTable,
    ) -> Result<Outcome, EngineError> {
        let mut current = tree.clone();
        let mut findings = Vec::new();
        let mut import_edits: Vec<ImportEdit> = Vec::new();
        let mut passes = 0;

        loop {
            let pass = self.collect_pass(&current, source, ctx)?;

            if pass.replacements.is_empty() {
                // Advisory matches never change the tree; they surface once
                // the rewriting has settled.
                findings.extend(pass.advisory);
                break;
            }

            if passes == self.options.max_passes {
                let mut rules = pass.fired;
                rules.sort();
                rules.dedup();
                return Err(EngineError::FixpointExceeded { passes, rules });
            }

            findings.extend(pass.findings);
            import_edits.extend(pass.imports);
            current = splice(&current, &pass.replacements.into_iter().collect());
            passes += 1;
        }

        Ok(Outcome {
            text: render(&current, source),
            findings,
            imports: resolve_imports(&import_edits, imports),
            passes,
        })
    }

    /// Rewrite independent units in parallel over the shared ruleset.
    /// Results keep the input order; a failed unit does not affect others.
    pub fn rewrite_units(
        &self,
        units: &[SourceUnit],
        ctx: &dyn TypeContext,
    ) -> Vec<(String, Result<Outcome, EngineError>)> {
        units
            .par_iter()
            .map(|unit| {
                (
                    unit.name.clone(),
                    self.rewrite_to_fixpoint(&unit.tree, &unit.source, ctx, &unit.imports),
                )
            })
            .collect()
    }

    /// Scan and arbitrate one pass, returning owned replacement fragments
    /// keyed by the address of the node they replace.
    fn collect_pass(
        &self,
        current: &Expr,
        source: &str,
        ctx: &dyn TypeContext,
    ) -> Result<PassOutcome, RewriteError> {
        let matches = scan(current, self.rules, ctx);
        let accepted = arbitrate(self.rules, matches, &*self.policy);

        let mut out = PassOutcome::default();
        for m in &accepted {
            let rule = self.rules.rule(m.rule);
            let fragment = instantiate(rule, m)?;
            let finding = Finding {
                rule: rule.name.clone(),
                description: rule.description.clone(),
                span: m.span,
                suggestion: render(&fragment, source),
                negated: m.negated,
                behavior_preserving: rule.behavior_preserving,
            };
            if rule.behavior_preserving || self.options.apply_non_preserving {
                out.replacements
                    .push((m.node as *const Expr as usize, fragment));
                out.findings.push(finding);
                out.fired.push(rule.name.clone());
                if let Some(import) = &rule.import {
                    out.imports.push(import.clone());
                }
            } else {
                out.advisory.push(finding);
            }
        }
        Ok(out)
    }
}

#[derive(Default)]
struct PassOutcome {
    replacements: Vec<(usize, Expr)>,
    findings: Vec<Finding>,
    advisory: Vec<Finding>,
    fired: Vec<String>,
    imports: Vec<ImportEdit>,
}

/// Rebuild a tree with the given nodes replaced, bottom-up. A rebuilt
/// ancestor loses its span and type annotation: its source slice and static
/// type no longer describe it.
fn splice(node: &Expr, replacements: &HashMap<usize, Expr>) -> Expr {
    let (expr, _) = splice_inner(node, replacements);
    expr
}

fn splice_inner(node: &Expr, replacements: &HashMap<usize, Expr>) -> (Expr, bool) {
    if let Some(replacement) = replacements.get(&(node as *const Expr as usize)) {
        return (replacement.clone(), true);
    }

    let (kind, changed) = match &node.kind {
        ExprKind::Ident(_) | ExprKind::Lit(_) => return (node.clone(), false),
        ExprKind::Call { recv, name, args } => {
            let mut changed = false;
            let recv = recv.as_deref().map(|r| {
                let (expr, c) = splice_inner(r, replacements);
                changed |= c;
                Box::new(expr)
            });
            let args = args
                .iter()
                .map(|a| {
                    let (expr, c) = splice_inner(a, replacements);
                    changed |= c;
                    expr
                })
                .collect();
            (
                ExprKind::Call {
                    recv,
                    name: name.clone(),
                    args,
                },
                changed,
            )
        }
        ExprKind::Member { object, name } => {
            let (object, changed) = splice_inner(object, replacements);
            (
                ExprKind::Member {
                    object: Box::new(object),
                    name: name.clone(),
                },
                changed,
            )
        }
        ExprKind::Unary { op, operand } => {
            let (operand, changed) = splice_inner(operand, replacements);
            (
                ExprKind::Unary {
                    op: *op,
                    operand: Box::new(operand),
                },
                changed,
            )
        }
        ExprKind::Binary { op, lhs, rhs } => {
            let (lhs, c1) = splice_inner(lhs, replacements);
            let (rhs, c2) = splice_inner(rhs, replacements);
            (
                ExprKind::Binary {
                    op: *op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                c1 || c2,
            )
        }
        ExprKind::Lambda { params, body } => {
            let mut changed = false;
            let params = params
                .iter()
                .map(|p| {
                    let (expr, c) = splice_inner(p, replacements);
                    changed |= c;
                    expr
                })
                .collect();
            let (body, c) = splice_inner(body, replacements);
            (
                ExprKind::Lambda {
                    params,
                    body: Box::new(body),
                },
                changed || c,
            )
        }
        ExprKind::Paren(inner) => {
            let (inner, changed) = splice_inner(inner, replacements);
            (ExprKind::Paren(Box::new(inner)), changed)
        }
    };

    if changed {
        (Expr::new(kind, Span::synthetic()), true)
    } else {
        (node.clone(), false)
    }
}

//! Inline rule-test harness.
//!
//! Rules may carry `tests:` — paired before/after fixtures with a type
//! environment. The harness compiles the rule on its own, runs each fixture
//! through the full pipeline, and reports mismatches. This is how a catalog
//! author checks soundness: for each rule, its paired fixtures must rewrite
//! exactly as declared, and an `output`-less fixture must not match.

use templar_core::fixture::{self, TypeEnv};
use templar_core::types::{AssignabilityTable, TypeExpr};
use templar_core::ImportTable;

use crate::compiler::compile_catalog;
use crate::engine::{Engine, EngineOptions};
use crate::schema::{RuleSpec, TestCase};

/// Result of running a single rule test case.
#[derive(Debug)]
pub struct TestOutcome {
    pub rule: String,
    pub input: String,
    pub expected: Option<String>,
    pub actual: Option<String>,
    pub passed: bool,
    pub error: Option<String>,
}

/// Run every (non-skipped) test case of every rule in the catalog.
///
/// Each rule is compiled and exercised in isolation so fixtures pin the
/// rule they belong to, not catalog-wide interaction.
pub fn run_catalog_tests(specs: &[RuleSpec]) -> Vec<TestOutcome> {
    specs
        .iter()
        .flat_map(|spec| {
            spec.tests
                .iter()
                .filter(|t| !t.skip)
                .map(|t| run_single_test(spec, t))
                .collect::<Vec<_>>()
        })
        .collect()
}

fn run_single_test(spec: &RuleSpec, test: &TestCase) -> TestOutcome {
    let failure = |error: String| TestOutcome {
        rule: spec.name.clone(),
        input: test.input.clone(),
        expected: test.output.clone(),
        actual: None,
        passed: false,
        error: Some(error),
    };

    // The rule is compiled alone, so suppression references to catalog
    // siblings are not resolvable here; they are a catalog-level
    // interaction, not part of the rule's own rewrite.
    let mut isolated = spec.clone();
    isolated.supersedes.clear();
    let (rules, excluded) = compile_catalog(std::slice::from_ref(&isolated));
    if let Some(bad) = excluded.first() {
        return failure(format!("rule failed to compile: {}", bad.error));
    }

    let mut env = TypeEnv::new();
    for (name, ty) in &test.types {
        match TypeExpr::parse(ty) {
            Ok(parsed) => {
                env.insert(name.clone(), parsed);
            }
            Err(e) => return failure(format!("bad type for `{}`: {}", name, e)),
        }
    }
    let mut ctx = AssignabilityTable::new();
    for (sub, sup) in &test.subtypes {
        ctx.declare(sub.clone(), sup.clone());
    }

    let tree = match fixture::parse_typed(&test.input, &env) {
        Ok(tree) => tree,
        Err(e) => return failure(format!("fixture failed to parse: {}", e)),
    };

    // Fixtures exercise the rule as declared, including non-preserving ones.
    let engine = Engine::new(&rules).with_options(EngineOptions {
        apply_non_preserving: true,
        ..EngineOptions::default()
    });
    let outcome =
        match engine.rewrite_to_fixpoint(&tree, &test.input, &ctx, &ImportTable::new()) {
            Ok(outcome) => outcome,
            Err(e) => return failure(format!("rewrite failed: {}", e)),
        };

    match &test.output {
        Some(expected) => {
            let passed = &outcome.text == expected && outcome.passes > 0;
            TestOutcome {
                rule: spec.name.clone(),
                input: test.input.clone(),
                expected: Some(expected.clone()),
                actual: Some(outcome.text),
                passed,
                error: None,
            }
        }
        None => {
            // No expected output: the rule must not match at all.
            let passed = outcome.findings.is_empty();
            TestOutcome {
                rule: spec.name.clone(),
                input: test.input.clone(),
                expected: None,
                actual: (!passed).then_some(outcome.text),
                passed,
                error: (!passed).then(|| "expected no match but rule matched".to_string()),
            }
        }
    }
}

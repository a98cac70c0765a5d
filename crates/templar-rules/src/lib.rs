//! templar-rules: declarative rewrite-rule engine
//!
//! A catalog of before/after rewrite rules with typed placeholders is
//! compiled once, then matched against abstract expression trees:
//! - `schema` / `loader`: the YAML catalog format and its loading
//! - `compiler`: validation and lowering into executable compiled rules
//! - `unify`: pattern unification with typed, possibly repeated placeholders
//! - `scanner`: full-depth match collection
//! - `arbiter`: suppression, containment, and overlap resolution
//! - `rewriter`: after-template instantiation and edit production
//! - `engine`: the scan → arbitrate → rewrite → apply pipeline, bounded
//!   fixpoint iteration, and the parallel multi-unit driver
//! - `harness`: runs the catalog's inline before/after fixtures

pub mod arbiter;
pub mod compiler;
pub mod engine;
pub mod findings;
pub mod harness;
pub mod loader;
pub mod pattern;
pub mod rewriter;
pub mod scanner;
pub mod schema;
pub mod unify;

pub use arbiter::{arbitrate, DefaultPolicy, OverlapPolicy, Winner};
pub use compiler::{compile_catalog, compile_rule, CompileError, ExcludedRule};
pub use engine::{Engine, EngineError, EngineOptions, Outcome, SourceUnit};
pub use findings::Finding;
pub use harness::{run_catalog_tests, TestOutcome};
pub use loader::{
    load_catalog_from_dir, load_catalog_from_file, load_catalog_from_string, specs_from_string,
    LoadError, LoadedCatalog,
};
pub use pattern::{Arity, CompiledRule, Pattern, Placeholder, RuleInfo, RuleSet};
pub use rewriter::{instantiate, rewrite, RewriteError};
pub use scanner::{scan, Match};
pub use schema::{
    ImportPolicySpec, ImportSpec, LitSpec, NodeSpec, PatternSpec, PlaceholderSpec, RuleSpec,
    TestCase,
};
pub use unify::{Binding, Unifier};

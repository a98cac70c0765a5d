//! Rule catalog schema definitions
//!
//! Defines the structure of declarative rewrite rules using serde for
//! deserialization from YAML. A rule names its typed placeholders, gives one
//! or more interchangeable "before" patterns, and one "after" pattern the
//! matches are rewritten to.
//!
//! # Example rule
//!
//! ```yaml
//! name: length_check_to_is_empty
//! description: Prefer isEmpty() over comparing length() with zero
//! negatable: true
//! placeholders:
//!   seq: "Sequence<E>"
//! before:
//!   - node: binary
//!     op: "<="
//!     lhs: { node: call, name: length, recv: { bind: seq } }
//!     rhs: { lit: 0 }
//!   - node: binary
//!     op: "=="
//!     lhs: { node: call, name: length, recv: { bind: seq } }
//!     rhs: { lit: 0 }
//! after: { node: call, name: isEmpty, recv: { bind: seq } }
//! tests:
//!   - input: "xs.length() == 0"
//!     output: "xs.isEmpty()"
//!     types: { xs: "Sequence<Int>" }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use templar_core::ImportPolicy;

/// A complete declarative rewrite rule.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RuleSpec {
    /// Unique rule identifier (e.g., "length_check_to_is_empty").
    pub name: String,

    /// Human-readable description.
    pub description: String,

    /// Placeholder declarations: name -> type constraint and arity.
    #[serde(default)]
    pub placeholders: BTreeMap<String, PlaceholderSpec>,

    /// Interchangeable "before" patterns, tried in order.
    pub before: Vec<PatternSpec>,

    /// The canonical replacement pattern.
    pub after: PatternSpec,

    /// Replacement used for negated matches instead of wrapping `after`
    /// in a logical not.
    #[serde(default)]
    pub after_negated: Option<PatternSpec>,

    /// Whether the rule also applies to the logical negation of a match.
    #[serde(default)]
    pub negatable: bool,

    /// Auxiliary import edit to request alongside the rewrite.
    #[serde(default)]
    pub import: Option<ImportSpec>,

    /// Names of rules whose matches this rule supersedes at its locations.
    #[serde(default)]
    pub supersedes: Vec<String>,

    /// Whether the rewrite preserves behavior exactly. Non-preserving rules
    /// are reported but only applied when the caller opts in.
    #[serde(default = "default_true")]
    pub behavior_preserving: bool,

    /// Test cases (recommended for validation).
    #[serde(default)]
    pub tests: Vec<TestCase>,
}

fn default_true() -> bool {
    true
}

/// Placeholder declaration: a bare type string, or type plus arity.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum PlaceholderSpec {
    /// Shorthand: `seq: "Sequence<E>"`.
    Type(String),

    /// Full form: `rest: { type: "E", repeated: true }`.
    Detailed {
        #[serde(rename = "type", default)]
        ty: Option<String>,
        #[serde(default)]
        repeated: bool,
    },
}

impl PlaceholderSpec {
    pub fn ty(&self) -> Option<&str> {
        match self {
            PlaceholderSpec::Type(t) => Some(t),
            PlaceholderSpec::Detailed { ty, .. } => ty.as_deref(),
        }
    }

    pub fn repeated(&self) -> bool {
        match self {
            PlaceholderSpec::Type(_) => false,
            PlaceholderSpec::Detailed { repeated, .. } => *repeated,
        }
    }
}

/// A pattern tree: a placeholder reference, an exact literal, or a node.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum PatternSpec {
    /// Reference to a declared placeholder.
    Bind { bind: String },

    /// Exact-value literal.
    Literal { lit: LitSpec },

    /// Structural node pattern.
    Node(NodeSpec),
}

/// Literal value matched exactly, not just by type.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum LitSpec {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

/// Pattern for a specific node kind, discriminated by `node`.
///
/// Kinds: `call`, `member`, `ident`, `unary`, `binary`, `lambda`.
/// A call pattern with no `args` field requires an empty argument list;
/// use a trailing repeated placeholder to accept arbitrary arguments.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NodeSpec {
    /// Node kind to match.
    pub node: String,

    /// Call, member, or ident name.
    #[serde(default)]
    pub name: Option<String>,

    /// Call receiver. Absent means the call must have no receiver.
    #[serde(default)]
    pub recv: Option<Box<PatternSpec>>,

    /// Member-access object.
    #[serde(default)]
    pub object: Option<Box<PatternSpec>>,

    /// Call arguments.
    #[serde(default)]
    pub args: Option<Vec<PatternSpec>>,

    /// Unary or binary operator symbol.
    #[serde(default)]
    pub op: Option<String>,

    /// Unary operand.
    #[serde(default)]
    pub operand: Option<Box<PatternSpec>>,

    /// Binary left operand.
    #[serde(default)]
    pub lhs: Option<Box<PatternSpec>>,

    /// Binary right operand.
    #[serde(default)]
    pub rhs: Option<Box<PatternSpec>>,

    /// Lambda parameter names. A name that matches a declared placeholder
    /// binds the parameter; any other name matches exactly.
    #[serde(default)]
    pub params: Option<Vec<String>>,

    /// Lambda body.
    #[serde(default)]
    pub body: Option<Box<PatternSpec>>,
}

/// Import edit requested by a rule.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ImportSpec {
    /// Qualified symbol, e.g. `collections.SeqOps`.
    pub symbol: String,

    #[serde(default)]
    pub policy: ImportPolicySpec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImportPolicySpec {
    #[default]
    Always,
    IfUsed,
    Never,
}

impl ImportPolicySpec {
    pub fn to_core(self) -> ImportPolicy {
        match self {
            ImportPolicySpec::Always => ImportPolicy::AlwaysAdd,
            ImportPolicySpec::IfUsed => ImportPolicy::AddIfUsed,
            ImportPolicySpec::Never => ImportPolicy::Never,
        }
    }
}

/// Test case for rule validation.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TestCase {
    /// Input fixture expression.
    pub input: String,

    /// Expected output; absent means the rule must not match.
    #[serde(default)]
    pub output: Option<String>,

    /// Identifier types for the fixture, name -> type expression.
    #[serde(default)]
    pub types: BTreeMap<String, String>,

    /// Subtype facts for the oracle, sub -> super.
    #[serde(default)]
    pub subtypes: BTreeMap<String, String>,

    /// Skip this test case.
    #[serde(default)]
    pub skip: bool,
}

impl RuleSpec {
    /// Validate the surface structure; deeper checks happen at compile time.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("rule name is required".to_string());
        }
        if self.description.is_empty() {
            return Err("rule description is required".to_string());
        }
        if self.before.is_empty() {
            return Err("at least one before-pattern is required".to_string());
        }
        Ok(())
    }
}

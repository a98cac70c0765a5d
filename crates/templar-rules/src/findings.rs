//! Structured findings for the reporting collaborator.

use templar_core::Span;

/// One accepted match, as surfaced to a linting/reporting collaborator.
/// How findings are printed or applied interactively is out of scope here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    /// Rule identifier.
    pub rule: String,
    /// Human-readable rule description.
    pub description: String,
    /// Location of the matched fragment in the pass it was found.
    pub span: Span,
    /// The rendered replacement.
    pub suggestion: String,
    /// The rule matched the logical negation of the fragment.
    pub negated: bool,
    /// Whether the rule's author declares the rewrite behavior-preserving.
    /// Non-preserving findings are advisory unless the engine was told to
    /// apply them.
    pub behavior_preserving: bool,
}

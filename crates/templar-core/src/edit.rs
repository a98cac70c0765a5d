//! Span-based source edits and their application.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use crate::span::Span;

/// Errors that can occur during edit application.
#[derive(Error, Debug)]
pub enum EditError {
    /// Overlapping edits surviving arbitration are a logic error, not a
    /// user-facing condition.
    #[error("overlapping edits detected at offset {0}")]
    OverlappingEdits(u32),

    #[error("edit span {span} out of bounds for source length {len}")]
    SpanOutOfBounds { span: Span, len: usize },

    #[error("edit with a synthetic span cannot be applied to text")]
    SyntheticSpan,
}

/// How an auxiliary import edit is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportPolicy {
    /// Always introduce the shorthand for the referenced symbol.
    AlwaysAdd,
    /// Introduce it only if the short name is already in use in the unit
    /// and not bound to a different symbol.
    AddIfUsed,
    Never,
}

/// Auxiliary import-style edit attached to a replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportEdit {
    /// Qualified symbol, e.g. `collections.SeqOps`.
    pub symbol: String,
    pub policy: ImportPolicy,
}

/// Represents a single code edit operation.
#[derive(Debug, Clone)]
pub struct Edit {
    /// The source span to replace.
    pub span: Span,
    /// The replacement text.
    pub replacement: String,
    /// Human-readable description of the edit.
    pub message: String,
    /// Import edit requested by the rule that produced this replacement.
    pub import: Option<ImportEdit>,
}

impl Edit {
    pub fn new(span: Span, replacement: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            span,
            replacement: replacement.into(),
            message: message.into(),
            import: None,
        }
    }

    pub fn with_import(mut self, import: ImportEdit) -> Self {
        self.import = Some(import);
        self
    }

    pub fn start_offset(&self) -> usize {
        self.span.start as usize
    }

    pub fn end_offset(&self) -> usize {
        self.span.end as usize
    }
}

/// Apply edits to source code, preserving surrounding text.
///
/// Edits are applied in reverse order (from end to start) to maintain
/// valid offsets throughout the process.
pub fn apply_edits(source: &str, edits: &[Edit]) -> Result<String, EditError> {
    if edits.is_empty() {
        return Ok(source.to_string());
    }

    // Sort edits by start position (descending) for safe replacement.
    let mut sorted_edits: Vec<&Edit> = edits.iter().collect();
    sorted_edits.sort_by(|a, b| b.start_offset().cmp(&a.start_offset()));

    // Validate: bounds and overlap.
    let source_len = source.len();
    let mut prev_start: Option<usize> = None;

    for edit in &sorted_edits {
        if edit.span.is_synthetic() {
            return Err(EditError::SyntheticSpan);
        }
        let start = edit.start_offset();
        let end = edit.end_offset();

        if end > source_len {
            return Err(EditError::SpanOutOfBounds {
                span: edit.span,
                len: source_len,
            });
        }

        if let Some(prev) = prev_start {
            if end > prev {
                return Err(EditError::OverlappingEdits(edit.span.start));
            }
        }

        prev_start = Some(start);
    }

    // Apply edits from end to start.
    let mut result = source.to_string();
    for edit in sorted_edits {
        result.replace_range(edit.start_offset()..edit.end_offset(), &edit.replacement);
    }

    Ok(result)
}

/// Existing import state of one source unit, supplied by the caller.
#[derive(Debug, Clone, Default)]
pub struct ImportTable {
    /// Short name -> qualified symbol already imported.
    imported: BTreeMap<String, String>,
    /// Short names referenced somewhere in the unit.
    referenced: BTreeSet<String>,
}

impl ImportTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The trailing segment of a dotted qualified name.
    pub fn short_name(qualified: &str) -> &str {
        qualified.rsplit('.').next().unwrap_or(qualified)
    }

    pub fn add_import(&mut self, qualified: impl Into<String>) {
        let qualified = qualified.into();
        let short = Self::short_name(&qualified).to_string();
        self.imported.insert(short, qualified);
    }

    pub fn add_reference(&mut self, short: impl Into<String>) {
        self.referenced.insert(short.into());
    }

    fn binding_of(&self, short: &str) -> Option<&str> {
        self.imported.get(short).map(String::as_str)
    }

    fn is_referenced(&self, short: &str) -> bool {
        self.referenced.contains(short)
    }
}

/// Resolve the import edits carried by a set of accepted edits against the
/// unit's existing imports, returning the qualified symbols to add.
///
/// A short name already bound to a *different* qualified symbol is never
/// shadowed: the rule's output keeps the qualified spelling and no import
/// is emitted.
pub fn resolve_imports(imports: &[ImportEdit], table: &ImportTable) -> Vec<String> {
    let mut out = BTreeSet::new();
    for import in imports {
        let short = ImportTable::short_name(&import.symbol);
        match table.binding_of(short) {
            // Already importable under this short name.
            Some(existing) if existing == import.symbol => continue,
            // Conflicting binding: leave the unit alone.
            Some(_) => continue,
            None => {}
        }
        match import.policy {
            ImportPolicy::AlwaysAdd => {
                out.insert(import.symbol.clone());
            }
            ImportPolicy::AddIfUsed => {
                if table.is_referenced(short) {
                    out.insert(import.symbol.clone());
                }
            }
            ImportPolicy::Never => {}
        }
    }
    out.into_iter().collect()
}

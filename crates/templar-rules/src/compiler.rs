//! Rule compiler: validates rule specs and lowers them into executable
//! compiled rules.
//!
//! Catalog errors are fail-soft at rule granularity: a rule that fails to
//! compile is excluded and reported, and compilation of the rest of the
//! catalog continues.

use std::collections::{BTreeMap, BTreeSet};

use templar_core::tree::{BinaryOp, Lit, UnaryOp};
use templar_core::types::{TypeExpr, TypeParseError};
use templar_core::ImportEdit;
use thiserror::Error;

use crate::pattern::{Arity, CompiledRule, Pattern, Placeholder, PlaceholderId, RuleSet};
use crate::schema::{LitSpec, NodeSpec, PatternSpec, RuleSpec};

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("{0}")]
    Invalid(String),

    #[error("unknown node kind `{0}`")]
    UnknownNodeKind(String),

    #[error("unknown operator `{op}` for {kind} pattern")]
    UnknownOperator { kind: &'static str, op: String },

    #[error("`{kind}` pattern is missing required field `{field}`")]
    MissingField { kind: &'static str, field: &'static str },

    #[error("reference to undeclared placeholder `{0}`")]
    UndeclaredPlaceholder(String),

    #[error("invalid type constraint for placeholder `{name}`: {source}")]
    BadTypeConstraint {
        name: String,
        source: TypeParseError,
    },

    #[error("repeated placeholder `{0}` must be the last call argument")]
    RepeatedNotTrailing(String),

    #[error("repeated placeholder `{0}` used outside a call argument list")]
    RepeatedOutsideArgs(String),

    #[error("more than one repeated placeholder in one pattern body")]
    MultipleRepeated,

    #[error("after-template references placeholder `{0}`, which no before-alternative binds")]
    UnboundAfterPlaceholder(String),

    #[error(
        "alternative {alternative} binds a different placeholder set than alternative 0 \
         (every alternative must produce the same binding shape)"
    )]
    InconsistentAlternatives { alternative: usize },

    #[error("supersedes target `{0}` is not a rule in this catalog")]
    UnknownSupersedes(String),
}

/// A rule excluded from the compiled ruleset, with the reason.
#[derive(Debug)]
pub struct ExcludedRule {
    pub name: String,
    pub error: CompileError,
}

/// Compile a whole catalog. Rules keep their declaration order as the
/// stable arbitration index; failed rules are excluded and reported.
pub fn compile_catalog(specs: &[RuleSpec]) -> (RuleSet, Vec<ExcludedRule>) {
    let mut compiled = Vec::new();
    let mut excluded = Vec::new();

    for (index, spec) in specs.iter().enumerate() {
        match compile_rule(spec, index) {
            Ok(rule) => compiled.push(rule),
            Err(error) => excluded.push(ExcludedRule {
                name: spec.name.clone(),
                error,
            }),
        }
    }

    // Supersedes references must name rules that survived compilation.
    let names: BTreeSet<String> = compiled.iter().map(|r| r.name.clone()).collect();
    let mut valid = Vec::new();
    for rule in compiled {
        match rule
            .supersedes
            .iter()
            .find(|target| !names.contains(*target))
        {
            Some(missing) => excluded.push(ExcludedRule {
                name: rule.name.clone(),
                error: CompileError::UnknownSupersedes(missing.clone()),
            }),
            None => valid.push(rule),
        }
    }

    (RuleSet::new(valid), excluded)
}

/// Compile a single rule, assigning the given stable catalog index.
pub fn compile_rule(spec: &RuleSpec, index: usize) -> Result<CompiledRule, CompileError> {
    spec.validate().map_err(CompileError::Invalid)?;

    let (placeholders, ids) = compile_placeholders(spec)?;
    let lowerer = Lowerer {
        placeholders: &placeholders,
        ids: &ids,
    };

    let mut alternatives = Vec::with_capacity(spec.before.len());
    let mut alt_specificity = Vec::with_capacity(spec.before.len());
    let mut alt_bound: Vec<BTreeSet<PlaceholderId>> = Vec::with_capacity(spec.before.len());
    for alt in &spec.before {
        let pattern = lowerer.lower_body(alt)?;
        let mut bound = BTreeSet::new();
        pattern.referenced_placeholders(&mut bound);
        alt_specificity.push(pattern.specificity());
        alternatives.push(pattern);
        alt_bound.push(bound);
    }

    // All alternatives must produce the same binding shape.
    for (i, bound) in alt_bound.iter().enumerate().skip(1) {
        if bound != &alt_bound[0] {
            return Err(CompileError::InconsistentAlternatives { alternative: i });
        }
    }

    let after = lowerer.lower_body(&spec.after)?;
    let after_negated = spec
        .after_negated
        .as_ref()
        .map(|p| lowerer.lower_body(p))
        .transpose()?;

    // Every after-template placeholder must be bound by the alternatives.
    let mut after_refs = BTreeSet::new();
    after.referenced_placeholders(&mut after_refs);
    if let Some(neg) = &after_negated {
        neg.referenced_placeholders(&mut after_refs);
    }
    for id in &after_refs {
        if !alt_bound[0].contains(id) {
            return Err(CompileError::UnboundAfterPlaceholder(
                placeholders[*id].name.clone(),
            ));
        }
    }

    Ok(CompiledRule {
        index,
        name: spec.name.clone(),
        description: spec.description.clone(),
        placeholders,
        alternatives,
        alt_specificity,
        after,
        after_negated,
        negatable: spec.negatable,
        import: spec.import.as_ref().map(|i| ImportEdit {
            symbol: i.symbol.clone(),
            policy: i.policy.to_core(),
        }),
        supersedes: spec.supersedes.clone(),
        behavior_preserving: spec.behavior_preserving,
    })
}

fn compile_placeholders(
    spec: &RuleSpec,
) -> Result<(Vec<Placeholder>, BTreeMap<String, PlaceholderId>), CompileError> {
    let mut placeholders = Vec::with_capacity(spec.placeholders.len());
    let mut ids = BTreeMap::new();
    for (name, decl) in &spec.placeholders {
        let constraint = decl
            .ty()
            .map(TypeExpr::parse)
            .transpose()
            .map_err(|source| CompileError::BadTypeConstraint {
                name: name.clone(),
                source,
            })?;
        ids.insert(name.clone(), placeholders.len());
        placeholders.push(Placeholder {
            name: name.clone(),
            constraint,
            arity: if decl.repeated() {
                Arity::Repeated
            } else {
                Arity::Single
            },
        });
    }
    Ok((placeholders, ids))
}

/// Where a sub-pattern sits; repeated placeholders are only legal in the
/// trailing argument position.
#[derive(Clone, Copy, PartialEq)]
enum Position {
    Structural,
    TrailingArg,
}

struct Lowerer<'a> {
    placeholders: &'a [Placeholder],
    ids: &'a BTreeMap<String, PlaceholderId>,
}

impl<'a> Lowerer<'a> {
    /// Lower one pattern body, enforcing at most one repeated-placeholder
    /// occurrence in the whole body.
    fn lower_body(&self, spec: &PatternSpec) -> Result<Pattern, CompileError> {
        let pattern = self.lower(spec, Position::Structural)?;
        if self.count_repeated(&pattern) > 1 {
            return Err(CompileError::MultipleRepeated);
        }
        Ok(pattern)
    }

    fn count_repeated(&self, pattern: &Pattern) -> usize {
        match pattern {
            Pattern::Bind(id) => usize::from(self.placeholders[*id].arity == Arity::Repeated),
            Pattern::Ident(_) | Pattern::Lit(_) => 0,
            Pattern::Call { recv, args, .. } => {
                recv.as_deref().map_or(0, |r| self.count_repeated(r))
                    + args.iter().map(|a| self.count_repeated(a)).sum::<usize>()
            }
            Pattern::Member { object, .. } => self.count_repeated(object),
            Pattern::Unary { operand, .. } => self.count_repeated(operand),
            Pattern::Binary { lhs, rhs, .. } => {
                self.count_repeated(lhs) + self.count_repeated(rhs)
            }
            Pattern::Lambda { params, body } => {
                params.iter().map(|p| self.count_repeated(p)).sum::<usize>()
                    + self.count_repeated(body)
            }
        }
    }

    fn lower(&self, spec: &PatternSpec, position: Position) -> Result<Pattern, CompileError> {
        match spec {
            PatternSpec::Bind { bind } => {
                let id = *self
                    .ids
                    .get(bind)
                    .ok_or_else(|| CompileError::UndeclaredPlaceholder(bind.clone()))?;
                if self.placeholders[id].arity == Arity::Repeated
                    && position != Position::TrailingArg
                {
                    return Err(CompileError::RepeatedOutsideArgs(bind.clone()));
                }
                Ok(Pattern::Bind(id))
            }
            PatternSpec::Literal { lit } => Ok(Pattern::Lit(lower_lit(lit))),
            PatternSpec::Node(node) => self.lower_node(node),
        }
    }

    fn lower_node(&self, node: &NodeSpec) -> Result<Pattern, CompileError> {
        match node.node.as_str() {
            "call" => {
                let name = require(node.name.as_ref(), "call", "name")?.clone();
                let recv = node
                    .recv
                    .as_deref()
                    .map(|p| self.lower(p, Position::Structural))
                    .transpose()?
                    .map(Box::new);
                let args = self.lower_args(node.args.as_deref().unwrap_or(&[]))?;
                Ok(Pattern::Call { recv, name, args })
            }
            "member" => {
                let name = require(node.name.as_ref(), "member", "name")?.clone();
                let object = require(node.object.as_deref(), "member", "object")?;
                Ok(Pattern::Member {
                    object: Box::new(self.lower(object, Position::Structural)?),
                    name,
                })
            }
            "ident" => {
                let name = require(node.name.as_ref(), "ident", "name")?.clone();
                Ok(Pattern::Ident(name))
            }
            "unary" => {
                let op = require(node.op.as_ref(), "unary", "op")?;
                let op = UnaryOp::from_symbol(op).ok_or_else(|| CompileError::UnknownOperator {
                    kind: "unary",
                    op: op.clone(),
                })?;
                let operand = require(node.operand.as_deref(), "unary", "operand")?;
                Ok(Pattern::Unary {
                    op,
                    operand: Box::new(self.lower(operand, Position::Structural)?),
                })
            }
            "binary" => {
                let op = require(node.op.as_ref(), "binary", "op")?;
                let op = BinaryOp::from_symbol(op).ok_or_else(|| CompileError::UnknownOperator {
                    kind: "binary",
                    op: op.clone(),
                })?;
                let lhs = require(node.lhs.as_deref(), "binary", "lhs")?;
                let rhs = require(node.rhs.as_deref(), "binary", "rhs")?;
                Ok(Pattern::Binary {
                    op,
                    lhs: Box::new(self.lower(lhs, Position::Structural)?),
                    rhs: Box::new(self.lower(rhs, Position::Structural)?),
                })
            }
            "lambda" => {
                let params = node
                    .params
                    .as_deref()
                    .unwrap_or(&[])
                    .iter()
                    .map(|name| self.lower_lambda_param(name))
                    .collect::<Result<Vec<_>, _>>()?;
                let body = require(node.body.as_deref(), "lambda", "body")?;
                Ok(Pattern::Lambda {
                    params,
                    body: Box::new(self.lower(body, Position::Structural)?),
                })
            }
            other => Err(CompileError::UnknownNodeKind(other.to_string())),
        }
    }

    /// A lambda parameter name that matches a declared placeholder binds it;
    /// any other name matches the parameter identifier exactly.
    fn lower_lambda_param(&self, name: &str) -> Result<Pattern, CompileError> {
        match self.ids.get(name) {
            Some(&id) => {
                if self.placeholders[id].arity == Arity::Repeated {
                    return Err(CompileError::RepeatedOutsideArgs(name.to_string()));
                }
                Ok(Pattern::Bind(id))
            }
            None => Ok(Pattern::Ident(name.to_string())),
        }
    }

    fn lower_args(&self, args: &[PatternSpec]) -> Result<Vec<Pattern>, CompileError> {
        let mut out = Vec::with_capacity(args.len());
        for (i, arg) in args.iter().enumerate() {
            let trailing = i + 1 == args.len();
            let position = if trailing {
                Position::TrailingArg
            } else {
                Position::Structural
            };
            let lowered = match self.lower(arg, position) {
                Ok(p) => p,
                // Re-shape the error for a non-trailing repeated bind.
                Err(CompileError::RepeatedOutsideArgs(name)) if !trailing => {
                    return Err(CompileError::RepeatedNotTrailing(name));
                }
                Err(e) => return Err(e),
            };
            out.push(lowered);
        }
        Ok(out)
    }
}

fn require<'v, T>(
    value: Option<&'v T>,
    kind: &'static str,
    field: &'static str,
) -> Result<&'v T, CompileError> {
    value.ok_or(CompileError::MissingField { kind, field })
}

fn lower_lit(lit: &LitSpec) -> Lit {
    match lit {
        LitSpec::Null => Lit::Null,
        LitSpec::Bool(b) => Lit::Bool(*b),
        LitSpec::Int(n) => Lit::Int(*n),
        LitSpec::Float(f) => Lit::Float(*f),
        LitSpec::Str(s) => Lit::Str(s.clone()),
    }
}

//! Type expressions and the assignability oracle.
//!
//! The engine does no type inference of its own. Trees arrive with static
//! type annotations attached by an external front end, and placeholder
//! constraints are tested through the `TypeContext` oracle. An oracle that
//! cannot answer must answer `false`: unknown assignability means no match.

use std::collections::{HashMap, HashSet};
use std::fmt;

use thiserror::Error;

/// A possibly-generic type expression, e.g. `Int` or `Map<String, List<Int>>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeExpr {
    pub name: String,
    pub args: Vec<TypeExpr>,
}

#[derive(Error, Debug)]
pub enum TypeParseError {
    #[error("empty type expression")]
    Empty,
    #[error("unexpected character `{0}` in type expression")]
    UnexpectedChar(char),
    #[error("unbalanced `<` in type expression")]
    Unbalanced,
    #[error("trailing input after type expression: `{0}`")]
    Trailing(String),
}

impl TypeExpr {
    pub fn simple(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    pub fn generic(name: impl Into<String>, args: Vec<TypeExpr>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    /// Parse a type expression such as `Sequence<E>` or `Map<K, List<V>>`.
    pub fn parse(input: &str) -> Result<Self, TypeParseError> {
        let mut parser = TypeParser {
            chars: input.char_indices().peekable(),
            input,
        };
        let ty = parser.parse_type()?;
        parser.skip_ws();
        if let Some((i, _)) = parser.chars.peek() {
            return Err(TypeParseError::Trailing(input[*i..].to_string()));
        }
        Ok(ty)
    }

    /// A single-uppercase-letter name is conventionally a type variable
    /// (`E`, `K`, `V`); the table-driven oracle treats those as wildcards.
    pub fn is_variable(&self) -> bool {
        self.args.is_empty()
            && self.name.len() == 1
            && self.name.chars().next().is_some_and(|c| c.is_ascii_uppercase())
    }
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.args.is_empty() {
            write!(f, "<")?;
            for (i, arg) in self.args.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", arg)?;
            }
            write!(f, ">")?;
        }
        Ok(())
    }
}

struct TypeParser<'s> {
    chars: std::iter::Peekable<std::str::CharIndices<'s>>,
    input: &'s str,
}

impl<'s> TypeParser<'s> {
    fn skip_ws(&mut self) {
        while self.chars.peek().is_some_and(|(_, c)| c.is_whitespace()) {
            self.chars.next();
        }
    }

    fn parse_type(&mut self) -> Result<TypeExpr, TypeParseError> {
        self.skip_ws();
        let start = match self.chars.peek() {
            Some((i, c)) if c.is_alphanumeric() || *c == '_' => *i,
            Some((_, c)) => return Err(TypeParseError::UnexpectedChar(*c)),
            None => return Err(TypeParseError::Empty),
        };
        let mut end = start;
        while let Some(&(i, c)) = self.chars.peek() {
            if c.is_alphanumeric() || c == '_' || c == '.' {
                end = i + c.len_utf8();
                self.chars.next();
            } else {
                break;
            }
        }
        let name = self.input[start..end].to_string();

        self.skip_ws();
        let mut args = Vec::new();
        if self.chars.peek().is_some_and(|(_, c)| *c == '<') {
            self.chars.next();
            loop {
                args.push(self.parse_type()?);
                self.skip_ws();
                match self.chars.next() {
                    Some((_, ',')) => continue,
                    Some((_, '>')) => break,
                    Some((_, c)) => return Err(TypeParseError::UnexpectedChar(c)),
                    None => return Err(TypeParseError::Unbalanced),
                }
            }
        }
        Ok(TypeExpr { name, args })
    }
}

/// Assignability oracle supplied by the host's type checker.
///
/// `is_assignable(candidate, constraint)` answers whether a fragment of
/// static type `candidate` may stand where `constraint` is required. Unknown
/// pairs must answer `false` — matching fails closed.
pub trait TypeContext: Send + Sync {
    fn is_assignable(&self, candidate: &TypeExpr, constraint: &TypeExpr) -> bool;
}

/// Table-driven oracle: explicit named subtype facts, no inference.
///
/// Suitable for tests and for hosts that can enumerate their hierarchy.
/// Constraint arguments that are type variables (`E`, `K`, ...) accept any
/// candidate argument; a raw (argument-free) constraint accepts any
/// parameterization of an assignable base.
#[derive(Debug, Default)]
pub struct AssignabilityTable {
    /// Direct supertype edges by type name.
    supertypes: HashMap<String, HashSet<String>>,
}

impl AssignabilityTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `sub` is assignable to `sup`.
    pub fn declare(&mut self, sub: impl Into<String>, sup: impl Into<String>) {
        self.supertypes
            .entry(sub.into())
            .or_default()
            .insert(sup.into());
    }

    fn name_assignable(&self, candidate: &str, constraint: &str) -> bool {
        if candidate == constraint {
            return true;
        }
        // Breadth-first over declared edges.
        let mut seen = HashSet::new();
        let mut queue = vec![candidate];
        while let Some(name) = queue.pop() {
            if !seen.insert(name) {
                continue;
            }
            if let Some(sups) = self.supertypes.get(name) {
                for sup in sups {
                    if sup == constraint {
                        return true;
                    }
                    queue.push(sup);
                }
            }
        }
        false
    }
}

impl TypeContext for AssignabilityTable {
    fn is_assignable(&self, candidate: &TypeExpr, constraint: &TypeExpr) -> bool {
        if constraint.is_variable() {
            return true;
        }
        if !self.name_assignable(&candidate.name, &constraint.name) {
            return false;
        }
        if constraint.args.is_empty() {
            return true;
        }
        candidate.args.len() == constraint.args.len()
            && candidate
                .args
                .iter()
                .zip(&constraint.args)
                .all(|(c, k)| self.is_assignable(c, k))
    }
}

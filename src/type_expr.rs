//! Compact Type Expressions
//!
//! Parser for the inline type syntax used wherever a type name is expected:
//!
//! ```text
//! expression  := type | union
//! type        := primitive | group | reference | array | optional
//! optional    := (primitive | group | reference) "?"
//! array       := (primitive | group | reference) "[]"
//! union       := type ("|" type)+
//! group       := "(" expression ")"
//! reference   := IDENT ("." IDENT)?
//! ```
//!
//! Whitespace is allowed around `|` and inside parentheses. Postfix operators
//! may be chained (`string[][]`, `Foo[]?`). Groups are transparent: they only
//! affect precedence and leave no node in the tree.
//!
//! Evaluation against the shape graph lives in the resolver; this module only
//! turns text into a [`TypeExpr`].

use chumsky::prelude::*;
use std::fmt;

use crate::shape::ShapeType;

/// Parsed compact type expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeExpr {
    /// A built-in type name
    Primitive(ShapeType),
    /// `Name` or `alias.Name`
    Reference {
        library: Option<String>,
        name: String,
    },
    /// `inner[]`
    Array(Box<TypeExpr>),
    /// `inner?`, i.e. `inner | nil`
    Optional(Box<TypeExpr>),
    /// Two or more alternatives in source order
    Union(Vec<TypeExpr>),
}

impl TypeExpr {
    pub fn reference(name: impl Into<String>) -> Self {
        Self::Reference {
            library: None,
            name: name.into(),
        }
    }

    pub fn qualified(library: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Reference {
            library: Some(library.into()),
            name: name.into(),
        }
    }
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primitive(t) => write!(f, "{}", t),
            Self::Reference { library: Some(lib), name } => write!(f, "{}.{}", lib, name),
            Self::Reference { library: None, name } => write!(f, "{}", name),
            Self::Array(inner) => write!(f, "{}[]", Postfixed(inner)),
            Self::Optional(inner) => write!(f, "{}?", Postfixed(inner)),
            Self::Union(members) => {
                for (i, member) in members.iter().enumerate() {
                    if i > 0 {
                        write!(f, " | ")?;
                    }
                    write!(f, "{}", member)?;
                }
                Ok(())
            }
        }
    }
}

/// Parenthesizes unions used as a postfix operand
struct Postfixed<'a>(&'a TypeExpr);

impl fmt::Display for Postfixed<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            TypeExpr::Union(_) => write!(f, "({})", self.0),
            other => write!(f, "{}", other),
        }
    }
}

/// Grammar mismatch inside an expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    /// Byte offset of the offending input
    pub offset: usize,
    pub message: String,
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (at offset {})", self.message, self.offset)
    }
}

// ---------------- Parser ----------------

#[derive(Clone, Copy)]
enum Postfix {
    Array,
    Optional,
}

fn expression_parser<'src>(
) -> impl Parser<'src, &'src str, TypeExpr, extra::Err<Rich<'src, char>>> + Clone {
    recursive(|expression| {
        let ident = any()
            .filter(|c: &char| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
            .repeated()
            .at_least(1)
            .to_slice()
            .labelled("type name");

        let named = ident
            .clone()
            .then(just('.').ignore_then(ident).or_not())
            .map(|(head, tail): (&str, Option<&str>)| match tail {
                Some(name) => TypeExpr::qualified(head, name),
                None => match ShapeType::from_builtin(head) {
                    Some(primitive) => TypeExpr::Primitive(primitive),
                    None => TypeExpr::reference(head),
                },
            });

        let group = expression
            .padded()
            .delimited_by(just('('), just(')'))
            .labelled("group");

        let postfix = choice((
            just("[]").to(Postfix::Array),
            just('?').to(Postfix::Optional),
        ));

        let operand = group
            .or(named)
            .foldl(postfix.repeated(), |inner, op| match op {
                Postfix::Array => TypeExpr::Array(Box::new(inner)),
                Postfix::Optional => TypeExpr::Optional(Box::new(inner)),
            });

        operand
            .clone()
            .then(
                just('|')
                    .padded()
                    .ignore_then(operand)
                    .repeated()
                    .collect::<Vec<_>>(),
            )
            .map(|(first, rest)| {
                if rest.is_empty() {
                    first
                } else {
                    let mut members = Vec::with_capacity(rest.len() + 1);
                    members.push(first);
                    members.extend(rest);
                    TypeExpr::Union(members)
                }
            })
    })
}

/// Parse a compact type expression. The whole input must be consumed.
pub fn parse(source: &str) -> Result<TypeExpr, SyntaxError> {
    expression_parser()
        .padded()
        .then_ignore(end())
        .parse(source)
        .into_result()
        .map_err(|errors| {
            errors
                .into_iter()
                .next()
                .map(|e| SyntaxError {
                    offset: e.span().start,
                    message: e.to_string(),
                })
                .unwrap_or_else(|| SyntaxError {
                    offset: 0,
                    message: "unexpected input".to_string(),
                })
        })
}

//! Abstract syntax of enzyme sequences
//!
//!     A [Sequence] is what the parser makes of the cleaned text of one injection. Each [Step]
//!     keeps the source text of its enzyme next to the parsed form, so that diagnostics can say
//!     which enzyme failed.

use serde::Serialize;

/// A pipe-delimited chain of one or more enzymes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Sequence {
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Step {
    pub enzyme: Enzyme,
    /// Cleaned text of the enzyme, e.g. `@about.code(2)`
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Enzyme {
    Literal { literal: Literal },
    Transclusion(Transclusion),
    Execution { execution: Execution },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Literal {
    /// Digits only; values beyond `i64::MAX` saturate
    Integer(i64),
    /// A quoted string, already unquoted
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transclusion {
    pub lookup: Lookup,
    pub reference: Reference,
}

/// What a transclusion reads from the addressed entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Lookup {
    /// A custom field stored by the host (`post.field`)
    Field,
    /// A built-in attribute (`post:field`)
    Attribute,
}

/// The address of a field: which content item, the item itself or its author, and the name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reference {
    pub post: PostRef,
    pub owner: Owner,
    pub field: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PostRef {
    /// No post given: the content item being processed
    Current,
    Id(u64),
    /// `@slug`, searched among the configured content kinds
    Slug(String),
    /// `@@slug`, searched among all kinds, with a fallback when missing
    SlugWithFallback(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Owner {
    Content,
    Author,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Execution {
    /// `array(n)`: the last `n` values as a list
    Array(usize),
    /// `assoc(n)`: the last `2n` values as `n` key/value pairs
    Assoc(usize),
    /// `defer(n)`: re-run the whole injection at priority `n`
    Defer(i32),
    /// `item(n)`: run the code stored in a field with the last `n` values as arguments
    Call {
        reference: Reference,
        arguments: usize,
    },
}

impl Sequence {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl Enzyme {
    /// Short name of the enzyme kind, as used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Enzyme::Literal { .. } => "literal",
            Enzyme::Transclusion(Transclusion {
                lookup: Lookup::Field,
                ..
            }) => "item",
            Enzyme::Transclusion(Transclusion {
                lookup: Lookup::Attribute,
                ..
            }) => "attr",
            Enzyme::Execution { .. } => "execution",
        }
    }
}

use sift_value::{ContextError, ResolveError, Value, ValueError};
use thiserror::Error;

use crate::token::Position;
use crate::types::BinaryOperator;

/// Everything that can go wrong while compiling or applying a filter.
#[derive(Error, Debug)]
pub enum FilterError {
    #[error("illegal character {ch:?} at {pos}")]
    Lex { ch: char, pos: Position },

    #[error("expected {expected}, found {found} at {pos}")]
    Parse {
        expected: &'static str,
        found: String,
        pos: Position,
    },

    #[error("filter nests deeper than {limit} levels at {pos}")]
    TooDeep { limit: usize, pos: Position },

    #[error("invalid number {text:?} at {pos}")]
    InvalidNumber { text: String, pos: Position },

    #[error("cannot apply {op} to {category}")]
    Type {
        op: &'static str,
        category: &'static str,
    },

    #[error("index {index} out of range for length {len}")]
    Index { index: i64, len: usize },

    #[error("negative position {index} needs a known length, but {category} is one-shot")]
    NegativeOnOneShot { index: i64, category: &'static str },

    #[error("unsupported binary operation: {left} {op} {right}")]
    UnsupportedBinary {
        left: &'static str,
        op: BinaryOperator,
        right: &'static str,
    },

    #[error("no resolver available for link {path:?}")]
    NoResolver { path: String },

    #[error("link {path:?} does not resolve to a value")]
    LinkCycle { path: String },

    #[error("resolving link {path:?}: {source}")]
    Resolution {
        path: String,
        #[source]
        source: ResolveError,
    },

    #[error("byte stream read failed: {0}")]
    StreamIo(#[from] std::io::Error),

    #[error(transparent)]
    Value(#[from] ValueError),

    #[error(transparent)]
    Context(#[from] ContextError),
}

/// A failed application of a compiled filter.
///
/// `partial` holds the output of the last pipeline stage that completed
/// before the failure, if any stage did. Treat it as unreliable: one-shot
/// sources in it may already be partially consumed, and every iterator and
/// byte stream in it is closed.
#[derive(Error, Debug)]
#[error("{error}")]
pub struct ApplyError {
    #[source]
    pub error: FilterError,
    pub partial: Option<Value>,
}

impl ApplyError {
    pub fn new(error: FilterError, partial: Option<Value>) -> Self {
        Self { error, partial }
    }
}

impl From<FilterError> for ApplyError {
    fn from(error: FilterError) -> Self {
        Self { error, partial: None }
    }
}

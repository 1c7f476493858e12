//! Filter syntax tree.

use std::fmt;

/// One operation in a compiled filter.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterNode {
    /// Quoted text or a bareword: `"swoosh"`, `swoosh`
    StringLiteral(String),
    /// `42`, `.5`, `-3`
    NumericLiteral(f64),
    /// `length`
    Length,
    /// `.`
    Identity,
    /// `.name`, `."name"`
    Key(String),
    /// `.[n]`
    Index(i64),
    /// `.[]`
    IterateAll,
    /// `.[start:stop]`
    Range(RangeSelector),
    /// `left op right`
    Binary {
        left: Box<FilterNode>,
        op: BinaryOperator,
        right: Box<FilterNode>,
    },
    /// Steps applied one after another: `.a.b[0]`
    Chain(Vec<FilterNode>),
    /// `[e1, e2, ...]`, or a top-level `e1, e2`
    Array(Vec<FilterNode>),
    /// `{key: e, ...}`, in declaration order
    Object(Vec<(String, FilterNode)>),
    /// A parenthesised pipeline: `(e1 | e2)`
    Pipeline(Vec<FilterNode>),
}

/// Bounds of a range selector. Either side may be omitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RangeSelector {
    pub start: Option<i64>,
    pub stop: Option<i64>,
}

impl RangeSelector {
    pub fn new(start: Option<i64>, stop: Option<i64>) -> Self {
        Self { start, stop }
    }

    /// `[:]` selects everything.
    pub fn is_all(&self) -> bool {
        self.start.is_none() && self.stop.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,      // +
    Subtract, // -
    Multiply, // *
    Divide,   // /
}

impl BinaryOperator {
    /// Binding strength. Higher binds tighter; all operators are
    /// left-associative.
    pub fn precedence(self) -> u8 {
        match self {
            BinaryOperator::Add | BinaryOperator::Subtract => 1,
            BinaryOperator::Multiply | BinaryOperator::Divide => 2,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
        }
    }
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A parsed filter: pipeline stages applied left to right.
///
/// An empty program passes its input through unchanged.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub stages: Vec<FilterNode>,
}

impl Program {
    pub fn new(stages: Vec<FilterNode>) -> Self {
        Self { stages }
    }
}

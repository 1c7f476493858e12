//! AST construction helpers.

use crate::types::*;

/// Helper functions for constructing filter nodes.
pub struct Ast;

impl Ast {
    /// Create a program from pipeline stages.
    pub fn program(stages: Vec<FilterNode>) -> Program {
        Program::new(stages)
    }

    /// Create a key selector.
    pub fn key(name: impl Into<String>) -> FilterNode {
        FilterNode::Key(name.into())
    }

    /// Create an index selector.
    pub fn index(index: i64) -> FilterNode {
        FilterNode::Index(index)
    }

    /// Create a range selector.
    pub fn range(start: Option<i64>, stop: Option<i64>) -> FilterNode {
        FilterNode::Range(RangeSelector::new(start, stop))
    }

    /// Create a string literal.
    pub fn string(text: impl Into<String>) -> FilterNode {
        FilterNode::StringLiteral(text.into())
    }

    /// Create a selector chain, collapsing a single step into itself.
    pub fn chain(mut steps: Vec<FilterNode>) -> FilterNode {
        if steps.len() == 1 {
            return steps.remove(0);
        }
        FilterNode::Chain(steps)
    }

    /// Create a parenthesised pipeline, collapsing a single stage into itself.
    pub fn pipeline(mut stages: Vec<FilterNode>) -> FilterNode {
        if stages.len() == 1 {
            return stages.remove(0);
        }
        FilterNode::Pipeline(stages)
    }

    /// Create a binary operation.
    pub fn binary(left: FilterNode, op: BinaryOperator, right: FilterNode) -> FilterNode {
        FilterNode::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    /// Create an array construction.
    pub fn array(items: Vec<FilterNode>) -> FilterNode {
        FilterNode::Array(items)
    }

    /// Create an object mapping.
    pub fn object(entries: Vec<(String, FilterNode)>) -> FilterNode {
        FilterNode::Object(entries)
    }
}

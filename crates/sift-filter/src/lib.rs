//! A small jq-like filter language over [`sift_value::Value`].
//!
//! Filters project, index, slice and remap values. They work the same way
//! on in-memory data, on lazily resolved links and on one-shot sources such
//! as iterators and byte streams.
//!
//! ```text
//! .                 identity
//! .key  ."key"      key selector (broadcasts over sequences)
//! .[n]  .[a:b]      index and range selectors
//! .[]               iterate: later stages run once per element
//! a | b             pipe
//! [a, b]  {k: a}    array and object construction
//! length            element, character or byte count
//! a * b  a + b      arithmetic on numbers
//! ```
//!
//! # Example
//!
//! ```
//! use sift_filter::apply;
//! use sift_value::Value;
//! use serde_json::json;
//!
//! let doc = Value::from(json!(["abcde", "fg"]));
//! let out = apply(".[] | length", None, &doc).unwrap();
//! assert_eq!(out, Value::from(json!([5, 2])));
//! ```

mod types;
pub use types::*;

mod ast;
pub use ast::Ast;

mod error;
pub use error::{ApplyError, FilterError};

mod token;
pub use token::{Position, Token, TokenKind};

mod lexer;
pub use lexer::Lexer;

mod parser;
pub use parser::FilterParser;

mod eval;
pub use eval::{flatten, Evaluator};

mod compile;
pub use compile::{apply, Filter, FilterCache, FilterOptions, DEFAULT_CACHE_CAPACITY};

pub mod cli;

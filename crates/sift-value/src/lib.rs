//! Dynamic value model for sift filters.
//!
//! [`Value`] is a closed union over scalars (`null`, booleans, numbers,
//! bytes, text), compound collections (sequences and mappings) and complex
//! values defined by behaviour:
//!
//! - [`Link`]: a lazily resolved reference, fetched through a [`Resolver`]
//! - [`MapValue`] / [`ArrayValue`]: collections reachable by lookup or iteration
//! - [`IteratorHandle`]: a pull-based cursor that must be closed
//! - [`ByteStreamHandle`]: a readable, closable byte source
//! - [`LazyStream`]: the one-shot sequence filters use for pipe fan-out
//!
//! # Example
//!
//! ```
//! use sift_value::{Link, Value};
//!
//! let link = Link::new("/docs/readme");
//! assert_eq!(link.value(), (Value::Null, false));
//!
//! link.resolved(Value::from("hello")).unwrap();
//! assert_eq!(link.value(), (Value::from("hello"), true));
//! ```

mod capability;
mod error;
mod iter;
mod link;
mod resolver;
mod stream;
mod sync;
mod value;

pub use capability::{ArrayValue, ByteSource, ByteStreamHandle, MapValue, ReaderSource};
pub use error::{ContextError, ValueError};
pub use iter::{IteratorHandle, SliceIterator, ValueIterator};
pub use link::Link;
pub use resolver::{CancelHandle, Context, ResolveError, Resolver};
pub use stream::LazyStream;
pub use value::{classify, Category, Value};

//! One-shot lazy sequences used for pipe fan-out.

use std::fmt;
use std::sync::{Arc, Mutex};

use crate::sync::lock;
use crate::value::Value;

enum Source {
    Single(Option<Value>),
    Values(std::vec::IntoIter<Value>),
    Wrapped(Option<LazyStream>),
}

/// A finite, forward-only, non-restartable sequence of values.
///
/// A stream holds exactly one of: a single value, an ordered sequence of
/// values, or another stream. A wrapped stream is yielded as one element.
/// Clones share the same cursor.
#[derive(Clone)]
pub struct LazyStream {
    source: Arc<Mutex<Source>>,
}

impl LazyStream {
    fn from_source(source: Source) -> Self {
        Self { source: Arc::new(Mutex::new(source)) }
    }

    /// A stream yielding `value` once.
    pub fn single(value: Value) -> Self {
        Self::from_source(Source::Single(Some(value)))
    }

    /// A stream yielding each of `values` in order.
    pub fn from_values(values: Vec<Value>) -> Self {
        Self::from_source(Source::Values(values.into_iter()))
    }

    /// A stream yielding `inner` itself as its only element.
    pub fn wrap(inner: LazyStream) -> Self {
        Self::from_source(Source::Wrapped(Some(inner)))
    }

    /// Pulls the next element.
    pub fn pull(&self) -> Option<Value> {
        match &mut *lock(&self.source) {
            Source::Single(slot) => slot.take(),
            Source::Values(values) => values.next(),
            Source::Wrapped(slot) => slot.take().map(Value::Stream),
        }
    }

    /// Applies `f` to every remaining element, collecting the results in
    /// order. Stops at the first error.
    pub fn map_each<F, E>(&self, mut f: F) -> Result<Vec<Value>, E>
    where
        F: FnMut(Value) -> Result<Value, E>,
    {
        let mut out = Vec::new();
        while let Some(item) = self.pull() {
            out.push(f(item)?);
        }
        Ok(out)
    }

    /// Discards whatever has not been pulled yet.
    pub fn close(&self) {
        let mut source = lock(&self.source);
        *source = Source::Single(None);
    }

    pub(crate) fn same(&self, other: &LazyStream) -> bool {
        Arc::ptr_eq(&self.source, &other.source)
    }
}

impl fmt::Debug for LazyStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &*lock(&self.source) {
            Source::Single(_) => "single",
            Source::Values(_) => "values",
            Source::Wrapped(_) => "wrapped",
        };
        f.debug_struct("LazyStream").field("kind", &kind).finish_non_exhaustive()
    }
}

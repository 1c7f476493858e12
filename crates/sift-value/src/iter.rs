//! Pull-based iteration over ordered values.

use std::fmt;
use std::sync::{Arc, Mutex};

use crate::error::ValueError;
use crate::sync::lock;
use crate::value::Value;

/// A forward-only cursor over a sequence of values.
///
/// Use [`next`](ValueIterator::next) to advance the cursor and
/// [`scan`](ValueIterator::scan) to read the current value. Callers must call
/// [`close`](ValueIterator::close) when the iterator is no longer needed.
pub trait ValueIterator: Send {
    /// Advances the cursor. Returns false once no values remain.
    fn next(&mut self) -> bool;

    /// Writes the current value into `dest`.
    fn scan(&self, dest: &mut Value) -> Result<(), ValueError>;

    /// The key of the current position.
    fn key(&self) -> Value;

    /// Releases any resource behind the iterator.
    fn close(&mut self) -> Result<(), ValueError>;

    /// Whether `next` advances deterministically (keys count up from zero).
    fn is_ordered(&self) -> bool;
}

/// The generic in-memory iterator. Keys are positions starting at zero.
#[derive(Debug, Clone)]
pub struct SliceIterator {
    values: Vec<Value>,
    pos: Option<usize>,
    closed: bool,
}

impl SliceIterator {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values, pos: None, closed: false }
    }
}

impl ValueIterator for SliceIterator {
    fn next(&mut self) -> bool {
        if self.closed {
            return false;
        }
        let next = self.pos.map_or(0, |p| p + 1);
        if next >= self.values.len() {
            self.pos = Some(self.values.len());
            return false;
        }
        self.pos = Some(next);
        true
    }

    fn scan(&self, dest: &mut Value) -> Result<(), ValueError> {
        if self.closed {
            return Err(ValueError::IteratorClosed);
        }
        let current = self
            .pos
            .and_then(|p| self.values.get(p))
            .ok_or(ValueError::NotPositioned)?;
        *dest = current.clone();
        Ok(())
    }

    fn key(&self) -> Value {
        match self.pos {
            Some(p) if p < self.values.len() => Value::Int(p as i64),
            _ => Value::Null,
        }
    }

    fn close(&mut self) -> Result<(), ValueError> {
        self.closed = true;
        Ok(())
    }

    fn is_ordered(&self) -> bool {
        true
    }
}

struct IteratorState {
    inner: Box<dyn ValueIterator>,
    closed: bool,
}

/// A shared handle to a [`ValueIterator`], as carried by [`Value::Iterator`].
///
/// Clones refer to the same cursor. The handle guarantees the underlying
/// `close` runs at most once; after that `next` returns false forever.
#[derive(Clone)]
pub struct IteratorHandle {
    state: Arc<Mutex<IteratorState>>,
}

impl IteratorHandle {
    pub fn new(iter: impl ValueIterator + 'static) -> Self {
        Self::from_boxed(Box::new(iter))
    }

    pub fn from_boxed(inner: Box<dyn ValueIterator>) -> Self {
        Self {
            state: Arc::new(Mutex::new(IteratorState { inner, closed: false })),
        }
    }

    /// Shorthand for a [`SliceIterator`] over `values`.
    pub fn from_values(values: Vec<Value>) -> Self {
        Self::new(SliceIterator::new(values))
    }

    pub fn next(&self) -> bool {
        let mut state = lock(&self.state);
        !state.closed && state.inner.next()
    }

    pub fn scan(&self, dest: &mut Value) -> Result<(), ValueError> {
        let state = lock(&self.state);
        if state.closed {
            return Err(ValueError::IteratorClosed);
        }
        state.inner.scan(dest)
    }

    /// Reads the current value.
    pub fn current(&self) -> Result<Value, ValueError> {
        let mut value = Value::Null;
        self.scan(&mut value)?;
        Ok(value)
    }

    pub fn key(&self) -> Value {
        lock(&self.state).inner.key()
    }

    pub fn is_ordered(&self) -> bool {
        lock(&self.state).inner.is_ordered()
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }

    /// Closes the iterator. Only the first call reaches the implementation.
    pub fn close(&self) -> Result<(), ValueError> {
        let mut state = lock(&self.state);
        if state.closed {
            return Ok(());
        }
        state.closed = true;
        state.inner.close()
    }

    pub(crate) fn same(&self, other: &IteratorHandle) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

impl fmt::Debug for IteratorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IteratorHandle")
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

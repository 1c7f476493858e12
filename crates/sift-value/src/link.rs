//! Lazily resolved references.

use std::fmt;
use std::sync::{Arc, Mutex};

use crate::error::ValueError;
use crate::sync::lock;
use crate::value::Value;

#[derive(Debug)]
enum LinkState {
    Unresolved { path: String },
    Resolved { path: String, value: Value },
}

impl LinkState {
    fn path(&self) -> &str {
        match self {
            LinkState::Unresolved { path } | LinkState::Resolved { path, .. } => path,
        }
    }
}

/// A reference to a value that lives behind a [`Resolver`](crate::Resolver).
///
/// A link never fetches on its own. The evaluator asks a resolver for the
/// value at [`Link::path`] and caches the answer with [`Link::resolved`].
/// Clones share the same cache.
#[derive(Clone)]
pub struct Link {
    state: Arc<Mutex<LinkState>>,
}

impl Link {
    /// Creates an unresolved link to `path`.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            state: Arc::new(Mutex::new(LinkState::Unresolved { path: path.into() })),
        }
    }

    pub fn path(&self) -> String {
        lock(&self.state).path().to_string()
    }

    /// Returns the cached value and whether the link has been resolved.
    ///
    /// An unresolved link reports `(Value::Null, false)`.
    pub fn value(&self) -> (Value, bool) {
        match &*lock(&self.state) {
            LinkState::Unresolved { .. } => (Value::Null, false),
            LinkState::Resolved { value, .. } => (value.clone(), true),
        }
    }

    /// The cached value, if any.
    pub fn cached(&self) -> Option<Value> {
        match &*lock(&self.state) {
            LinkState::Unresolved { .. } => None,
            LinkState::Resolved { value, .. } => Some(value.clone()),
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(&*lock(&self.state), LinkState::Resolved { .. })
    }

    /// Caches `value` as the target of this link.
    ///
    /// This is the only state transition. Resolving twice is rejected and the
    /// first value stays in place.
    pub fn resolved(&self, value: Value) -> Result<(), ValueError> {
        let mut state = lock(&self.state);
        match &*state {
            LinkState::Resolved { path, .. } => Err(ValueError::AlreadyResolved(path.clone())),
            LinkState::Unresolved { path } => {
                let path = path.clone();
                *state = LinkState::Resolved { path, value };
                Ok(())
            }
        }
    }

    pub(crate) fn same(&self, other: &Link) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("Link")
            .field("path", &state.path())
            .field("resolved", &matches!(&*state, LinkState::Resolved { .. }))
            .finish()
    }
}

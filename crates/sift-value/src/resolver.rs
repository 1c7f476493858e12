//! Link resolution and the evaluation context handed to resolvers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::ContextError;
use crate::value::Value;

/// Error type returned by resolvers. Passed through to the caller unchanged.
pub type ResolveError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Fetches the value a [`Link`](crate::Link) points to.
///
/// Resolvers are external collaborators. They should honour
/// [`Context::check`] for long-running fetches.
pub trait Resolver: Send + Sync {
    fn get(&self, ctx: &Context, path: &str) -> Result<Value, ResolveError>;
}

impl<F> Resolver for F
where
    F: Fn(&Context, &str) -> Result<Value, ResolveError> + Send + Sync,
{
    fn get(&self, ctx: &Context, path: &str) -> Result<Value, ResolveError> {
        self(ctx, path)
    }
}

/// A cloneable switch that cancels every context sharing it.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Cancellation and deadline state threaded through every evaluation step.
#[derive(Debug, Clone, Default)]
pub struct Context {
    cancel: CancelHandle,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    /// A context cancelled through `cancel`.
    pub fn with_cancel(cancel: CancelHandle) -> Self {
        Self { cancel, deadline: None }
    }

    /// Derives a context that expires at `deadline`, or at the current
    /// deadline if that comes first. Cancellation is shared with `self`.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(current) if current < deadline => current,
            _ => deadline,
        };
        Self { cancel: self.cancel.clone(), deadline: Some(deadline) }
    }

    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancel_handle(&self) -> &CancelHandle {
        &self.cancel
    }

    /// Fails once the context is cancelled or past its deadline.
    pub fn check(&self) -> Result<(), ContextError> {
        if self.cancel.is_cancelled() {
            return Err(ContextError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(ContextError::DeadlineExceeded),
            _ => Ok(()),
        }
    }
}

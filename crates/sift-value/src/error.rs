use thiserror::Error;

/// Errors raised by the value model and by capability implementations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValueError {
    #[error("iterator is not positioned on a value")]
    NotPositioned,

    #[error("iterator is closed")]
    IteratorClosed,

    #[error("link {0:?} is already resolved")]
    AlreadyResolved(String),

    #[error("{0} has no JSON representation")]
    NotRepresentable(&'static str),

    #[error("mapping key must be text, got {0}")]
    NonTextKey(&'static str),

    #[error("{0}")]
    Other(String),
}

/// Why an evaluation context stopped accepting work.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextError {
    #[error("evaluation cancelled")]
    Cancelled,

    #[error("evaluation deadline exceeded")]
    DeadlineExceeded,
}

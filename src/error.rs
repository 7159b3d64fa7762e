//! Error taxonomy for the sinker core (spec §7).
//!
//! Retryability is a marker, not a type: [`RetryableError`] wraps any error
//! and is detected via [`is_retryable`], so a handler's error contract stays
//! a plain `Result<(), E>` while still letting callers opt in to retry.

use std::fmt;

/// Wraps an error to mark it as safe to retry (spec §9 "retryability as a
/// marker"). `StreamSession` surfaces these instead of aborting the sinker.
#[derive(Debug)]
pub struct RetryableError(pub Box<dyn std::error::Error + Send + Sync>);

impl fmt::Display for RetryableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "retryable: {}", self.0)
    }
}

impl std::error::Error for RetryableError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.0.as_ref())
    }
}

impl RetryableError {
    pub fn new<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        RetryableError(Box::new(err))
    }
}

/// True if `err`'s chain contains a [`RetryableError`] marker.
pub fn is_retryable(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut cur = Some(err);
    while let Some(e) = cur {
        if e.downcast_ref::<RetryableError>().is_some() {
            return true;
        }
        cur = e.source();
    }
    false
}

#[derive(thiserror::Error, Debug)]
pub enum SinkError {
    /// Transient stream error (spec §7): retryable, backoff-gated reconnect.
    #[error("transient stream error: {0}")]
    Transient(#[source] RetryableError),

    /// gRPC `Unauthenticated`: non-retryable, surfaced immediately.
    #[error("authentication failed: {0}")]
    Authentication(#[source] tonic::Status),

    /// gRPC `InvalidArgument`: non-retryable, surfaced immediately.
    #[error("invalid request: {0}")]
    InvalidRequest(#[source] tonic::Status),

    /// Handler returned a plain (non-retryable) error at the given cursor.
    #[error("handler error at cursor {cursor}: {source}")]
    Handler {
        cursor: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Backoff exhausted: wraps the *last* retryable cause, not the first.
    #[error("backoff expired after exhausting retries: {0}")]
    BackoffExpired(#[source] Box<SinkError>),

    /// The server returned a cursor string that does not decode.
    #[error("invalid cursor: {0}")]
    InvalidCursor(String),

    /// Undo signal requests a rewind deeper than the configured buffer.
    #[error("undo out of window: requested rewind to block {requested}, buffer holds from {oldest_buffered}")]
    UndoOutOfWindow { requested: u64, oldest_buffered: u64 },

    /// Extra header string was not `"key: value"`.
    #[error("invalid header {0:?}: expected \"key: value\"")]
    InvalidHeader(String),

    /// A literal (non-negative) `start` was configured past the requested
    /// `end` of a bounded range.
    #[error("block range end {end} precedes start {start}")]
    InvalidBlockRange { start: i64, end: u64 },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SinkError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, SinkError::Transient(_))
    }
}

//! Exponential backoff with a consecutive-attempt cap (spec §4.D).
//!
//! Grounded in the reconnect loop of
//! `acc9b13c_helixbox-tycho-indexer__src-substreams-stream.rs.rs`, which
//! keeps a `tokio_retry::strategy::ExponentialBackoff` around and resets it
//! whenever a message is successfully received. Here that's lifted into an
//! owned struct (instead of a shared `once_cell::Lazy`) so each `Sinker` has
//! its own independent backoff state, and the 15-attempt cap from spec §4.D
//! is layered on top.

use std::time::Duration;

use tokio_retry::strategy::ExponentialBackoff;

use crate::error::{RetryableError, SinkError};

/// Attempts without a single successfully received message before giving up,
/// unless [`BackoffPolicy::infinite_retry`] is set.
pub const MAX_NON_PRODUCTIVE_ATTEMPTS: usize = 15;

pub struct BackoffPolicy {
    strategy: ExponentialBackoff,
    current: Box<dyn Iterator<Item = Duration> + Send>,
    attempts: usize,
    infinite_retry: bool,
    last_retryable_cause: Option<SinkError>,
}

impl BackoffPolicy {
    pub fn new(infinite_retry: bool) -> Self {
        let strategy = ExponentialBackoff::from_millis(500).max_delay(Duration::from_secs(45));
        BackoffPolicy {
            current: Box::new(strategy.clone()),
            strategy,
            attempts: 0,
            infinite_retry,
            last_retryable_cause: None,
        }
    }

    pub fn with_strategy(strategy: ExponentialBackoff, infinite_retry: bool) -> Self {
        BackoffPolicy {
            current: Box::new(strategy.clone()),
            strategy,
            attempts: 0,
            infinite_retry,
            last_retryable_cause: None,
        }
    }

    /// Reset the attempt counter because a session made progress (spec
    /// invariant 5: "a session that successfully received >= 1 message
    /// resets the retry counter").
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.current = Box::new(self.strategy.clone());
        self.last_retryable_cause = None;
    }

    /// Returns the next sleep duration, or `Err(ErrBackoffExpired)` if the
    /// non-infinite cap has been reached. `cause` is recorded so that the
    /// eventual `BackoffExpired` error wraps the *last* retryable cause, not
    /// the first.
    pub fn next_backoff(&mut self, cause: SinkError) -> Result<Duration, SinkError> {
        self.last_retryable_cause = Some(cause);
        self.attempts += 1;

        if !self.infinite_retry && self.attempts > MAX_NON_PRODUCTIVE_ATTEMPTS {
            let last = self
                .last_retryable_cause
                .take()
                .unwrap_or_else(|| SinkError::Transient(RetryableError::new(BackoffCauseUnknown)));
            return Err(SinkError::BackoffExpired(Box::new(last)));
        }

        Ok(self.current.next().unwrap_or(Duration::from_secs(45)))
    }

    pub fn attempts(&self) -> usize {
        self.attempts
    }
}

#[derive(Debug, thiserror::Error)]
#[error("backoff expired with no recorded cause")]
struct BackoffCauseUnknown;

//! Handler polymorphism (spec §9): a capability set of
//! `{HandleBlockScopedData, HandleBlockUndoSignal}`, optionally extended
//! with `HandleBlockRangeCompletion`.
//!
//! Rather than test for an optional capability at runtime (a second
//! interface probed via a type assertion, as the Go original does), this
//! models the extension as a constructor-supplied hook: `Sinker` takes a
//! `Box<dyn BlockDataHandler>` plus an `Option<Box<dyn CompletionHandler>>`.
//! That's the alternative spec §9 explicitly allows ("a hook field set via
//! constructor option") and is the more idiomatic shape in Rust, where
//! runtime trait-downcasting is the exception, not the rule.

use async_trait::async_trait;

use crate::cursor::Cursor;
use crate::pb::{BlockScopedData, BlockUndoSignal};

/// The user's business logic. Errors returned here are non-retryable unless
/// wrapped in [`crate::error::RetryableError`], in which case the sinker
/// retries instead of surfacing the error from `Run`.
#[async_trait]
pub trait BlockDataHandler: Send + Sync {
    async fn handle_block_scoped_data(
        &mut self,
        data: &BlockScopedData,
        is_live: Option<bool>,
        cursor: &Cursor,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Not invoked at all when an undo buffer is in use (spec §4.C
    /// invariant: the buffer absorbs undo signals within its window).
    async fn handle_block_undo_signal(
        &mut self,
        undo: &BlockUndoSignal,
        cursor: &Cursor,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Optional extension invoked exactly once, only on a clean, bounded-range
/// completion (spec §4.G "Completion semantics").
#[async_trait]
pub trait CompletionHandler: Send + Sync {
    async fn handle_block_range_completion(
        &mut self,
        last_cursor: &Cursor,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

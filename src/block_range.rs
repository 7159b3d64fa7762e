//! Half-open block range `[start, end)` (spec §3).

use crate::error::SinkError;

/// Immutable after construction. `end == None` means infinite streaming.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockRange {
    start: i64,
    end: Option<u64>,
}

impl BlockRange {
    /// Fails with [`SinkError::InvalidBlockRange`] if `end` is set and
    /// precedes a literal (non-negative) `start` — a malformed-caller-input
    /// error, not an internal invariant, so it's reported rather than
    /// panicking (matching `ClientConfig::with_extra_headers`'s handling of
    /// the analogous case in `src/config.rs`). A negative `start` is a
    /// relative-to-head value the core can't order against `end` itself; the
    /// server rejects that combination if it's nonsensical.
    pub fn new(start: i64, end: Option<u64>) -> Result<Self, SinkError> {
        if let Some(end) = end {
            if start >= 0 && (end as i64) < start {
                return Err(SinkError::InvalidBlockRange { start, end });
            }
        }
        Ok(BlockRange { start, end })
    }

    pub fn infinite_from(start: i64) -> Self {
        BlockRange { start, end: None }
    }

    pub fn start(&self) -> i64 {
        self.start
    }

    pub fn end(&self) -> Option<u64> {
        self.end
    }

    pub fn is_bounded(&self) -> bool {
        self.end.is_some()
    }

    /// True once `block_num` reaches or passes the configured end.
    pub fn is_past_end(&self, block_num: u64) -> bool {
        matches!(self.end, Some(end) if block_num >= end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infinite_range_has_no_end() {
        let r = BlockRange::infinite_from(10);
        assert!(!r.is_bounded());
        assert!(!r.is_past_end(u64::MAX));
    }

    #[test]
    fn bounded_range_detects_past_end() {
        let r = BlockRange::new(100, Some(105)).unwrap();
        assert!(!r.is_past_end(104));
        assert!(r.is_past_end(105));
    }

    #[test]
    fn end_before_start_is_rejected() {
        let err = BlockRange::new(100, Some(50)).unwrap_err();
        assert!(matches!(err, SinkError::InvalidBlockRange { start: 100, end: 50 }));
    }

    #[test]
    fn negative_start_skips_the_ordering_check() {
        assert!(BlockRange::new(-1, Some(0)).is_ok());
    }
}

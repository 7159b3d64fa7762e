//! Bounded FIFO reorg buffer (spec §3 "UndoBuffer state", §4.C).

use std::collections::VecDeque;

use crate::error::SinkError;
use crate::pb::{BlockScopedData, BlockUndoSignal};

fn block_number(bsd: &BlockScopedData) -> u64 {
    bsd.clock.as_ref().map(|c| c.number).unwrap_or_default()
}

/// Delays delivery of [`BlockScopedData`] until `capacity` deeper blocks have
/// arrived behind them, and absorbs undo signals that land within its
/// window without ever surfacing them to the handler.
///
/// `capacity == 0` is not constructed as an `UndoBuffer` at all: the sinker
/// treats a `None` buffer as direct passthrough (spec §4.C).
pub struct UndoBuffer {
    capacity: usize,
    buf: VecDeque<BlockScopedData>,
}

impl UndoBuffer {
    /// `capacity` must be `>= 1`; the sinker is responsible for not
    /// constructing one at all when the configured capacity is `0`.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 1, "UndoBuffer capacity must be >= 1; use None for passthrough");
        UndoBuffer { capacity, buf: VecDeque::with_capacity(capacity) }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Appends `bsd`; once the buffer is full, releases the oldest entry.
    /// Returns at most one block, matching spec §4.C ("returns the oldest
    /// as a single-element list").
    pub fn handle_block_data(&mut self, bsd: BlockScopedData) -> Vec<BlockScopedData> {
        self.buf.push_back(bsd);
        if self.buf.len() > self.capacity {
            // can't exceed capacity by more than one push at a time
            let released = self.buf.pop_front().expect("just pushed, buffer non-empty");
            return vec![released];
        }
        Vec::new()
    }

    /// Drops every buffered block with `number > last_valid_block.number`.
    /// Fails with [`SinkError::UndoOutOfWindow`] if the rewind target isn't
    /// represented in the buffer at all — i.e. the reorg reaches back
    /// further than the configured capacity.
    pub fn handle_undo(&mut self, undo: &BlockUndoSignal) -> Result<(), SinkError> {
        let target = undo
            .last_valid_block
            .as_ref()
            .map(|b| b.number)
            .unwrap_or_default();

        let oldest_buffered = match self.buf.front() {
            Some(b) => block_number(b),
            None => {
                // nothing buffered: there's nothing to rewind, nothing to reject either
                return Ok(());
            }
        };

        if target < oldest_buffered {
            return Err(SinkError::UndoOutOfWindow { requested: target, oldest_buffered });
        }

        while let Some(back) = self.buf.back() {
            if block_number(back) > target {
                self.buf.pop_back();
            } else {
                break;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pb::{self, BlockRef};

    fn bsd(number: u64) -> BlockScopedData {
        BlockScopedData {
            output: None,
            clock: Some(pb::Clock { id: format!("0x{number}"), number, timestamp: None }),
            cursor: format!("cursor-{number}"),
            final_block_height: 0,
        }
    }

    fn undo_to(number: u64) -> BlockUndoSignal {
        BlockUndoSignal {
            last_valid_block: Some(BlockRef { id: format!("0x{number}"), number }),
            last_valid_cursor: format!("cursor-{number}"),
        }
    }

    #[test]
    fn releases_oldest_once_full() {
        let mut buf = UndoBuffer::new(2);
        assert!(buf.handle_block_data(bsd(10)).is_empty());
        assert!(buf.handle_block_data(bsd(11)).is_empty());
        let released = buf.handle_block_data(bsd(12));
        assert_eq!(released.len(), 1);
        assert_eq!(released[0].clock.as_ref().unwrap().number, 10);
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn undo_within_window_drops_tail_silently() {
        // scenario 3: C=3, blocks 10, 11, 12 buffered, undo to 10, then 11', 12'
        let mut buf = UndoBuffer::new(3);
        assert!(buf.handle_block_data(bsd(10)).is_empty());
        assert!(buf.handle_block_data(bsd(11)).is_empty());
        assert!(buf.handle_block_data(bsd(12)).is_empty());

        buf.handle_undo(&undo_to(10)).unwrap();
        assert_eq!(buf.len(), 1); // only block 10 remains

        assert!(buf.handle_block_data(bsd(11)).is_empty());
        assert!(buf.handle_block_data(bsd(12)).is_empty());
        let released = buf.handle_block_data(bsd(13));
        assert_eq!(released[0].clock.as_ref().unwrap().number, 10);
    }

    #[test]
    fn undo_beyond_window_fails() {
        // scenario 4: C=2; 10, 11 buffered (nothing released); 12 releases 10,
        // buffer=[11,12]; undo to 9 must fail.
        let mut buf = UndoBuffer::new(2);
        assert!(buf.handle_block_data(bsd(10)).is_empty());
        assert!(buf.handle_block_data(bsd(11)).is_empty());
        let released = buf.handle_block_data(bsd(12));
        assert_eq!(released[0].clock.as_ref().unwrap().number, 10);

        let err = buf.handle_undo(&undo_to(9)).unwrap_err();
        assert!(matches!(err, SinkError::UndoOutOfWindow { requested: 9, oldest_buffered: 11 }));
    }

    #[test]
    fn released_blocks_are_monotonic() {
        let mut buf = UndoBuffer::new(1);
        let mut numbers = Vec::new();
        for n in [100, 101, 102, 103] {
            numbers.extend(buf.handle_block_data(bsd(n)).iter().map(block_number));
        }
        assert!(numbers.windows(2).all(|w| w[0] < w[1]));
    }
}

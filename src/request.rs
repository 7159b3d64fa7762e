//! Translates sinker configuration + current cursor into the next RPC
//! request (spec §4.E).

use crate::block_range::BlockRange;
use crate::cursor::Cursor;
use crate::pb::{Modules, Request};

pub struct RequestBuilder<'a> {
    pub modules: Option<&'a Modules>,
    pub output_module: &'a str,
    pub production_mode: bool,
    pub final_blocks_only: bool,
}

impl<'a> RequestBuilder<'a> {
    /// `range` is the sinker's *configured* range; `undo_buffer_capacity` is
    /// `0` when no buffer is in use. The wire `stop_block_num` is adjusted
    /// by the buffer's capacity so that exactly `end - start` blocks are
    /// eventually released to the handler (spec §4.C "range adjustment"):
    /// the final `capacity` blocks streamed act purely as finality margin
    /// and are never released.
    pub fn build(&self, range: &BlockRange, cursor: &Cursor, undo_buffer_capacity: u64) -> Request {
        let stop_block_num = match range.end() {
            // never send u64::MAX: "the server performs poorly on that sentinel" (spec §4.E)
            None => 0,
            Some(end) => end + undo_buffer_capacity,
        };

        Request {
            start_block_num: range.start(),
            start_cursor: cursor.as_str().to_string(),
            stop_block_num,
            final_blocks_only: self.final_blocks_only,
            modules: self.modules.cloned(),
            output_module: self.output_module.to_string(),
            production_mode: self.production_mode,
            debug_initial_store_snapshot_for_modules: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infinite_range_requests_stop_zero() {
        let range = BlockRange::new(100, None).unwrap();
        let builder = RequestBuilder {
            modules: None,
            output_module: "map_transfers",
            production_mode: true,
            final_blocks_only: false,
        };
        let req = builder.build(&range, &Cursor::begin(), 0);
        assert_eq!(req.start_block_num, 100);
        assert_eq!(req.stop_block_num, 0);
    }

    #[test]
    fn bounded_range_adjusts_for_buffer_capacity() {
        // scenario 2: range [100, 103), C=2 -> wire stop block is 105
        let range = BlockRange::new(100, Some(103)).unwrap();
        let builder = RequestBuilder {
            modules: None,
            output_module: "map_transfers",
            production_mode: true,
            final_blocks_only: false,
        };
        let req = builder.build(&range, &Cursor::begin(), 2);
        assert_eq!(req.stop_block_num, 105);
    }
}

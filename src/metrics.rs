//! Counter/gauge collaborator (spec §4.H, §6 "Metric names").
//!
//! No particular metrics crate is in the teacher's dependency tree, so
//! rather than fabricate a `prometheus`/`metrics` dependency it never
//! reaches for, this exposes a small trait backed by atomics. A consumer who
//! wants Prometheus-style export can implement [`Metrics`] over their own
//! registry; [`SinkerMetrics`] is the process-local default.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Mutex;

pub const DATA_MESSAGE: &str = "substreams_sink_data_message";
pub const DATA_MESSAGE_SIZE_BYTES: &str = "substreams_sink_data_message_size_bytes";
pub const UNDO_MESSAGE: &str = "substreams_sink_undo_message";
pub const UNKNOWN_MESSAGE: &str = "substreams_sink_unknown_message";
pub const PROGRESS_MESSAGE: &str = "substreams_sink_progress_message";
pub const PROGRESS_TOTAL_PROCESSED_BLOCKS: &str =
    "substreams_sink_progress_message_total_processed_blocks";
pub const PROGRESS_LAST_BLOCK: &str = "substreams_sink_progress_message_last_block";
pub const PROGRESS_LAST_CONTIGUOUS_BLOCK: &str =
    "substreams_sink_progress_message_last_contiguous_block";
pub const PROGRESS_RUNNING_JOBS: &str = "substreams_sink_progress_message_running_jobs";
pub const ERROR: &str = "substreams_sink_error";
pub const BACKPROCESSING_COMPLETION: &str = "substreams_sink_backprocessing_completion";
pub const HEAD_BLOCK_NUMBER: &str = "head_block_number";
pub const HEAD_BLOCK_TIME_DRIFT: &str = "head_block_time_drift";

/// Thin counter/gauge interface. Implementations must be safe for
/// concurrent mutation: metrics objects are process-global (spec §9).
pub trait Metrics: Send + Sync {
    fn incr_counter(&self, name: &str);
    fn set_gauge(&self, name: &str, value: i64);
    fn set_stage_gauge(&self, name: &str, stage: u32, value: i64);

    /// One-line summary for the periodic stats ticker and the final
    /// shutdown log line (spec §7 "a final stats log line"). `None` by
    /// default; a registry with nothing worth summarizing can skip it.
    fn stats_summary(&self) -> Option<String> {
        None
    }
}

#[derive(Default)]
pub struct SinkerMetrics {
    counters: Mutex<HashMap<&'static str, AtomicU64>>,
    gauges: Mutex<HashMap<String, AtomicI64>>,
}

impl SinkerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.counters
            .lock()
            .unwrap()
            .get(name)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn gauge(&self, name: &str) -> i64 {
        self.gauges
            .lock()
            .unwrap()
            .get(name)
            .map(|g| g.load(Ordering::Relaxed))
            .unwrap_or(0)
    }
}

impl Metrics for SinkerMetrics {
    fn incr_counter(&self, name: &str) {
        let mut counters = self.counters.lock().unwrap();
        counters
            .entry(Self::leak(name))
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    fn set_gauge(&self, name: &str, value: i64) {
        let mut gauges = self.gauges.lock().unwrap();
        gauges
            .entry(name.to_string())
            .or_insert_with(|| AtomicI64::new(0))
            .store(value, Ordering::Relaxed);
    }

    fn set_stage_gauge(&self, name: &str, stage: u32, value: i64) {
        self.set_gauge(&format!("{name}{{stage={stage}}}"), value);
    }

    fn stats_summary(&self) -> Option<String> {
        Some(format!(
            "data_messages={} undo_messages={} head_block={}",
            self.counter(DATA_MESSAGE),
            self.counter(UNDO_MESSAGE),
            self.gauge(HEAD_BLOCK_NUMBER),
        ))
    }
}

impl SinkerMetrics {
    /// Counter names are all `'static` string constants above; interning via
    /// `leak` keeps the map key type `&'static str` without reaching for a
    /// string-interning dependency for nine fixed names.
    fn leak(name: &str) -> &'static str {
        match name {
            DATA_MESSAGE => DATA_MESSAGE,
            DATA_MESSAGE_SIZE_BYTES => DATA_MESSAGE_SIZE_BYTES,
            UNDO_MESSAGE => UNDO_MESSAGE,
            UNKNOWN_MESSAGE => UNKNOWN_MESSAGE,
            PROGRESS_MESSAGE => PROGRESS_MESSAGE,
            ERROR => ERROR,
            BACKPROCESSING_COMPLETION => BACKPROCESSING_COMPLETION,
            _ => "substreams_sink_unlabeled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let m = SinkerMetrics::new();
        m.incr_counter(DATA_MESSAGE);
        m.incr_counter(DATA_MESSAGE);
        assert_eq!(m.counter(DATA_MESSAGE), 2);
    }

    #[test]
    fn stage_gauges_are_labeled() {
        let m = SinkerMetrics::new();
        m.set_stage_gauge(PROGRESS_LAST_BLOCK, 0, 42);
        assert_eq!(m.gauge("substreams_sink_progress_message_last_block{stage=0}"), 42);
    }
}

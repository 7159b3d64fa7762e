//! Liveness predicate (spec §4.B): is a block "near head" by some rule.

use std::time::Duration;

use crate::pb;

/// Capability predicate: is this block live (near head)?
///
/// When no checker is configured on the sinker, the `is_live` argument
/// passed to the handler is simply absent (`None`) rather than defaulting to
/// some checker — see [`crate::sinker::Sinker`].
pub trait LivenessChecker: Send + Sync {
    fn is_live(&self, clock: &pb::Clock) -> bool;
}

/// Default realization: `now - clock.timestamp <= delta`.
pub struct DeltaLivenessChecker {
    delta: Duration,
}

impl DeltaLivenessChecker {
    pub fn new(delta: Duration) -> Self {
        DeltaLivenessChecker { delta }
    }
}

impl LivenessChecker for DeltaLivenessChecker {
    fn is_live(&self, clock: &pb::Clock) -> bool {
        let Some(ts) = clock.timestamp.as_ref() else {
            return false;
        };
        let block_time = chrono::DateTime::from_timestamp(ts.seconds, ts.nanos.max(0) as u32);
        let Some(block_time) = block_time else {
            return false;
        };
        let now = chrono::Utc::now();
        match (now - block_time).to_std() {
            Ok(drift) => drift <= self.delta,
            // negative drift (clock in the future) is as live as it gets
            Err(_) => true,
        }
    }
}

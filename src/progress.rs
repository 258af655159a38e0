//! Per-task progress throttling with speed and ETA computation.

use crate::types::Progress;
use std::time::Duration;
use tokio::time::Instant;

/// Throttles raw progress samples for one task.
///
/// Owned by the task's own execution unit, so no locking is involved: the
/// pipeline feeds every raw sample through [`report`](Self::report) and only
/// forwards the snapshots that survive the minimum-interval filter.
///
/// Speed is instantaneous — computed from the byte delta against the previous
/// *emitted* sample, not a cumulative average — so a stalling transfer shows
/// up as a stalling speed instead of a slowly decaying one.
pub struct ProgressReporter {
    min_interval: Duration,
    last_emit: Option<Instant>,
    last_bytes: u64,
}

impl ProgressReporter {
    /// Create a reporter that emits at most one snapshot per `min_interval`.
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_emit: None,
            last_bytes: 0,
        }
    }

    /// Feed one raw sample.
    ///
    /// Returns the computed snapshot if enough time has passed since the last
    /// emission, or `None` if the sample is suppressed. The first sample of a
    /// phase always emits (with zero speed, since there is no delta yet).
    pub fn report(&mut self, bytes_done: u64, bytes_total: u64) -> Option<Progress> {
        let now = Instant::now();

        let speed_bps = match self.last_emit {
            Some(prev) => {
                let elapsed = now.duration_since(prev);
                if elapsed < self.min_interval {
                    return None;
                }
                let secs = elapsed.as_secs_f64();
                if secs > 0.0 {
                    (bytes_done.saturating_sub(self.last_bytes) as f64 / secs) as u64
                } else {
                    0
                }
            }
            None => 0,
        };

        let eta_seconds = if speed_bps > 0 && bytes_total > bytes_done {
            Some((bytes_total - bytes_done) / speed_bps)
        } else {
            None
        };

        self.last_emit = Some(now);
        self.last_bytes = bytes_done;

        Some(Progress {
            bytes_done,
            bytes_total,
            speed_bps,
            eta_seconds,
        })
    }
}

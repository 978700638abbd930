use std::time::{Duration, Instant};

use crate::core::monitor::error::{ProbeError, ProbeResult};

/// Per-second rate between two readings of a monotonically increasing counter.
///
/// A counter that went backwards (device reset or wraparound) is an anomaly,
/// never a negative or inflated rate.
pub fn counter_rate(previous: u64, current: u64, elapsed: Duration) -> ProbeResult<f64> {
    if current < previous {
        return Err(ProbeError::counter_anomaly(format!(
            "counter went from {} to {}",
            previous, current
        )));
    }
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return Err(ProbeError::counter_anomaly("no time elapsed between samples"));
    }
    Ok((current - previous) as f64 / secs)
}

/// Remembers the previous counter sample to turn totals into rates.
#[derive(Debug, Clone, Default)]
pub struct CounterRate {
    last: Option<(u64, Instant)>,
}

impl CounterRate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a new counter value.
    ///
    /// Returns `Ok(None)` for the first sample. After an anomaly the new value
    /// becomes the baseline, so the pair is discarded and the next poll recovers.
    pub fn observe(&mut self, value: u64, at: Instant) -> ProbeResult<Option<f64>> {
        let previous = self.last.replace((value, at));
        match previous {
            None => Ok(None),
            Some((prev_value, prev_at)) => {
                counter_rate(prev_value, value, at.saturating_duration_since(prev_at)).map(Some)
            }
        }
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

/// Convert a bytes-per-second rate to megabits per second
pub fn bytes_per_sec_to_mbps(rate: f64) -> f64 {
    rate * 8.0 / 1_000_000.0
}

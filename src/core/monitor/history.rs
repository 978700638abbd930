use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::metrics::Metric;

pub const DEFAULT_HISTORY_SIZE: usize = 300;

pub type HistoryPoint = (DateTime<Utc>, f64);

/// Per-metric ring buffers of genuine measurements (for charts).
///
/// Every metric gets its own lock, so the collector owning a metric is the only
/// writer of that buffer and collectors never contend with each other.
#[derive(Debug)]
pub struct HistoryStore {
    capacity: usize,
    series: HashMap<Metric, RwLock<VecDeque<HistoryPoint>>>,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let series = Metric::ALL
            .iter()
            .map(|&metric| (metric, RwLock::new(VecDeque::with_capacity(capacity))))
            .collect();
        Self { capacity, series }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a value, evicting the oldest when full.
    ///
    /// Returns false when the sample is older than the newest recorded one.
    pub fn record(&self, metric: Metric, timestamp: DateTime<Utc>, value: f64) -> bool {
        let Some(buffer) = self.series.get(&metric) else {
            return false;
        };
        let mut queue = buffer.write();
        if let Some(&(last, _)) = queue.back() {
            if timestamp < last {
                log::debug!("Dropping out-of-order history sample for {}", metric);
                return false;
            }
        }
        Self::push_value(&mut *queue, (timestamp, value), self.capacity);
        true
    }

    fn push_value<T>(queue: &mut VecDeque<T>, value: T, capacity: usize) {
        if queue.len() >= capacity {
            queue.pop_front();
        }
        queue.push_back(value);
    }

    /// The newest `max_points` samples, oldest first
    pub fn series(&self, metric: Metric, max_points: usize) -> Vec<HistoryPoint> {
        self.series
            .get(&metric)
            .map(|buffer| {
                let queue = buffer.read();
                let skip = queue.len().saturating_sub(max_points);
                queue.iter().skip(skip).copied().collect()
            })
            .unwrap_or_default()
    }

    pub fn len(&self, metric: Metric) -> usize {
        self.series
            .get(&metric)
            .map(|buffer| buffer.read().len())
            .unwrap_or(0)
    }
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_capacity_is_never_exceeded_and_oldest_go_first() {
        let store = HistoryStore::with_capacity(3);
        for i in 0..5 {
            assert!(store.record(Metric::CpuPercent, at(i), i as f64));
        }

        assert_eq!(store.len(Metric::CpuPercent), 3);
        let values: Vec<f64> = store
            .series(Metric::CpuPercent, usize::MAX)
            .into_iter()
            .map(|(_, v)| v)
            .collect();
        assert_eq!(values, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_series_returns_newest_points_in_order() {
        let store = HistoryStore::with_capacity(10);
        for i in 0..6 {
            store.record(Metric::InternetLatency, at(i), 10.0 + i as f64);
        }

        let series = store.series(Metric::InternetLatency, 2);
        assert_eq!(series, vec![(at(4), 14.0), (at(5), 15.0)]);
    }

    #[test]
    fn test_out_of_order_samples_are_rejected() {
        let store = HistoryStore::with_capacity(4);
        assert!(store.record(Metric::RamPercent, at(10), 1.0));
        assert!(!store.record(Metric::RamPercent, at(5), 2.0));
        assert!(store.record(Metric::RamPercent, at(10), 3.0));
        assert_eq!(store.len(Metric::RamPercent), 2);
    }

    #[test]
    fn test_metrics_are_independent() {
        let store = HistoryStore::with_capacity(2);
        store.record(Metric::NicUpMbps, at(1), 1.0);
        assert_eq!(store.len(Metric::NicDownMbps), 0);
        assert!(store.series(Metric::NicDownMbps, 10).is_empty());
    }
}

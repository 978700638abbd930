//! Folds collector readings into immutable snapshots.
//!
//! The merge is a pure function: the orchestrator applies it one reading at a
//! time and publishes each resulting snapshot.

use super::error::ProbeError;
use super::metrics::{Entry, MetricState, Reading, Snapshot};

/// Merge one reading into the current snapshot, producing a new snapshot.
///
/// Returns `None` when the reading has been superseded by a newer attempt of the
/// same collector (late arrival), in which case nothing changes.
pub fn merge(current: &Snapshot, reading: &Reading) -> Option<Snapshot> {
    if let Some(last) = current.last_attempt(reading.metric) {
        if reading.attempt <= last {
            return None;
        }
    }

    let previous = current.get(reading.metric);
    let state = match &reading.outcome {
        // A wall clock stepped backwards must not move the metric's time back
        Ok(value) => MetricState::Fresh {
            value: *value,
            observed_at: previous
                .observed_at()
                .map_or(reading.timestamp, |prev_at| prev_at.max(reading.timestamp)),
        },
        Err(ProbeError::NotApplicable) => MetricState::NotApplicable,
        Err(error) => match previous {
            MetricState::Fresh { value, observed_at }
            | MetricState::Stale {
                value, observed_at, ..
            } => MetricState::Stale {
                value: *value,
                observed_at: *observed_at,
                reason: error.to_string(),
            },
            MetricState::NeverObserved | MetricState::NotApplicable => MetricState::NeverObserved,
        },
    };

    let mut next = current.clone();
    next.entries.insert(
        reading.metric,
        Entry {
            state,
            attempt: reading.attempt,
        },
    );
    next.timestamp = Some(match current.timestamp {
        Some(ts) if ts > reading.timestamp => ts,
        _ => reading.timestamp,
    });
    Some(next)
}

/// Fold a batch of readings in arrival order
pub fn merge_all<'a, I>(initial: Snapshot, readings: I) -> Snapshot
where
    I: IntoIterator<Item = &'a Reading>,
{
    readings.into_iter().fold(initial, |snapshot, reading| {
        merge(&snapshot, reading).unwrap_or(snapshot)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::monitor::metrics::{Metric, MetricValue};
    use chrono::{TimeZone, Utc};
    use rand::seq::SliceRandom;
    use rand::Rng;

    fn at(secs: i64) -> chrono::DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn ok(metric: Metric, secs: i64, attempt: u64, value: f64) -> Reading {
        Reading::success(metric, at(secs), attempt, MetricValue::Number(value))
    }

    fn failed(metric: Metric, secs: i64, attempt: u64) -> Reading {
        Reading::failure(metric, at(secs), attempt, ProbeError::Timeout)
    }

    #[test]
    fn test_success_replaces_entry() {
        let s1 = merge(&Snapshot::empty(), &ok(Metric::InternetLatency, 1, 1, 42.0)).unwrap();
        let s2 = merge(&s1, &ok(Metric::InternetLatency, 2, 2, 50.0)).unwrap();

        assert_eq!(
            s2.get(Metric::InternetLatency),
            &MetricState::Fresh {
                value: MetricValue::Number(50.0),
                observed_at: at(2),
            }
        );
        // The original snapshot is untouched
        assert_eq!(s1.fresh_value(Metric::InternetLatency), Some(42.0));
    }

    #[test]
    fn test_failure_after_success_keeps_value_and_timestamp() {
        let s1 = merge(&Snapshot::empty(), &ok(Metric::RouterLatency, 1, 1, 3.0)).unwrap();
        let s2 = merge(&s1, &failed(Metric::RouterLatency, 5, 2)).unwrap();

        match s2.get(Metric::RouterLatency) {
            MetricState::Stale {
                value, observed_at, ..
            } => {
                assert_eq!(*value, MetricValue::Number(3.0));
                assert_eq!(*observed_at, at(1));
            }
            other => panic!("expected stale entry, got {:?}", other),
        }
    }

    #[test]
    fn test_repeated_failures_stay_stale_at_last_success() {
        let s1 = merge(&Snapshot::empty(), &ok(Metric::HttpLatency, 1, 1, 80.0)).unwrap();
        let s2 = merge(&s1, &failed(Metric::HttpLatency, 2, 2)).unwrap();
        let s3 = merge(&s2, &failed(Metric::HttpLatency, 3, 3)).unwrap();

        assert!(s3.get(Metric::HttpLatency).is_stale());
        assert_eq!(s3.get(Metric::HttpLatency).observed_at(), Some(at(1)));
    }

    #[test]
    fn test_first_failure_is_never_observed() {
        let s1 = merge(&Snapshot::empty(), &failed(Metric::SonicWallCpu, 1, 1)).unwrap();
        assert_eq!(s1.get(Metric::SonicWallCpu), &MetricState::NeverObserved);
        assert!(!s1.get(Metric::SonicWallCpu).is_stale());
    }

    #[test]
    fn test_not_applicable_is_not_stale() {
        let s1 = merge(&Snapshot::empty(), &ok(Metric::VpnLatency, 1, 1, 20.0)).unwrap();
        let reading = Reading::failure(Metric::VpnLatency, at(2), 2, ProbeError::NotApplicable);
        let s2 = merge(&s1, &reading).unwrap();
        assert_eq!(s2.get(Metric::VpnLatency), &MetricState::NotApplicable);
    }

    #[test]
    fn test_superseded_attempt_is_discarded() {
        let s1 = merge(&Snapshot::empty(), &ok(Metric::IspHopLatency, 5, 7, 9.0)).unwrap();
        assert!(merge(&s1, &ok(Metric::IspHopLatency, 9, 6, 99.0)).is_none());
        assert!(merge(&s1, &ok(Metric::IspHopLatency, 9, 7, 99.0)).is_none());
    }

    #[test]
    fn test_success_after_clock_step_back_is_applied() {
        let s1 = merge(&Snapshot::empty(), &ok(Metric::InternetLatency, 100, 1, 42.0)).unwrap();
        let s2 = merge(&s1, &ok(Metric::InternetLatency, 40, 2, 55.0)).unwrap();

        assert_eq!(
            s2.get(Metric::InternetLatency),
            &MetricState::Fresh {
                value: MetricValue::Number(55.0),
                observed_at: at(100),
            }
        );
    }

    #[test]
    fn test_snapshot_timestamp_tracks_latest_merge() {
        let s1 = merge(&Snapshot::empty(), &ok(Metric::CpuPercent, 4, 1, 10.0)).unwrap();
        let s2 = merge(&s1, &ok(Metric::RamPercent, 2, 1, 10.0)).unwrap();
        assert_eq!(s2.timestamp(), Some(at(4)));
    }

    #[test]
    fn test_random_interleavings_keep_one_entry_per_metric() {
        let metrics = [
            Metric::InternetLatency,
            Metric::PacketLoss,
            Metric::CpuPercent,
            Metric::WanInMbps,
        ];
        let mut rng = rand::thread_rng();

        for _ in 0..50 {
            // Per-metric readings in attempt order, randomly interleaved across metrics
            let mut queues: Vec<Vec<Reading>> = metrics
                .iter()
                .map(|&metric| {
                    (1..=10u64)
                        .map(|attempt| {
                            let secs = attempt as i64 * 10 + rng.gen_range(0..5);
                            if rng.gen_bool(0.3) {
                                failed(metric, secs, attempt)
                            } else {
                                ok(metric, secs, attempt, rng.gen_range(0.0..100.0))
                            }
                        })
                        .rev()
                        .collect()
                })
                .collect();

            let mut order: Vec<usize> = queues
                .iter()
                .enumerate()
                .flat_map(|(i, q)| std::iter::repeat(i).take(q.len()))
                .collect();
            order.shuffle(&mut rng);

            let mut snapshot = Snapshot::empty();
            let mut last_seen: std::collections::HashMap<Metric, chrono::DateTime<Utc>> =
                Default::default();

            for idx in order {
                let reading = queues[idx].pop().unwrap();
                snapshot = merge(&snapshot, &reading).unwrap_or(snapshot);

                assert!(snapshot.len() <= metrics.len());
                if let Some(ts) = snapshot.get(reading.metric).observed_at() {
                    if let Some(prev) = last_seen.insert(reading.metric, ts) {
                        assert!(ts >= prev, "timestamp went backwards for {}", reading.metric);
                    }
                }
            }

            assert_eq!(snapshot.len(), metrics.len());
        }
    }

    #[test]
    fn test_merge_all_folds_in_order() {
        let readings = vec![
            ok(Metric::DownloadMbps, 1, 1, 100.0),
            ok(Metric::UploadMbps, 1, 1, 20.0),
            failed(Metric::DownloadMbps, 2, 2),
        ];
        let snapshot = merge_all(Snapshot::empty(), &readings);
        assert!(snapshot.get(Metric::DownloadMbps).is_stale());
        assert_eq!(snapshot.fresh_value(Metric::UploadMbps), Some(20.0));
    }
}

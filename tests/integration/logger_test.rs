use std::time::Duration;

use chrono::{TimeZone, Utc};
use netpulse::core::monitor::{
    format_line, merge_all, HealthConfig, LogOutcome, Metric, MetricValue, ProbeError, Reading,
    Snapshot, SnapshotLog,
};
use tempfile::TempDir;

fn healthy(secs: u32) -> Snapshot {
    let at = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, secs).unwrap();
    merge_all(
        Snapshot::empty(),
        &[
            Reading::success(Metric::InternetLatency, at, 1, MetricValue::Number(23.0)),
            Reading::success(Metric::PacketLoss, at, 1, MetricValue::Percent(0.0)),
            Reading::success(Metric::GoogleMeetLatency, at, 1, MetricValue::Number(31.5)),
            Reading::failure(Metric::WifiSignalPercent, at, 1, ProbeError::NotApplicable),
        ],
    )
}

#[test]
fn test_healthy_line() {
    let line = format_line(&healthy(0), &HealthConfig::default());

    assert!(line.contains(" latency_ms=23"));
    assert!(line.contains(" signal_strength=n/a"));
    assert!(line.ends_with("status=OK stability=100 meeting=100"));
}

#[test]
fn test_every_metric_appears_once() {
    let line = format_line(&Snapshot::empty(), &HealthConfig::default());
    for metric in Metric::ALL {
        let needle = format!(" {}=", metric.key());
        assert_eq!(line.matches(&needle).count(), 1, "{}", metric.key());
    }
    assert!(line.contains("status=DOWN"));
}

#[test]
fn test_log_appends_lines() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("netpulse.log");
    let mut log = SnapshotLog::new(&path).with_interval(Duration::from_secs(10));

    assert_eq!(log.append(&healthy(0)), LogOutcome::Written);
    assert_eq!(log.append(&healthy(3)), LogOutcome::Throttled);
    assert_eq!(log.append(&healthy(10)), LogOutcome::Written);
    drop(log);

    let content = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines.iter().all(|l| l.ends_with("meeting=100")));
}

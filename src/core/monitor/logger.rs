//! Persistent, append-only snapshot log.
//!
//! One line per logged snapshot:
//! `YYYY-MM-DD HH:MM:SS key=value[*] ... status=OK stability=100 meeting=100`

use std::fmt::Write as _;
use std::fs::{File, OpenOptions};
use std::io::{LineWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local, Utc};

use super::health::{evaluate_health, HealthConfig};
use super::metrics::{Metric, MetricState, Snapshot};

pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);

/// What `append` did with a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutcome {
    Written,
    /// Skipped because the previous line is more recent than the log interval
    Throttled,
    /// Skipped while a write failure is cooling down
    Suppressed,
    Failed,
}

/// Render a snapshot as one log line (without the newline)
pub fn format_line(snapshot: &Snapshot, health: &HealthConfig) -> String {
    let timestamp = snapshot.timestamp().unwrap_or_else(Utc::now);
    let mut line = timestamp
        .with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string();

    for metric in Metric::ALL {
        let _ = match snapshot.get(metric) {
            MetricState::NeverObserved => write!(line, " {}=-", metric.key()),
            MetricState::NotApplicable => write!(line, " {}=n/a", metric.key()),
            MetricState::Fresh { value, .. } => write!(line, " {}={}", metric.key(), value),
            MetricState::Stale { value, .. } => write!(line, " {}={}*", metric.key(), value),
        };
    }

    let health = evaluate_health(snapshot, health);
    let _ = write!(
        line,
        " status={} stability={} meeting={}",
        health.status, health.stability_score, health.meeting_score
    );
    line
}

pub struct SnapshotLog {
    path: PathBuf,
    writer: Option<LineWriter<File>>,
    health: HealthConfig,
    every: Option<Duration>,
    last_line_at: Option<DateTime<Utc>>,
    cooldown: Duration,
    suppressed_until: Option<Instant>,
    lines_written: u64,
}

impl SnapshotLog {
    /// Log every snapshot handed to `append`. The file is opened lazily.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            writer: None,
            health: HealthConfig::default(),
            every: None,
            last_line_at: None,
            cooldown: DEFAULT_COOLDOWN,
            suppressed_until: None,
            lines_written: 0,
        }
    }

    /// Write at most one line per `every` of snapshot time
    pub fn with_interval(mut self, every: Duration) -> Self {
        self.every = (!every.is_zero()).then_some(every);
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn with_health(mut self, health: HealthConfig) -> Self {
        self.health = health;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lines_written(&self) -> u64 {
        self.lines_written
    }

    fn is_due(&self, snapshot: &Snapshot) -> bool {
        let (Some(every), Some(last), Some(now)) = (self.every, self.last_line_at, snapshot.timestamp())
        else {
            return true;
        };
        chrono::Duration::from_std(every)
            .map(|every| now - last >= every)
            .unwrap_or(true)
    }

    fn writer(&mut self) -> std::io::Result<&mut LineWriter<File>> {
        if self.writer.is_none() {
            if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?;
            self.writer = Some(LineWriter::new(file));
        }
        // Just populated above
        self.writer
            .as_mut()
            .ok_or_else(|| std::io::Error::other("log writer unavailable"))
    }

    pub fn append(&mut self, snapshot: &Snapshot) -> LogOutcome {
        if let Some(until) = self.suppressed_until {
            if Instant::now() < until {
                return LogOutcome::Suppressed;
            }
            self.suppressed_until = None;
            log::info!("Retrying snapshot log {}", self.path.display());
        }

        if !self.is_due(snapshot) {
            return LogOutcome::Throttled;
        }

        let line = format_line(snapshot, &self.health);
        let result = self
            .writer()
            .and_then(|writer| writeln!(writer, "{}", line));

        match result {
            Ok(()) => {
                self.last_line_at = snapshot.timestamp().or(self.last_line_at);
                self.lines_written += 1;
                LogOutcome::Written
            }
            Err(e) => {
                log::warn!(
                    "Failed to write snapshot log {}: {} (suppressing for {:?})",
                    self.path.display(),
                    e,
                    self.cooldown
                );
                self.writer = None;
                self.suppressed_until = Some(Instant::now() + self.cooldown);
                LogOutcome::Failed
            }
        }
    }

    pub fn flush(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            if let Err(e) = writer.flush() {
                log::warn!("Failed to flush snapshot log {}: {}", self.path.display(), e);
            }
        }
    }
}

impl Drop for SnapshotLog {
    fn drop(&mut self) {
        self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::monitor::aggregator::merge_all;
    use crate::core::monitor::error::ProbeError;
    use crate::core::monitor::metrics::{MetricValue, Reading};
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn at(secs: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, secs).unwrap()
    }

    fn sample(secs: u32) -> Snapshot {
        merge_all(
            Snapshot::empty(),
            &[
                Reading::success(Metric::InternetLatency, at(0), 1, MetricValue::Number(42.0)),
                Reading::failure(Metric::InternetLatency, at(secs), 2, ProbeError::Timeout),
                Reading::success(Metric::PacketLoss, at(secs), 1, MetricValue::Percent(0.0)),
                Reading::failure(Metric::VpnLatency, at(secs), 1, ProbeError::NotApplicable),
            ],
        )
    }

    #[test]
    fn test_line_markers() {
        let line = format_line(&sample(1), &HealthConfig::default());
        let expected_prefix = at(1).with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string();

        assert!(line.starts_with(&expected_prefix));
        assert!(line.contains(" latency_ms=42*"));
        assert!(line.contains(" packet_loss_pct=0"));
        assert!(line.contains(" vpn_latency_ms=n/a"));
        assert!(line.contains(" download_mbps=-"));
        assert!(line.ends_with("status=DOWN stability=60 meeting=60"));
        assert!(!line.contains('\n'));
    }

    #[test]
    fn test_append_only_across_restarts() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs").join("netpulse.log");

        {
            let mut log = SnapshotLog::new(&path);
            assert_eq!(log.append(&sample(1)), LogOutcome::Written);
        }
        {
            let mut log = SnapshotLog::new(&path);
            assert_eq!(log.append(&sample(2)), LogOutcome::Written);
            log.flush();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.ends_with('\n'));
    }

    #[test]
    fn test_interval_throttles_by_snapshot_time() {
        let dir = TempDir::new().unwrap();
        let mut log = SnapshotLog::new(dir.path().join("n.log")).with_interval(Duration::from_secs(10));

        assert_eq!(log.append(&sample(1)), LogOutcome::Written);
        assert_eq!(log.append(&sample(5)), LogOutcome::Throttled);
        assert_eq!(log.append(&sample(11)), LogOutcome::Written);
        assert_eq!(log.lines_written(), 2);
    }

    #[test]
    fn test_write_failure_is_suppressed_then_retried() {
        let dir = TempDir::new().unwrap();
        // A directory cannot be opened for appending
        let mut log = SnapshotLog::new(dir.path()).with_cooldown(Duration::from_millis(50));

        assert_eq!(log.append(&sample(1)), LogOutcome::Failed);
        assert_eq!(log.append(&sample(2)), LogOutcome::Suppressed);

        std::thread::sleep(Duration::from_millis(80));
        assert_eq!(log.append(&sample(3)), LogOutcome::Failed);
        assert_eq!(log.lines_written(), 0);
    }
}

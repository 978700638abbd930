//! ICMP echo latency via the system `ping` tool.

use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::process::Command;

use super::{std_dev, Measurement, Probe};
use crate::core::monitor::error::{ProbeError, ProbeResult};
use crate::core::monitor::metrics::{round2, Metric};

// "time=12.3 ms" (Linux/macOS), "time=12ms" / "time<1ms" (Windows), localized variants
static REPLY_TIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:time|tiempo|zeit|temps)\s*[=<]\s*([0-9]+(?:[.,][0-9]+)?)\s*ms")
        .expect("valid reply regex")
});

/// Parsed result of one ping run
#[derive(Debug, Clone, PartialEq)]
pub struct PingStats {
    pub sent: u32,
    pub rtts_ms: Vec<f64>,
}

impl PingStats {
    pub fn received(&self) -> u32 {
        self.rtts_ms.len() as u32
    }

    pub fn loss_pct(&self) -> f64 {
        if self.sent == 0 {
            return 100.0;
        }
        let lost = self.sent.saturating_sub(self.received());
        (1000.0 * lost as f64 / self.sent as f64).round() / 10.0
    }

    pub fn average_ms(&self) -> Option<f64> {
        if self.rtts_ms.is_empty() {
            return None;
        }
        Some(round2(self.rtts_ms.iter().sum::<f64>() / self.rtts_ms.len() as f64))
    }

    pub fn jitter_ms(&self) -> Option<f64> {
        if self.rtts_ms.is_empty() {
            return None;
        }
        Some(round2(std_dev(&self.rtts_ms)))
    }
}

/// Extract per-reply round-trip times from `ping` output.
pub fn parse_ping_output(output: &str, sent: u32) -> PingStats {
    let rtts_ms = output
        .lines()
        .filter_map(|line| REPLY_TIME.captures(line))
        .filter_map(|caps| caps[1].replace(',', ".").parse::<f64>().ok())
        .take(sent as usize)
        .collect();
    PingStats { sent, rtts_ms }
}

/// Latency and loss towards one host.
///
/// Latency fails when every echo is lost; loss is still reported (100%).
pub struct PingProbe {
    name: String,
    host: String,
    count: u32,
    wait: Duration,
    latency: Option<Metric>,
    loss: Metric,
    jitter: Option<Metric>,
}

impl PingProbe {
    pub fn new<S: Into<String>>(host: S, latency: Metric, loss: Metric) -> Self {
        Self {
            latency: Some(latency),
            ..Self::loss_only(host, loss)
        }
    }

    /// Only report loss, for hosts whose latency is measured some other way
    pub fn loss_only<S: Into<String>>(host: S, loss: Metric) -> Self {
        let host = host.into();
        Self {
            name: format!("ping {}", host),
            host,
            count: 5,
            wait: Duration::from_secs(2),
            latency: None,
            loss,
            jitter: None,
        }
    }

    pub fn with_jitter(mut self, metric: Metric) -> Self {
        self.jitter = Some(metric);
        self
    }

    pub fn with_count(mut self, count: u32, wait: Duration) -> Self {
        self.count = count.max(1);
        self.wait = wait;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new("ping");

        #[cfg(windows)]
        {
            cmd.args([
                "-n".to_string(),
                self.count.to_string(),
                "-w".to_string(),
                self.wait.as_millis().to_string(),
                self.host.clone(),
            ]);
        }

        #[cfg(target_os = "macos")]
        {
            cmd.args([
                "-n".to_string(),
                "-c".to_string(),
                self.count.to_string(),
                "-W".to_string(),
                self.wait.as_millis().to_string(),
                self.host.clone(),
            ]);
        }

        #[cfg(all(unix, not(target_os = "macos")))]
        {
            cmd.args([
                "-n".to_string(),
                "-c".to_string(),
                self.count.to_string(),
                "-i".to_string(),
                "0.2".to_string(),
                "-W".to_string(),
                self.wait.as_secs().max(1).to_string(),
                self.host.clone(),
            ]);
        }

        cmd.kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl Probe for PingProbe {
    fn name(&self) -> &str {
        &self.name
    }

    fn metrics(&self) -> Vec<Metric> {
        let mut metrics: Vec<Metric> = self.latency.into_iter().collect();
        metrics.push(self.loss);
        metrics.extend(self.jitter);
        metrics
    }

    async fn measure(&mut self, _timeout: Duration) -> ProbeResult<Measurement> {
        // Non-zero exit just means some replies were lost; only a spawn failure is fatal
        let output = self
            .command()
            .output()
            .await
            .map_err(|e| ProbeError::from_command("ping", e))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stats = parse_ping_output(&stdout, self.count);
        log::trace!(
            "ping {}: {}/{} replies",
            self.host,
            stats.received(),
            stats.sent
        );

        let mut measurement = Measurement::new();
        measurement.push_value(self.loss, stats.loss_pct());

        if let Some(latency_metric) = self.latency {
            match stats.average_ms() {
                Some(avg) => measurement.push_value(latency_metric, avg),
                None => measurement.push_error(
                    latency_metric,
                    ProbeError::unreachable(format!("no echo replies from {}", self.host)),
                ),
            }
        }

        if let Some(jitter_metric) = self.jitter {
            match stats.jitter_ms() {
                Some(jitter) => measurement.push_value(jitter_metric, jitter),
                None => measurement.push_error(
                    jitter_metric,
                    ProbeError::unreachable(format!("no echo replies from {}", self.host)),
                ),
            }
        }

        Ok(measurement)
    }
}

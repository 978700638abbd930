//! Health evaluation over a snapshot.
//!
//! Produces the overall connection status plus two 0-100 scores. Only fresh
//! values count: a stale latency means the latest attempt failed.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::metrics::{Metric, Snapshot};

/// Status thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub down_loss_pct: f64,
    pub high_latency_ms: f64,
    pub high_loss_pct: f64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            down_loss_pct: 50.0,
            high_latency_ms: 200.0,
            high_loss_pct: 5.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthStatus {
    Ok,
    HighLatency,
    Down,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HealthStatus::Ok => "OK",
            HealthStatus::HighLatency => "HIGH_LATENCY",
            HealthStatus::Down => "DOWN",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    pub status: HealthStatus,
    pub stability_score: u8,
    pub meeting_score: u8,
}

pub fn evaluate_health(snapshot: &Snapshot, config: &HealthConfig) -> Health {
    Health {
        status: status(snapshot, config),
        stability_score: stability_score(snapshot),
        meeting_score: meeting_score(snapshot),
    }
}

pub fn status(snapshot: &Snapshot, config: &HealthConfig) -> HealthStatus {
    let latency = snapshot.fresh_value(Metric::InternetLatency);
    let loss = snapshot.fresh_value(Metric::PacketLoss).unwrap_or(0.0);

    match latency {
        None => HealthStatus::Down,
        Some(_) if loss >= config.down_loss_pct => HealthStatus::Down,
        Some(ms) if ms > config.high_latency_ms || loss >= config.high_loss_pct => {
            HealthStatus::HighLatency
        }
        Some(_) => HealthStatus::Ok,
    }
}

fn clamp_score(score: i32) -> u8 {
    score.clamp(0, 100) as u8
}

fn latency_penalty(latency: Option<f64>, missing: i32) -> i32 {
    match latency {
        None => missing,
        Some(ms) if ms > 300.0 => 30,
        Some(ms) if ms > 150.0 => 15,
        Some(ms) if ms > 80.0 => 5,
        Some(_) => 0,
    }
}

/// Network stability score
pub fn stability_score(snapshot: &Snapshot) -> u8 {
    let mut score = 100;

    if let Some(loss) = snapshot.fresh_value(Metric::PacketLoss) {
        score -= match loss {
            l if l >= 20.0 => 40,
            l if l >= 5.0 => 20,
            l if l >= 1.0 => 5,
            _ => 0,
        };
    }

    score -= latency_penalty(snapshot.fresh_value(Metric::InternetLatency), 40);

    for metric in [
        Metric::RouterPacketLoss,
        Metric::IspHopPacketLoss,
        Metric::IspHop2PacketLoss,
    ] {
        if let Some(loss) = snapshot.fresh_value(metric) {
            score -= match loss {
                l if l >= 20.0 => 15,
                l if l >= 5.0 => 7,
                _ => 0,
            };
        }
    }

    if let Some(signal) = snapshot.fresh_value(Metric::WifiSignalPercent) {
        score -= match signal {
            s if s < 30.0 => 20,
            s if s < 60.0 => 10,
            _ => 0,
        };
    }

    clamp_score(score)
}

/// Video meeting quality score
pub fn meeting_score(snapshot: &Snapshot) -> u8 {
    let mut score = 100;

    score -= latency_penalty(snapshot.fresh_value(Metric::GoogleMeetLatency), 30);

    if let Some(loss) = snapshot.fresh_value(Metric::MeetPacketLoss) {
        score -= match loss {
            l if l >= 10.0 => 30,
            l if l >= 3.0 => 15,
            l if l >= 1.0 => 5,
            _ => 0,
        };
    }

    if let Some(jitter) = snapshot.fresh_value(Metric::InternetJitter) {
        score -= match jitter {
            j if j > 50.0 => 20,
            j if j > 20.0 => 10,
            _ => 0,
        };
    }

    let internet_down = snapshot.fresh_value(Metric::InternetLatency).is_none()
        || snapshot
            .fresh_value(Metric::PacketLoss)
            .map(|loss| loss >= 20.0)
            .unwrap_or(false);
    if internet_down {
        score -= 10;
    }

    clamp_score(score)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::monitor::aggregator::merge_all;
    use crate::core::monitor::error::ProbeError;
    use crate::core::monitor::metrics::{MetricValue, Reading};
    use chrono::{TimeZone, Utc};

    fn snapshot(values: &[(Metric, f64)]) -> Snapshot {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        let readings: Vec<Reading> = values
            .iter()
            .map(|&(m, v)| Reading::success(m, ts, 1, MetricValue::for_metric(m, v)))
            .collect();
        merge_all(Snapshot::empty(), &readings)
    }

    #[test]
    fn test_status_thresholds() {
        let config = HealthConfig::default();
        let ok = snapshot(&[(Metric::InternetLatency, 20.0), (Metric::PacketLoss, 0.0)]);
        assert_eq!(status(&ok, &config), HealthStatus::Ok);

        let slow = snapshot(&[(Metric::InternetLatency, 250.0), (Metric::PacketLoss, 0.0)]);
        assert_eq!(status(&slow, &config), HealthStatus::HighLatency);

        let lossy = snapshot(&[(Metric::InternetLatency, 20.0), (Metric::PacketLoss, 5.0)]);
        assert_eq!(status(&lossy, &config), HealthStatus::HighLatency);

        let down = snapshot(&[(Metric::InternetLatency, 20.0), (Metric::PacketLoss, 60.0)]);
        assert_eq!(status(&down, &config), HealthStatus::Down);

        assert_eq!(status(&Snapshot::empty(), &config), HealthStatus::Down);
    }

    #[test]
    fn test_stale_latency_counts_as_down() {
        let config = HealthConfig::default();
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        let readings = vec![
            Reading::success(Metric::InternetLatency, ts, 1, MetricValue::Number(30.0)),
            Reading::failure(Metric::InternetLatency, ts, 2, ProbeError::Timeout),
        ];
        let snap = merge_all(Snapshot::empty(), &readings);
        assert_eq!(status(&snap, &config), HealthStatus::Down);
    }

    #[test]
    fn test_perfect_network_scores_full() {
        let snap = snapshot(&[
            (Metric::InternetLatency, 20.0),
            (Metric::PacketLoss, 0.0),
            (Metric::InternetJitter, 2.0),
            (Metric::GoogleMeetLatency, 30.0),
            (Metric::WifiSignalPercent, 90.0),
        ]);
        assert_eq!(stability_score(&snap), 100);
        assert_eq!(meeting_score(&snap), 100);
    }

    #[test]
    fn test_degraded_network_scores() {
        let snap = snapshot(&[
            (Metric::InternetLatency, 160.0),
            (Metric::PacketLoss, 6.0),
            (Metric::RouterPacketLoss, 25.0),
            (Metric::WifiSignalPercent, 45.0),
            (Metric::InternetJitter, 30.0),
        ]);
        // 100 - 20 (loss) - 15 (latency) - 15 (router) - 10 (wifi)
        assert_eq!(stability_score(&snap), 40);
        // 100 - 30 (no meet) - 10 (jitter)
        assert_eq!(meeting_score(&snap), 60);
    }

    #[test]
    fn test_scores_never_go_negative() {
        let snap = snapshot(&[
            (Metric::PacketLoss, 100.0),
            (Metric::RouterPacketLoss, 100.0),
            (Metric::IspHopPacketLoss, 100.0),
            (Metric::WifiSignalPercent, 5.0),
        ]);
        // 100 - 40 - 40 - 15 - 15 - 20
        assert_eq!(stability_score(&snap), 0);
        assert_eq!(meeting_score(&Snapshot::empty()), 60);
    }

    #[test]
    fn test_isp_hop_loss_lowers_stability_but_vpn_loss_does_not() {
        let base = [(Metric::InternetLatency, 20.0), (Metric::PacketLoss, 0.0)];
        let with = |extra: &[(Metric, f64)]| {
            let mut values = base.to_vec();
            values.extend_from_slice(extra);
            stability_score(&snapshot(&values))
        };

        assert_eq!(with(&[(Metric::VpnPacketLoss, 50.0)]), 100);
        assert_eq!(with(&[(Metric::IspHopPacketLoss, 6.0)]), 93);
        assert_eq!(
            with(&[
                (Metric::IspHopPacketLoss, 33.3),
                (Metric::IspHop2PacketLoss, 33.3),
                (Metric::RouterPacketLoss, 20.0),
            ]),
            // 100 - 7 - 7 - 15
            71
        );
    }

    #[test]
    fn test_meet_loss_tiers() {
        let score = |loss: f64| {
            meeting_score(&snapshot(&[
                (Metric::InternetLatency, 20.0),
                (Metric::GoogleMeetLatency, 30.0),
                (Metric::MeetPacketLoss, loss),
            ]))
        };
        assert_eq!(score(0.0), 100);
        assert_eq!(score(1.0), 95);
        assert_eq!(score(3.0), 85);
        assert_eq!(score(10.0), 70);
        assert_eq!(score(100.0), 70);
    }
}

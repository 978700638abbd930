use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::ProbeError;

/// Every quantity the monitor knows how to observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    InternetLatency,
    InternetJitter,
    PacketLoss,
    HttpLatency,
    GoogleMeetLatency,
    MeetPacketLoss,
    RouterLatency,
    RouterPacketLoss,
    IspHopLatency,
    IspHopPacketLoss,
    IspHop2Latency,
    IspHop2PacketLoss,
    SonicWallCpu,
    SonicWallSessions,
    WanInMbps,
    WanOutMbps,
    VpnActive,
    VpnLatency,
    VpnPacketLoss,
    CpuPercent,
    RamPercent,
    NicUpMbps,
    NicDownMbps,
    WifiSignalPercent,
    DownloadMbps,
    UploadMbps,
}

/// Declared value type of a metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueKind {
    Numeric,
    Percentage,
    Boolean,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Unit {
    Milliseconds,
    Percent,
    Mbps,
    Count,
    None,
}

impl Unit {
    pub fn suffix(self) -> &'static str {
        match self {
            Unit::Milliseconds => "ms",
            Unit::Percent => "%",
            Unit::Mbps => "Mbps",
            Unit::Count | Unit::None => "",
        }
    }
}

impl Metric {
    pub const ALL: [Metric; 26] = [
        Metric::InternetLatency,
        Metric::InternetJitter,
        Metric::PacketLoss,
        Metric::HttpLatency,
        Metric::GoogleMeetLatency,
        Metric::MeetPacketLoss,
        Metric::RouterLatency,
        Metric::RouterPacketLoss,
        Metric::IspHopLatency,
        Metric::IspHopPacketLoss,
        Metric::IspHop2Latency,
        Metric::IspHop2PacketLoss,
        Metric::SonicWallCpu,
        Metric::SonicWallSessions,
        Metric::WanInMbps,
        Metric::WanOutMbps,
        Metric::VpnActive,
        Metric::VpnLatency,
        Metric::VpnPacketLoss,
        Metric::CpuPercent,
        Metric::RamPercent,
        Metric::NicUpMbps,
        Metric::NicDownMbps,
        Metric::WifiSignalPercent,
        Metric::DownloadMbps,
        Metric::UploadMbps,
    ];

    /// Stable key used in the persistent log
    pub fn key(self) -> &'static str {
        match self {
            Metric::InternetLatency => "latency_ms",
            Metric::InternetJitter => "jitter_ms",
            Metric::PacketLoss => "packet_loss_pct",
            Metric::HttpLatency => "http_latency_ms",
            Metric::GoogleMeetLatency => "meet_latency_ms",
            Metric::MeetPacketLoss => "meet_packet_loss_pct",
            Metric::RouterLatency => "router_latency_ms",
            Metric::RouterPacketLoss => "router_packet_loss_pct",
            Metric::IspHopLatency => "isp_hop1_latency_ms",
            Metric::IspHopPacketLoss => "isp_hop1_loss_pct",
            Metric::IspHop2Latency => "isp_hop2_latency_ms",
            Metric::IspHop2PacketLoss => "isp_hop2_loss_pct",
            Metric::SonicWallCpu => "sonicwall_cpu_pct",
            Metric::SonicWallSessions => "sonicwall_sessions",
            Metric::WanInMbps => "wan_in_mbps",
            Metric::WanOutMbps => "wan_out_mbps",
            Metric::VpnActive => "vpn_active",
            Metric::VpnLatency => "vpn_latency_ms",
            Metric::VpnPacketLoss => "vpn_packet_loss_pct",
            Metric::CpuPercent => "cpu_pct",
            Metric::RamPercent => "mem_pct",
            Metric::NicUpMbps => "nic_up_mbps",
            Metric::NicDownMbps => "nic_down_mbps",
            Metric::WifiSignalPercent => "signal_strength",
            Metric::DownloadMbps => "download_mbps",
            Metric::UploadMbps => "upload_mbps",
        }
    }

    /// Human-readable label
    pub fn label(self) -> &'static str {
        match self {
            Metric::InternetLatency => "Internet latency",
            Metric::InternetJitter => "Internet jitter",
            Metric::PacketLoss => "Packet loss",
            Metric::HttpLatency => "HTTP latency",
            Metric::GoogleMeetLatency => "Google Meet latency",
            Metric::MeetPacketLoss => "Google Meet loss",
            Metric::RouterLatency => "Router latency",
            Metric::RouterPacketLoss => "Router packet loss",
            Metric::IspHopLatency => "ISP hop 1 latency",
            Metric::IspHopPacketLoss => "ISP hop 1 loss",
            Metric::IspHop2Latency => "ISP hop 2 latency",
            Metric::IspHop2PacketLoss => "ISP hop 2 loss",
            Metric::SonicWallCpu => "SonicWall CPU",
            Metric::SonicWallSessions => "SonicWall sessions",
            Metric::WanInMbps => "WAN in",
            Metric::WanOutMbps => "WAN out",
            Metric::VpnActive => "VPN active",
            Metric::VpnLatency => "VPN latency",
            Metric::VpnPacketLoss => "VPN packet loss",
            Metric::CpuPercent => "CPU",
            Metric::RamPercent => "Memory",
            Metric::NicUpMbps => "NIC up",
            Metric::NicDownMbps => "NIC down",
            Metric::WifiSignalPercent => "Wi-Fi signal",
            Metric::DownloadMbps => "Download",
            Metric::UploadMbps => "Upload",
        }
    }

    pub fn kind(self) -> ValueKind {
        match self {
            Metric::VpnActive => ValueKind::Boolean,
            Metric::PacketLoss
            | Metric::MeetPacketLoss
            | Metric::RouterPacketLoss
            | Metric::IspHopPacketLoss
            | Metric::IspHop2PacketLoss
            | Metric::VpnPacketLoss
            | Metric::SonicWallCpu
            | Metric::CpuPercent
            | Metric::RamPercent
            | Metric::WifiSignalPercent => ValueKind::Percentage,
            _ => ValueKind::Numeric,
        }
    }

    pub fn unit(self) -> Unit {
        match self {
            Metric::InternetLatency
            | Metric::InternetJitter
            | Metric::HttpLatency
            | Metric::GoogleMeetLatency
            | Metric::RouterLatency
            | Metric::IspHopLatency
            | Metric::IspHop2Latency
            | Metric::VpnLatency => Unit::Milliseconds,
            Metric::WanInMbps
            | Metric::WanOutMbps
            | Metric::NicUpMbps
            | Metric::NicDownMbps
            | Metric::DownloadMbps
            | Metric::UploadMbps => Unit::Mbps,
            Metric::SonicWallSessions => Unit::Count,
            Metric::VpnActive => Unit::None,
            _ => Unit::Percent,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// A single measured value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum MetricValue {
    Number(f64),
    Percent(f64),
    Flag(bool),
}

impl MetricValue {
    /// Build the value with the representation declared by the metric
    pub fn for_metric(metric: Metric, raw: f64) -> Self {
        match metric.kind() {
            ValueKind::Numeric => MetricValue::Number(raw),
            ValueKind::Percentage => MetricValue::Percent(raw.clamp(0.0, 100.0)),
            ValueKind::Boolean => MetricValue::Flag(raw != 0.0),
        }
    }

    /// Numeric view used for charting (flags map to 0/1)
    pub fn as_f64(&self) -> f64 {
        match *self {
            MetricValue::Number(v) | MetricValue::Percent(v) => v,
            MetricValue::Flag(b) => {
                if b {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Number(v) | MetricValue::Percent(v) => write!(f, "{}", round2(*v)),
            MetricValue::Flag(b) => write!(f, "{}", u8::from(*b)),
        }
    }
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Outcome of one attempt for one metric, produced by a single collector tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub metric: Metric,
    pub timestamp: DateTime<Utc>,
    /// Attempt counter of the collector that produced this reading
    pub attempt: u64,
    pub outcome: Result<MetricValue, ProbeError>,
}

impl Reading {
    pub fn success(metric: Metric, timestamp: DateTime<Utc>, attempt: u64, value: MetricValue) -> Self {
        Self {
            metric,
            timestamp,
            attempt,
            outcome: Ok(value),
        }
    }

    pub fn failure(metric: Metric, timestamp: DateTime<Utc>, attempt: u64, error: ProbeError) -> Self {
        Self {
            metric,
            timestamp,
            attempt,
            outcome: Err(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// What a snapshot knows about one metric
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MetricState {
    NeverObserved,
    NotApplicable,
    Fresh {
        value: MetricValue,
        observed_at: DateTime<Utc>,
    },
    /// Last known good value, kept after a failed attempt.
    /// `observed_at` is the time of the last success.
    Stale {
        value: MetricValue,
        observed_at: DateTime<Utc>,
        reason: String,
    },
}

impl MetricState {
    pub fn value(&self) -> Option<MetricValue> {
        match self {
            MetricState::Fresh { value, .. } | MetricState::Stale { value, .. } => Some(*value),
            _ => None,
        }
    }

    pub fn observed_at(&self) -> Option<DateTime<Utc>> {
        match self {
            MetricState::Fresh { observed_at, .. } | MetricState::Stale { observed_at, .. } => {
                Some(*observed_at)
            }
            _ => None,
        }
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, MetricState::Stale { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct Entry {
    #[serde(flatten)]
    pub(crate) state: MetricState,
    #[serde(skip)]
    pub(crate) attempt: u64,
}

static NEVER_OBSERVED: MetricState = MetricState::NeverObserved;

/// Immutable merged view of the latest known state per metric.
///
/// A new snapshot is built on every merge; consumers share them behind `Arc`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Snapshot {
    pub(crate) timestamp: Option<DateTime<Utc>>,
    pub(crate) entries: BTreeMap<Metric, Entry>,
}

impl Snapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Time of the merge that produced this snapshot
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }

    pub fn get(&self, metric: Metric) -> &MetricState {
        self.entries
            .get(&metric)
            .map(|entry| &entry.state)
            .unwrap_or(&NEVER_OBSERVED)
    }

    /// Value of the metric only if the latest attempt succeeded
    pub fn fresh_value(&self, metric: Metric) -> Option<f64> {
        match self.get(metric) {
            MetricState::Fresh { value, .. } => Some(value.as_f64()),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Metric, &MetricState)> {
        self.entries.iter().map(|(metric, entry)| (*metric, &entry.state))
    }

    pub(crate) fn last_attempt(&self, metric: Metric) -> Option<u64> {
        self.entries.get(&metric).map(|entry| entry.attempt)
    }
}

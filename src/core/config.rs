use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::core::monitor::backoff::BackoffPolicy;
use crate::core::monitor::health::HealthConfig;
use crate::core::monitor::probes::snmp::ber::Oid;
use crate::core::monitor::probes::{
    HopSelector, SnmpQuery, SpeedTestConfig, DEFAULT_VPN_KEYWORDS,
};
use crate::core::monitor::Metric;
use crate::error::NetpulseError;

/// Collector families that can be enabled and tuned independently
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectorKind {
    Internet,
    Http,
    Meet,
    Router,
    IspHop,
    Snmp,
    VpnStatus,
    VpnLatency,
    System,
    Wifi,
    SpeedTest,
}

impl CollectorKind {
    pub const ALL: [CollectorKind; 11] = [
        CollectorKind::Internet,
        CollectorKind::Http,
        CollectorKind::Meet,
        CollectorKind::Router,
        CollectorKind::IspHop,
        CollectorKind::Snmp,
        CollectorKind::VpnStatus,
        CollectorKind::VpnLatency,
        CollectorKind::System,
        CollectorKind::Wifi,
        CollectorKind::SpeedTest,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CollectorKind::Internet => "internet",
            CollectorKind::Http => "http",
            CollectorKind::Meet => "meet",
            CollectorKind::Router => "router",
            CollectorKind::IspHop => "isp_hop",
            CollectorKind::Snmp => "snmp",
            CollectorKind::VpnStatus => "vpn_status",
            CollectorKind::VpnLatency => "vpn_latency",
            CollectorKind::System => "system",
            CollectorKind::Wifi => "wifi",
            CollectorKind::SpeedTest => "speed_test",
        }
    }

    /// Default (interval, timeout)
    fn default_timing(self) -> (Duration, Duration) {
        let (interval_secs, timeout_ms) = match self {
            CollectorKind::Internet => (10, 8_000),
            CollectorKind::Http => (10, 5_000),
            CollectorKind::Meet => (30, 10_000),
            CollectorKind::Router => (10, 6_000),
            CollectorKind::IspHop => (60, 30_000),
            CollectorKind::Snmp => (10, 3_000),
            CollectorKind::VpnStatus => (5, 1_000),
            CollectorKind::VpnLatency => (10, 6_000),
            CollectorKind::System => (2, 2_000),
            CollectorKind::Wifi => (5, 3_000),
            CollectorKind::SpeedTest => (300, 60_000),
        };
        (
            Duration::from_secs(interval_secs),
            Duration::from_millis(timeout_ms),
        )
    }
}

/// Per-collector overrides; unset fields keep the built-in defaults
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectorOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// Effective settings of one collector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectorSettings {
    pub enabled: bool,
    pub interval: Duration,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Targets {
    /// Public host for the internet baseline
    pub public_ping_host: String,
    /// Router address; detected from the routing table when unset
    pub gateway: Option<String>,
    pub http_url: String,
    pub meet_url: String,
    /// Pinged for meeting packet loss
    pub meet_ping_host: String,
    /// Plain-text endpoint answering with the caller's address
    pub public_ip_url: String,
    /// Echo requests per ping measurement
    pub ping_count: u32,
}

impl Default for Targets {
    fn default() -> Self {
        Self {
            public_ping_host: "8.8.8.8".to_string(),
            gateway: None,
            http_url: "https://www.google.com/generate_204".to_string(),
            meet_url: "https://meet.google.com/".to_string(),
            meet_ping_host: "meet.google.com".to_string(),
            public_ip_url: "https://api.ipify.org".to_string(),
            ping_count: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnmpConfig {
    pub target: String,
    pub port: u16,
    pub community: String,
    pub queries: Vec<SnmpQuery>,
}

impl Default for SnmpConfig {
    fn default() -> Self {
        Self {
            target: "192.168.1.1".to_string(),
            port: 161,
            community: "public".to_string(),
            queries: vec![
                // SonicWall CPU and connection count
                SnmpQuery::gauge(Metric::SonicWallCpu, "1.3.6.1.4.1.8741.1.3.1.3.0"),
                SnmpQuery::gauge(Metric::SonicWallSessions, "1.3.6.1.4.1.8741.1.3.1.2.0"),
                // ifHCInOctets / ifHCOutOctets of the WAN interface
                SnmpQuery::counter(Metric::WanInMbps, "1.3.6.1.2.1.31.1.1.1.6.1"),
                SnmpQuery::counter(Metric::WanOutMbps, "1.3.6.1.2.1.31.1.1.1.10.1"),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TracerouteConfig {
    pub target: String,
    pub max_hops: u8,
    pub hop_wait_ms: u64,
    pub selector: HopSelector,
}

impl Default for TracerouteConfig {
    fn default() -> Self {
        Self {
            target: "8.8.8.8".to_string(),
            max_hops: 8,
            hop_wait_ms: 1_000,
            selector: HopSelector::FirstPublic,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VpnConfig {
    /// Interface name fragments that identify a VPN adapter
    pub keywords: Vec<String>,
    /// Host pinged through the tunnel; falls back to the gateway
    pub test_host: Option<String>,
}

impl Default for VpnConfig {
    fn default() -> Self {
        Self {
            keywords: DEFAULT_VPN_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            test_host: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Adapter used for NIC throughput; all physical adapters when unset
    pub interface: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub targets: Targets,
    /// Firewall polling; disabled when absent
    pub snmp: Option<SnmpConfig>,
    pub speed_test: SpeedTestConfig,
    pub traceroute: TracerouteConfig,
    pub vpn: VpnConfig,
    pub system: SystemConfig,
    pub health: HealthConfig,
    pub collectors: BTreeMap<CollectorKind, CollectorOverride>,
    pub max_retries: u32,
    pub backoff: BackoffPolicy,
    pub history_capacity: usize,
    /// Snapshot log file; defaults to the local data directory
    pub log_path: Option<PathBuf>,
    /// Minimum seconds between snapshot log lines (0 logs every snapshot)
    pub log_every_secs: u64,
    pub shutdown_grace_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            targets: Targets::default(),
            snmp: None,
            speed_test: SpeedTestConfig::default(),
            traceroute: TracerouteConfig::default(),
            vpn: VpnConfig::default(),
            system: SystemConfig::default(),
            health: HealthConfig::default(),
            collectors: BTreeMap::new(),
            max_retries: 3,
            backoff: BackoffPolicy::default(),
            history_capacity: crate::core::monitor::history::DEFAULT_HISTORY_SIZE,
            log_path: None,
            log_every_secs: 10,
            shutdown_grace_ms: 3_000,
        }
    }
}

impl Config {
    /// Load from the default location; a missing or empty file yields defaults
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        Self::load_from(&config_path)
    }

    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Config::default());
        }

        let data = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        if data.trim().is_empty() {
            return Ok(Config::default());
        }

        serde_json::from_str(&data)
            .with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;
        self.save_to(&config_path)
    }

    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let data = serde_json::to_string_pretty(self).with_context(|| "Failed to serialize config")?;

        fs::write(path, data).with_context(|| format!("Failed to write config file: {:?}", path))?;

        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir =
            dirs::config_dir().with_context(|| "Could not determine config directory")?;

        Ok(config_dir.join("netpulse").join("config.json"))
    }

    /// Snapshot log location, configured or `<data dir>/netpulse/netpulse.log`
    pub fn resolved_log_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.log_path {
            return Ok(path.clone());
        }
        let data_dir = dirs::data_local_dir()
            .or_else(dirs::home_dir)
            .with_context(|| "Could not determine data directory")?;
        Ok(data_dir.join("netpulse").join("netpulse.log"))
    }

    pub fn collector_settings(&self, kind: CollectorKind) -> CollectorSettings {
        let (interval, timeout) = kind.default_timing();
        let overrides = self.collectors.get(&kind).cloned().unwrap_or_default();

        CollectorSettings {
            enabled: overrides.enabled.unwrap_or(match kind {
                CollectorKind::Snmp => self.snmp.is_some(),
                _ => true,
            }),
            interval: overrides
                .interval_secs
                .map(Duration::from_secs)
                .unwrap_or(interval),
            timeout: overrides
                .timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(timeout),
        }
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn log_every(&self) -> Duration {
        Duration::from_secs(self.log_every_secs)
    }

    /// Configured gateway, or the detected default route
    pub fn gateway(&self) -> Option<IpAddr> {
        match &self.targets.gateway {
            Some(gw) => gw.trim().parse().ok(),
            None => crate::platform::detect_default_gateway().map(IpAddr::V4),
        }
    }

    /// Check everything that would otherwise fail at runtime
    pub fn validate(&self) -> crate::Result<()> {
        validate_host("targets.public_ping_host", &self.targets.public_ping_host)?;
        if let Some(gateway) = &self.targets.gateway {
            validate_ip("targets.gateway", gateway)?;
        }
        validate_url("targets.http_url", &self.targets.http_url)?;
        validate_url("targets.meet_url", &self.targets.meet_url)?;
        validate_host("targets.meet_ping_host", &self.targets.meet_ping_host)?;
        validate_url("targets.public_ip_url", &self.targets.public_ip_url)?;
        if self.targets.ping_count == 0 {
            return Err(NetpulseError::config("targets.ping_count must be at least 1"));
        }

        validate_url("speed_test.download_url", &self.speed_test.download_url)?;
        validate_url("speed_test.upload_url", &self.speed_test.upload_url)?;

        validate_host("traceroute.target", &self.traceroute.target)?;
        if self.traceroute.max_hops == 0 {
            return Err(NetpulseError::config("traceroute.max_hops must be at least 1"));
        }
        if let HopSelector::Index(0) = self.traceroute.selector {
            return Err(NetpulseError::config("traceroute.selector index is 1-based"));
        }

        if let Some(host) = &self.vpn.test_host {
            validate_host("vpn.test_host", host)?;
        }

        if let Some(snmp) = &self.snmp {
            validate_ip("snmp.target", &snmp.target)?;
            if snmp.community.is_empty() {
                return Err(NetpulseError::config("snmp.community must not be empty"));
            }
            if snmp.queries.is_empty() {
                return Err(NetpulseError::config("snmp.queries must not be empty"));
            }
            for query in &snmp.queries {
                query.oid.parse::<Oid>().map_err(|e| {
                    NetpulseError::config(format!("snmp query {}: {}", query.metric, e))
                })?;
            }
        }

        for (kind, overrides) in &self.collectors {
            if overrides.interval_secs == Some(0) {
                return Err(NetpulseError::config(format!(
                    "collectors.{}.interval_secs must be positive",
                    kind.name()
                )));
            }
            if overrides.timeout_ms == Some(0) {
                return Err(NetpulseError::config(format!(
                    "collectors.{}.timeout_ms must be positive",
                    kind.name()
                )));
            }
        }

        if self.history_capacity == 0 {
            return Err(NetpulseError::config("history_capacity must be positive"));
        }

        Ok(())
    }
}

fn validate_ip(field: &str, value: &str) -> crate::Result<IpAddr> {
    value
        .trim()
        .parse::<IpAddr>()
        .map_err(|_| NetpulseError::invalid_target(format!("{}: '{}' is not an IP address", field, value)))
}

fn validate_host(field: &str, value: &str) -> crate::Result<()> {
    let value = value.trim();
    if value.is_empty() {
        return Err(NetpulseError::invalid_target(format!("{} is empty", field)));
    }
    url::Host::parse(value)
        .map(|_| ())
        .map_err(|e| NetpulseError::invalid_target(format!("{}: '{}' ({})", field, value, e)))
}

fn validate_url(field: &str, value: &str) -> crate::Result<()> {
    let url = Url::parse(value)
        .map_err(|e| NetpulseError::invalid_target(format!("{}: '{}' ({})", field, value, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(NetpulseError::invalid_target(format!(
            "{}: unsupported scheme '{}'",
            field, other
        ))),
    }
}

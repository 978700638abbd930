//! Measurement techniques.
//!
//! Each probe performs one measurement per call and knows nothing about
//! scheduling; collectors drive them through the [`Probe`] trait.

mod combined;
mod counter;
mod http;
mod ping;
pub mod snmp;
mod speedtest;
mod system;
mod traceroute;
mod vpn;
mod wifi;

pub use combined::CombinedProbe;
pub use counter::{bytes_per_sec_to_mbps, counter_rate, CounterRate};
pub use http::HttpProbe;
pub use ping::{parse_ping_output, PingProbe, PingStats};
pub use snmp::{QueryMode, SnmpProbe, SnmpQuery};
pub use speedtest::{SpeedTestConfig, SpeedTestProbe};
pub use system::{InterfaceFilter, SystemStatsProbe};
pub use traceroute::{
    isp_route, parse_traceroute_output, select_hop, Hop, HopSelector, IspRoute, TracerouteProbe,
};
pub use vpn::{is_vpn_interface, VpnGatedProbe, VpnState, VpnStatusProbe, DEFAULT_VPN_KEYWORDS};
pub use wifi::WifiSignalProbe;

use std::time::Duration;

use async_trait::async_trait;

use super::error::{ProbeError, ProbeResult};
use super::metrics::{Metric, MetricValue};

/// Per-metric outcomes of one measurement.
///
/// A probe may omit a metric (e.g. a rate that needs a second sample); the
/// collector then emits nothing for it on this tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Measurement {
    outcomes: Vec<(Metric, ProbeResult<MetricValue>)>,
}

impl Measurement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(metric: Metric, value: MetricValue) -> Self {
        let mut measurement = Self::new();
        measurement.push(metric, Ok(value));
        measurement
    }

    pub fn push(&mut self, metric: Metric, outcome: ProbeResult<MetricValue>) {
        self.outcomes.push((metric, outcome));
    }

    /// Record a raw number using the representation declared by the metric
    pub fn push_value(&mut self, metric: Metric, raw: f64) {
        self.push(metric, Ok(MetricValue::for_metric(metric, raw)));
    }

    pub fn push_error(&mut self, metric: Metric, error: ProbeError) {
        self.push(metric, Err(error));
    }

    pub fn get(&self, metric: Metric) -> Option<&ProbeResult<MetricValue>> {
        self.outcomes
            .iter()
            .find(|(m, _)| *m == metric)
            .map(|(_, outcome)| outcome)
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn into_outcomes(self) -> Vec<(Metric, ProbeResult<MetricValue>)> {
        self.outcomes
    }
}

/// A single measurement technique.
///
/// Implementations must honour `timeout` on their own where they can; the
/// collector additionally races every call against a hard deadline.
#[async_trait]
pub trait Probe: Send {
    /// Short name used in diagnostics
    fn name(&self) -> &str;

    /// Metrics this probe produces
    fn metrics(&self) -> Vec<Metric>;

    /// Perform one measurement. An `Err` fails every metric of the probe.
    async fn measure(&mut self, timeout: Duration) -> ProbeResult<Measurement>;
}

/// Population standard deviation, used for jitter
pub(crate) fn std_dev(samples: &[f64]) -> f64 {
    if samples.len() < 2 {
        return 0.0;
    }
    let mean = samples.iter().sum::<f64>() / samples.len() as f64;
    let variance = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / samples.len() as f64;
    variance.sqrt()
}

//! Local machine load: CPU, memory and physical NIC throughput.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use sysinfo::{CpuRefreshKind, MemoryRefreshKind, Networks, RefreshKind, System};

use super::counter::{bytes_per_sec_to_mbps, CounterRate};
use super::{Measurement, Probe};
use crate::core::monitor::error::{ProbeError, ProbeResult};
use crate::core::monitor::metrics::{round2, Metric};
use crate::platform::{is_virtual_interface, name_matches};

/// Which adapters count towards NIC throughput
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterfaceFilter {
    /// Every adapter that is neither virtual nor a VPN tunnel. Tunnel traffic
    /// also crosses the physical uplink, so counting both would double it.
    Physical { tunnel_keywords: Vec<String> },
    /// Only the named adapter
    Named(String),
}

impl InterfaceFilter {
    fn accepts(&self, name: &str) -> bool {
        match self {
            InterfaceFilter::Physical { tunnel_keywords } => {
                !is_virtual_interface(name) && !name_matches(name, tunnel_keywords)
            }
            InterfaceFilter::Named(wanted) => name.eq_ignore_ascii_case(wanted),
        }
    }

    /// Sum the lifetime byte counters of every accepted adapter
    fn totals<'a, I>(&self, adapters: I) -> Option<AdapterTotals>
    where
        I: IntoIterator<Item = (&'a str, u64, u64)>,
    {
        let mut totals = AdapterTotals::default();
        for (name, rx, tx) in adapters {
            if !self.accepts(name) {
                continue;
            }
            totals.names.push(name.to_string());
            totals.rx = totals.rx.saturating_add(rx);
            totals.tx = totals.tx.saturating_add(tx);
        }
        if totals.names.is_empty() {
            return None;
        }
        totals.names.sort();
        Some(totals)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct AdapterTotals {
    names: Vec<String>,
    rx: u64,
    tx: u64,
}

/// Down/up rates over a set of adapters
#[derive(Debug, Default)]
struct NicThroughput {
    adapters: Vec<String>,
    rx: CounterRate,
    tx: CounterRate,
}

impl NicThroughput {
    /// Rates in bytes/s as (down, up).
    ///
    /// When the adapter set changes the totals are not comparable, so the
    /// sample only becomes the new baseline.
    fn observe(
        &mut self,
        totals: &AdapterTotals,
        now: Instant,
    ) -> (ProbeResult<Option<f64>>, ProbeResult<Option<f64>>) {
        if totals.names != self.adapters {
            if !self.adapters.is_empty() {
                log::debug!(
                    "NIC set changed from {:?} to {:?}, resetting baseline",
                    self.adapters,
                    totals.names
                );
            }
            self.adapters = totals.names.clone();
            self.reset();
        }
        (self.rx.observe(totals.rx, now), self.tx.observe(totals.tx, now))
    }

    fn reset(&mut self) {
        self.rx.reset();
        self.tx.reset();
    }
}

pub struct SystemStatsProbe {
    system: System,
    networks: Networks,
    filter: InterfaceFilter,
    throughput: NicThroughput,
    primed: bool,
}

impl SystemStatsProbe {
    /// `tunnel_keywords` name the VPN adapters left out of the physical totals
    pub fn new(interface: Option<String>, tunnel_keywords: Vec<String>) -> Self {
        let refresh_kind = RefreshKind::nothing()
            .with_cpu(CpuRefreshKind::nothing().with_cpu_usage())
            .with_memory(MemoryRefreshKind::nothing().with_ram());

        let filter = match interface {
            Some(name) if !name.trim().is_empty() => InterfaceFilter::Named(name),
            _ => InterfaceFilter::Physical { tunnel_keywords },
        };

        Self {
            system: System::new_with_specifics(refresh_kind),
            networks: Networks::new_with_refreshed_list(),
            filter,
            throughput: NicThroughput::default(),
            primed: false,
        }
    }

    fn totals(&self) -> Option<AdapterTotals> {
        self.filter.totals(
            self.networks
                .iter()
                .map(|(name, data)| (name.as_str(), data.total_received(), data.total_transmitted())),
        )
    }
}

fn push_rate(measurement: &mut Measurement, metric: Metric, outcome: ProbeResult<Option<f64>>) {
    match outcome {
        Ok(Some(rate)) => measurement.push_value(metric, round2(bytes_per_sec_to_mbps(rate))),
        Ok(None) => {}
        Err(e) => measurement.push_error(metric, e),
    }
}

#[async_trait]
impl Probe for SystemStatsProbe {
    fn name(&self) -> &str {
        "system"
    }

    fn metrics(&self) -> Vec<Metric> {
        vec![
            Metric::CpuPercent,
            Metric::RamPercent,
            Metric::NicUpMbps,
            Metric::NicDownMbps,
        ]
    }

    async fn measure(&mut self, _timeout: Duration) -> ProbeResult<Measurement> {
        if !self.primed {
            // CPU usage is a delta between two refreshes
            self.system.refresh_cpu_usage();
            tokio::time::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL).await;
            self.primed = true;
        }

        self.system.refresh_cpu_usage();
        self.system.refresh_memory();
        self.networks.refresh(true);
        let now = Instant::now();

        let mut measurement = Measurement::new();
        measurement.push_value(Metric::CpuPercent, round2(f64::from(self.system.global_cpu_usage())));

        let total_memory = self.system.total_memory();
        if total_memory == 0 {
            measurement.push_error(
                Metric::RamPercent,
                ProbeError::protocol("platform reported zero total memory"),
            );
        } else {
            let used = self.system.used_memory() as f64 / total_memory as f64 * 100.0;
            measurement.push_value(Metric::RamPercent, round2(used));
        }

        match self.totals() {
            Some(totals) => {
                let (down, up) = self.throughput.observe(&totals, now);
                push_rate(&mut measurement, Metric::NicDownMbps, down);
                push_rate(&mut measurement, Metric::NicUpMbps, up);
            }
            None => {
                // Adapter vanished; start over when it comes back
                self.throughput = NicThroughput::default();
                let reason = match &self.filter {
                    InterfaceFilter::Named(name) => format!("interface {} not found", name),
                    InterfaceFilter::Physical { .. } => "no physical network interface".to_string(),
                };
                measurement.push_error(Metric::NicDownMbps, ProbeError::unreachable(reason.clone()));
                measurement.push_error(Metric::NicUpMbps, ProbeError::unreachable(reason));
            }
        }

        Ok(measurement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::monitor::probes::DEFAULT_VPN_KEYWORDS;

    fn physical() -> InterfaceFilter {
        InterfaceFilter::Physical {
            tunnel_keywords: DEFAULT_VPN_KEYWORDS.iter().map(|k| k.to_string()).collect(),
        }
    }

    #[test]
    fn test_interface_filter() {
        let filter = physical();
        assert!(filter.accepts("eth0"));
        assert!(!filter.accepts("docker0"));
        assert!(!filter.accepts("tun0"));
        assert!(!filter.accepts("wg0"));
        assert!(!filter.accepts("SonicWall NetExtender"));

        let named = InterfaceFilter::Named("Ethernet".to_string());
        assert!(named.accepts("ethernet"));
        assert!(!named.accepts("Wi-Fi"));
    }

    #[test]
    fn test_tunnel_bytes_are_not_counted_twice() {
        let totals = physical()
            .totals([
                ("eth0", 5_000, 1_000),
                ("tun0", 4_000, 900),
                ("lo", 99_999, 99_999),
            ])
            .unwrap();

        assert_eq!(totals.names, vec!["eth0".to_string()]);
        assert_eq!((totals.rx, totals.tx), (5_000, 1_000));
        assert!(physical().totals([("tun0", 1, 1), ("lo", 1, 1)]).is_none());
    }

    #[test]
    fn test_adapter_set_change_resets_baseline() {
        let filter = physical();
        let mut nic = NicThroughput::default();
        let t0 = Instant::now();

        let first = filter.totals([("eth0", 1_000, 1_000)]).unwrap();
        assert!(matches!(nic.observe(&first, t0), (Ok(None), Ok(None))));

        let second = filter.totals([("eth0", 2_000, 1_500)]).unwrap();
        let (down, up) = nic.observe(&second, t0 + Duration::from_secs(1));
        assert_eq!(down.unwrap(), Some(1_000.0));
        assert_eq!(up.unwrap(), Some(500.0));

        // A new adapter shows up with large lifetime counters: no spike
        let grown = filter
            .totals([("eth0", 3_000, 2_000), ("wlan0", 900_000_000, 900_000_000)])
            .unwrap();
        assert!(matches!(
            nic.observe(&grown, t0 + Duration::from_secs(2)),
            (Ok(None), Ok(None))
        ));

        let next = filter
            .totals([("eth0", 4_000, 2_000), ("wlan0", 900_001_000, 900_000_000)])
            .unwrap();
        let (down, _) = nic.observe(&next, t0 + Duration::from_secs(3));
        assert_eq!(down.unwrap(), Some(2_000.0));
    }

    #[test]
    fn test_blank_interface_means_physical() {
        let probe = SystemStatsProbe::new(Some("  ".to_string()), vec!["vpn".to_string()]);
        assert_eq!(
            probe.filter,
            InterfaceFilter::Physical {
                tunnel_keywords: vec!["vpn".to_string()]
            }
        );
    }

    #[tokio::test]
    async fn test_reports_cpu_and_memory() {
        let mut probe = SystemStatsProbe::new(None, Vec::new());
        let measurement = probe.measure(Duration::from_secs(2)).await.unwrap();

        match measurement.get(Metric::CpuPercent) {
            Some(Ok(v)) => assert!((0.0..=100.0).contains(&v.as_f64())),
            other => panic!("unexpected cpu outcome {:?}", other),
        }
        assert!(matches!(measurement.get(Metric::RamPercent), Some(Ok(_))));
        // The first poll only sets the NIC baseline
        assert!(!matches!(measurement.get(Metric::NicUpMbps), Some(Ok(_))));
    }
}

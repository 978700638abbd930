//! Latency and loss of the first ISP-owned hops, found with a bounded traceroute.

use std::net::Ipv4Addr;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::process::Command;

use super::{Measurement, PingProbe, Probe};
use crate::core::monitor::error::{ProbeError, ProbeResult};
use crate::core::monitor::metrics::{round2, Metric};

static IPV4: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,3}(?:\.\d{1,3}){3})\b").expect("valid ipv4 regex"));
static HOP_MS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<?\s*(\d+(?:\.\d+)?)\s*ms").expect("valid latency regex"));

/// How the ISP hop is picked out of the trace
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "index", rename_all = "snake_case")]
pub enum HopSelector {
    /// Fixed 1-based hop number
    Index(usize),
    /// First responding hop outside private, loopback and link-local ranges
    #[default]
    FirstPublic,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Hop {
    pub index: usize,
    pub address: Option<Ipv4Addr>,
    pub latency_ms: Option<f64>,
}

impl Hop {
    fn responded(&self) -> bool {
        self.address.is_some() && self.latency_ms.is_some()
    }
}

/// Parse `traceroute -n` / `tracert -d` output into hops.
pub fn parse_traceroute_output(output: &str) -> Vec<Hop> {
    output
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            let first = line.split_whitespace().next()?;
            let index: usize = first.parse().ok()?;
            let rest = &line[first.len()..];

            let address = IPV4
                .captures(rest)
                .and_then(|caps| caps[1].parse::<Ipv4Addr>().ok());
            let samples: Vec<f64> = HOP_MS
                .captures_iter(rest)
                .filter_map(|caps| caps[1].parse::<f64>().ok())
                .collect();
            let latency_ms = if samples.is_empty() {
                None
            } else {
                Some(round2(samples.iter().sum::<f64>() / samples.len() as f64))
            };

            Some(Hop {
                index,
                address,
                latency_ms,
            })
        })
        .collect()
}

fn is_isp_candidate(addr: &Ipv4Addr) -> bool {
    !(addr.is_private()
        || addr.is_loopback()
        || addr.is_link_local()
        || addr.is_unspecified()
        || addr.is_broadcast())
}

/// Pick the qualifying hop, if it responded
pub fn select_hop(hops: &[Hop], selector: HopSelector) -> Option<&Hop> {
    match selector {
        HopSelector::Index(index) => hops.iter().find(|h| h.index == index && h.responded()),
        HopSelector::FirstPublic => hops.iter().find(|h| {
            h.responded() && h.address.as_ref().map(is_isp_candidate).unwrap_or(false)
        }),
    }
}

/// The two hops watched as the ISP edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IspRoute {
    pub first: Ipv4Addr,
    /// Next responding hop after `first`, when the trace reached one
    pub second: Option<Ipv4Addr>,
}

/// Selected hop plus the responding hop right after it
pub fn isp_route(hops: &[Hop], selector: HopSelector) -> Option<IspRoute> {
    let first = select_hop(hops, selector)?;
    let second = hops
        .iter()
        .filter(|h| h.index > first.index && h.responded())
        .find_map(|h| h.address);
    Some(IspRoute {
        first: first.address?,
        second,
    })
}

/// Latency and loss of the ISP hops.
///
/// The route is traced once and cached; both hops are then pinged on every
/// measurement. Losing every echo from the first hop drops the cache so the
/// next measurement traces again.
pub struct TracerouteProbe {
    target: String,
    max_hops: u8,
    hop_wait: Duration,
    selector: HopSelector,
    ping_count: u32,
    route: Option<IspRoute>,
}

impl TracerouteProbe {
    pub fn new<S: Into<String>>(
        target: S,
        max_hops: u8,
        hop_wait: Duration,
        selector: HopSelector,
    ) -> Self {
        Self {
            target: target.into(),
            max_hops: max_hops.max(1),
            hop_wait,
            selector,
            ping_count: 3,
            route: None,
        }
    }

    pub fn with_ping_count(mut self, count: u32) -> Self {
        self.ping_count = count.max(1);
        self
    }

    pub fn route(&self) -> Option<IspRoute> {
        self.route
    }

    fn command(&self) -> Command {
        #[cfg(windows)]
        let mut cmd = {
            let mut cmd = Command::new("tracert");
            cmd.args([
                "-d".to_string(),
                "-h".to_string(),
                self.max_hops.to_string(),
                "-w".to_string(),
                self.hop_wait.as_millis().to_string(),
                self.target.clone(),
            ]);
            cmd
        };

        #[cfg(not(windows))]
        let mut cmd = {
            let mut cmd = Command::new("traceroute");
            cmd.args([
                "-n".to_string(),
                "-q".to_string(),
                "1".to_string(),
                "-m".to_string(),
                self.max_hops.to_string(),
                "-w".to_string(),
                self.hop_wait.as_secs().max(1).to_string(),
                self.target.clone(),
            ]);
            cmd
        };

        cmd.kill_on_drop(true);
        cmd
    }

    async fn discover(&self) -> ProbeResult<IspRoute> {
        let tool = if cfg!(windows) { "tracert" } else { "traceroute" };
        let output = self
            .command()
            .output()
            .await
            .map_err(|e| ProbeError::from_command(tool, e))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let hops = parse_traceroute_output(&stdout);
        log::trace!("traceroute to {} returned {} hops", self.target, hops.len());

        let route = isp_route(&hops, self.selector).ok_or_else(|| {
            ProbeError::unreachable(format!(
                "no qualifying hop within {} hops of {}",
                self.max_hops, self.target
            ))
        })?;
        log::debug!(
            "ISP hops towards {}: {} / {}",
            self.target,
            route.first,
            route
                .second
                .map(|ip| ip.to_string())
                .unwrap_or_else(|| "-".to_string())
        );
        Ok(route)
    }

    async fn ping_hop(
        &self,
        hop: Ipv4Addr,
        latency: Metric,
        loss: Metric,
        timeout: Duration,
        measurement: &mut Measurement,
    ) {
        let mut ping = PingProbe::new(hop.to_string(), latency, loss)
            .with_count(self.ping_count, self.hop_wait);
        match ping.measure(timeout).await {
            Ok(partial) => {
                for (metric, outcome) in partial.into_outcomes() {
                    measurement.push(metric, outcome);
                }
            }
            Err(err) => {
                measurement.push_error(latency, err.clone());
                measurement.push_error(loss, err);
            }
        }
    }
}

/// True when the first hop answered none of its echoes
fn first_hop_lost(measurement: &Measurement) -> bool {
    match measurement.get(Metric::IspHopPacketLoss) {
        Some(Ok(value)) => value.as_f64() >= 100.0,
        Some(Err(_)) => true,
        None => false,
    }
}

#[async_trait]
impl Probe for TracerouteProbe {
    fn name(&self) -> &str {
        "traceroute"
    }

    fn metrics(&self) -> Vec<Metric> {
        vec![
            Metric::IspHopLatency,
            Metric::IspHopPacketLoss,
            Metric::IspHop2Latency,
            Metric::IspHop2PacketLoss,
        ]
    }

    async fn measure(&mut self, timeout: Duration) -> ProbeResult<Measurement> {
        let route = match self.route {
            Some(route) => route,
            None => {
                let route = self.discover().await?;
                self.route = Some(route);
                route
            }
        };

        let mut measurement = Measurement::new();
        self.ping_hop(
            route.first,
            Metric::IspHopLatency,
            Metric::IspHopPacketLoss,
            timeout,
            &mut measurement,
        )
        .await;
        match route.second {
            Some(second) => {
                self.ping_hop(
                    second,
                    Metric::IspHop2Latency,
                    Metric::IspHop2PacketLoss,
                    timeout,
                    &mut measurement,
                )
                .await
            }
            None => {
                measurement.push_error(Metric::IspHop2Latency, ProbeError::NotApplicable);
                measurement.push_error(Metric::IspHop2PacketLoss, ProbeError::NotApplicable);
            }
        }

        if first_hop_lost(&measurement) {
            log::debug!("ISP hop {} stopped answering; tracing again next time", route.first);
            self.route = None;
        }
        Ok(measurement)
    }
}

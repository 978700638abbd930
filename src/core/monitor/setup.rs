//! Builds the collector set described by a [`Config`].

use std::net::{IpAddr, SocketAddr};

use super::backoff::BackoffPolicy;
use super::collector::{Collector, CollectorSpec};
use super::metrics::Metric;
use super::probes::{
    CombinedProbe, HttpProbe, PingProbe, Probe, SnmpProbe, SpeedTestProbe, SystemStatsProbe,
    TracerouteProbe, VpnGatedProbe, VpnState, VpnStatusProbe, WifiSignalProbe,
};
use crate::core::config::{CollectorKind, CollectorSettings, Config};
use crate::error::{NetpulseError, Result};

fn collector(
    kind: CollectorKind,
    settings: CollectorSettings,
    max_retries: u32,
    backoff: BackoffPolicy,
    probe: Box<dyn Probe>,
) -> Collector {
    let spec = CollectorSpec::new(kind.name(), probe.metrics(), settings.interval, settings.timeout)
        .with_retries(max_retries, backoff);
    let spec = if kind == CollectorKind::SpeedTest {
        spec.dedicated()
    } else {
        spec
    };
    Collector::new(spec, probe)
}

fn ping(host: String, latency: Metric, loss: Metric, config: &Config) -> PingProbe {
    PingProbe::new(host, latency, loss).with_count(config.targets.ping_count, std::time::Duration::from_secs(1))
}

/// Create every enabled collector, detecting the gateway when needed.
pub fn create_collectors(config: &Config) -> Result<Vec<Collector>> {
    let needs_gateway = config.collector_settings(CollectorKind::Router).enabled
        || (config.collector_settings(CollectorKind::VpnLatency).enabled
            && config.vpn.test_host.is_none());
    let gateway = if needs_gateway { config.gateway() } else { None };
    create_collectors_with_gateway(config, gateway)
}

/// Same as [`create_collectors`] with an explicit gateway
pub fn create_collectors_with_gateway(
    config: &Config,
    gateway: Option<IpAddr>,
) -> Result<Vec<Collector>> {
    config.validate()?;

    let vpn_state = VpnState::new();
    let mut collectors = Vec::new();

    for kind in CollectorKind::ALL {
        let settings = config.collector_settings(kind);
        if !settings.enabled {
            log::debug!("Collector {} disabled", kind.name());
            continue;
        }

        let probe: Box<dyn Probe> = match kind {
            CollectorKind::Internet => Box::new(
                ping(
                    config.targets.public_ping_host.clone(),
                    Metric::InternetLatency,
                    Metric::PacketLoss,
                    config,
                )
                .with_jitter(Metric::InternetJitter),
            ),
            CollectorKind::Http => Box::new(HttpProbe::new(
                config.targets.http_url.clone(),
                Metric::HttpLatency,
            )?),
            CollectorKind::Meet => Box::new(CombinedProbe::new(
                "meet",
                vec![
                    Box::new(HttpProbe::new(
                        config.targets.meet_url.clone(),
                        Metric::GoogleMeetLatency,
                    )?),
                    Box::new(
                        PingProbe::loss_only(
                            config.targets.meet_ping_host.clone(),
                            Metric::MeetPacketLoss,
                        )
                        .with_count(config.targets.ping_count, std::time::Duration::from_secs(2)),
                    ),
                ],
            )),
            CollectorKind::Router => {
                let Some(gateway) = gateway else {
                    log::warn!("No gateway configured or detected; router collector disabled");
                    continue;
                };
                Box::new(ping(
                    gateway.to_string(),
                    Metric::RouterLatency,
                    Metric::RouterPacketLoss,
                    config,
                ))
            }
            CollectorKind::IspHop => Box::new(TracerouteProbe::new(
                config.traceroute.target.clone(),
                config.traceroute.max_hops,
                std::time::Duration::from_millis(config.traceroute.hop_wait_ms),
                config.traceroute.selector,
            )
            .with_ping_count(3)),
            CollectorKind::Snmp => {
                let snmp = config.snmp.as_ref().ok_or_else(|| {
                    NetpulseError::config("snmp collector enabled without an snmp section")
                })?;
                let ip: IpAddr = snmp.target.trim().parse().map_err(|_| {
                    NetpulseError::invalid_target(format!("snmp.target '{}'", snmp.target))
                })?;
                Box::new(SnmpProbe::new(
                    SocketAddr::new(ip, snmp.port),
                    snmp.community.clone(),
                    &snmp.queries,
                )?)
            }
            CollectorKind::VpnStatus => Box::new(VpnStatusProbe::new(
                config.vpn.keywords.clone(),
                vpn_state.clone(),
            )),
            CollectorKind::VpnLatency => {
                let host = config
                    .vpn
                    .test_host
                    .clone()
                    .or_else(|| gateway.map(|gw| gw.to_string()));
                let Some(host) = host else {
                    log::warn!("No VPN test host or gateway; VPN latency collector disabled");
                    continue;
                };
                if !config.collector_settings(CollectorKind::VpnStatus).enabled {
                    log::warn!("VPN latency depends on the vpn_status collector, which is disabled");
                }
                Box::new(VpnGatedProbe::new(
                    Box::new(ping(host, Metric::VpnLatency, Metric::VpnPacketLoss, config)),
                    vpn_state.clone(),
                ))
            }
            CollectorKind::System => {
                Box::new(SystemStatsProbe::new(
                    config.system.interface.clone(),
                    config.vpn.keywords.clone(),
                ))
            }
            CollectorKind::Wifi => Box::new(WifiSignalProbe::new()),
            CollectorKind::SpeedTest => Box::new(SpeedTestProbe::new(config.speed_test.clone())?),
        };

        collectors.push(collector(kind, settings, config.max_retries, config.backoff, probe));
    }

    log::info!(
        "Configured collectors: {}",
        collectors
            .iter()
            .map(|c| c.name())
            .collect::<Vec<_>>()
            .join(", ")
    );
    Ok(collectors)
}

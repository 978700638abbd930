//! Descriptive facts about the active connection.
//!
//! Unlike metrics these are not sampled on a schedule: they are gathered once
//! per `once` pass and at the start of `run`, then shown next to the snapshot.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use sysinfo::Networks;

use super::config::Config;
use super::monitor::{ProbeError, ProbeResult};
use crate::platform::{dns_servers, is_virtual_interface, name_matches};

const PUBLIC_IP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInfo {
    /// Adapter carrying the default route
    pub interface: Option<String>,
    pub local_ip: Option<IpAddr>,
    pub gateway: Option<IpAddr>,
    pub dns_servers: Vec<IpAddr>,
    /// Address seen from the internet; `None` when the lookup failed
    pub public_ip: Option<IpAddr>,
}

/// An adapter with its IPv4 networks as (address, prefix length)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Adapter {
    pub name: String,
    pub networks: Vec<(Ipv4Addr, u8)>,
}

fn contains(network: Ipv4Addr, prefix: u8, ip: Ipv4Addr) -> bool {
    if prefix == 0 {
        return true;
    }
    let mask = u32::MAX.checked_shl(32 - u32::from(prefix.min(32))).unwrap_or(0);
    u32::from(network) & mask == u32::from(ip) & mask
}

fn usable(addr: &Ipv4Addr) -> bool {
    !(addr.is_loopback() || addr.is_link_local() || addr.is_unspecified())
}

/// Pick the uplink adapter and its address.
///
/// Virtual and tunnel adapters are skipped. The adapter whose subnet holds
/// the gateway wins; without a match the first adapter with a usable IPv4
/// address is taken.
pub fn active_adapter(
    adapters: &[Adapter],
    gateway: Option<Ipv4Addr>,
    tunnel_keywords: &[String],
) -> Option<(String, Ipv4Addr)> {
    let candidates: Vec<(&str, Ipv4Addr, u8)> = adapters
        .iter()
        .filter(|a| !is_virtual_interface(&a.name) && !name_matches(&a.name, tunnel_keywords))
        .flat_map(|a| {
            a.networks
                .iter()
                .filter(|(addr, _)| usable(addr))
                .map(move |&(addr, prefix)| (a.name.as_str(), addr, prefix))
        })
        .collect();

    let on_gateway = gateway.and_then(|gw| {
        candidates
            .iter()
            .find(|(_, addr, prefix)| contains(*addr, *prefix, gw))
    });
    on_gateway
        .or_else(|| candidates.first())
        .map(|(name, addr, _)| (name.to_string(), *addr))
}

fn list_adapters() -> Vec<Adapter> {
    let networks = Networks::new_with_refreshed_list();
    let mut adapters: Vec<Adapter> = networks
        .iter()
        .map(|(name, data)| Adapter {
            name: name.clone(),
            networks: data
                .ip_networks()
                .iter()
                .filter_map(|net| match net.addr {
                    IpAddr::V4(v4) => Some((v4, net.prefix)),
                    IpAddr::V6(_) => None,
                })
                .collect(),
        })
        .collect();
    // HashMap order is arbitrary
    adapters.sort_by(|a, b| a.name.cmp(&b.name));
    adapters
}

/// Ask a plain-text echo service for our public address
pub async fn public_ip(client: &Client, url: &str) -> ProbeResult<IpAddr> {
    let body = client
        .get(url)
        .timeout(PUBLIC_IP_TIMEOUT)
        .send()
        .await
        .and_then(|response| response.error_for_status())
        .map_err(|e| {
            if e.is_timeout() {
                ProbeError::Timeout
            } else {
                ProbeError::unreachable(e.to_string())
            }
        })?
        .text()
        .await
        .map_err(|e| ProbeError::protocol(e.to_string()))?;

    body.trim()
        .parse()
        .map_err(|_| ProbeError::protocol(format!("'{}' is not an IP address", body.trim())))
}

/// Collect everything; missing pieces stay empty.
pub async fn gather(config: &Config) -> NetworkInfo {
    let gateway = config.gateway();
    let gateway_v4 = match gateway {
        Some(IpAddr::V4(v4)) => Some(v4),
        _ => None,
    };
    let active = active_adapter(&list_adapters(), gateway_v4, &config.vpn.keywords);

    let public_ip = match Client::builder()
        .user_agent(concat!("netpulse/", env!("CARGO_PKG_VERSION")))
        .build()
    {
        Ok(client) => match public_ip(&client, &config.targets.public_ip_url).await {
            Ok(ip) => Some(ip),
            Err(e) => {
                log::debug!("Public IP lookup failed: {}", e);
                None
            }
        },
        Err(e) => {
            log::debug!("HTTP client unavailable: {}", e);
            None
        }
    };

    let (interface, local_ip) = match active {
        Some((name, ip)) => (Some(name), Some(IpAddr::V4(ip))),
        None => (None, None),
    };
    NetworkInfo {
        interface,
        local_ip,
        gateway,
        dns_servers: dns_servers(),
        public_ip,
    }
}

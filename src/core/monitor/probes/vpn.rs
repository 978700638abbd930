//! VPN detection and VPN-gated probes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sysinfo::Networks;

use super::{Measurement, Probe};
use crate::core::monitor::error::{ProbeError, ProbeResult};
use crate::core::monitor::metrics::{Metric, MetricValue};
use crate::platform::name_matches;

pub const DEFAULT_VPN_KEYWORDS: &[&str] = &["sonicwall", "vpn", "wan miniport", "ppp", "tun", "wg"];

/// Whether an interface with `name` looks like a VPN tunnel
pub fn is_vpn_interface(name: &str, keywords: &[String]) -> bool {
    name_matches(name, keywords)
}

/// Last VPN status seen, shared between the status probe and gated probes
#[derive(Debug, Clone, Default)]
pub struct VpnState(Arc<AtomicBool>);

impl VpnState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn set(&self, active: bool) {
        self.0.store(active, Ordering::Release);
    }
}

/// Reports whether any VPN-like interface is up. Never fails.
pub struct VpnStatusProbe {
    networks: Networks,
    keywords: Vec<String>,
    state: VpnState,
}

impl VpnStatusProbe {
    pub fn new(keywords: Vec<String>, state: VpnState) -> Self {
        Self {
            networks: Networks::new_with_refreshed_list(),
            keywords,
            state,
        }
    }
}

#[async_trait]
impl Probe for VpnStatusProbe {
    fn name(&self) -> &str {
        "vpn status"
    }

    fn metrics(&self) -> Vec<Metric> {
        vec![Metric::VpnActive]
    }

    async fn measure(&mut self, _timeout: Duration) -> ProbeResult<Measurement> {
        self.networks.refresh(true);
        // An adapter without addresses is treated as down
        let active = self.networks.iter().any(|(name, data)| {
            is_vpn_interface(name, &self.keywords) && !data.ip_networks().is_empty()
        });

        if active != self.state.is_active() {
            log::info!("VPN {}", if active { "connected" } else { "disconnected" });
        }
        self.state.set(active);

        Ok(Measurement::single(Metric::VpnActive, MetricValue::Flag(active)))
    }
}

/// Runs the inner probe only while the VPN is up; otherwise every metric
/// is not applicable.
pub struct VpnGatedProbe {
    inner: Box<dyn Probe>,
    state: VpnState,
}

impl VpnGatedProbe {
    pub fn new(inner: Box<dyn Probe>, state: VpnState) -> Self {
        Self { inner, state }
    }
}

#[async_trait]
impl Probe for VpnGatedProbe {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn metrics(&self) -> Vec<Metric> {
        self.inner.metrics()
    }

    async fn measure(&mut self, timeout: Duration) -> ProbeResult<Measurement> {
        if !self.state.is_active() {
            return Err(ProbeError::NotApplicable);
        }
        self.inner.measure(timeout).await
    }
}

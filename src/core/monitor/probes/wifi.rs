use std::time::Duration;

use async_trait::async_trait;

use super::{Measurement, Probe};
use crate::core::monitor::error::{ProbeError, ProbeResult};
use crate::core::monitor::metrics::Metric;
use crate::platform::wifi_signal_percent;

/// Wi-Fi link quality; not applicable on wired-only machines.
#[derive(Debug, Default)]
pub struct WifiSignalProbe;

impl WifiSignalProbe {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Probe for WifiSignalProbe {
    fn name(&self) -> &str {
        "wifi"
    }

    fn metrics(&self) -> Vec<Metric> {
        vec![Metric::WifiSignalPercent]
    }

    async fn measure(&mut self, _timeout: Duration) -> ProbeResult<Measurement> {
        let signal = wifi_signal_percent()
            .await
            .map_err(|e| ProbeError::from_command("wifi query", e))?
            .ok_or(ProbeError::NotApplicable)?;

        let mut measurement = Measurement::new();
        measurement.push_value(Metric::WifiSignalPercent, signal);
        Ok(measurement)
    }
}

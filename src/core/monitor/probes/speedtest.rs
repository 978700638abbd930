//! Bandwidth test: a timed download followed by a timed upload.
//!
//! Moves real traffic (tens of megabytes), so its collector runs rarely
//! and on its own runtime.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::http::classify;
use super::{Measurement, Probe};
use crate::core::monitor::error::{ProbeError, ProbeResult};
use crate::core::monitor::metrics::{round2, Metric, MetricValue};
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedTestConfig {
    pub download_url: String,
    pub upload_url: String,
    pub upload_bytes: usize,
}

impl Default for SpeedTestConfig {
    fn default() -> Self {
        Self {
            download_url: "https://speed.cloudflare.com/__down?bytes=25000000".to_string(),
            upload_url: "https://speed.cloudflare.com/__up".to_string(),
            upload_bytes: 10_000_000,
        }
    }
}

fn mbps(bytes: u64, elapsed: Duration) -> ProbeResult<f64> {
    let secs = elapsed.as_secs_f64();
    if bytes == 0 || secs <= 0.0 {
        return Err(ProbeError::protocol("no data transferred"));
    }
    Ok(round2(bytes as f64 * 8.0 / secs / 1_000_000.0))
}

pub struct SpeedTestProbe {
    client: Client,
    config: SpeedTestConfig,
}

impl SpeedTestProbe {
    pub fn new(config: SpeedTestConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("netpulse/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, config })
    }

    #[cfg(test)]
    fn direct(config: SpeedTestConfig) -> Result<Self> {
        let client = Client::builder().no_proxy().build()?;
        Ok(Self { client, config })
    }

    async fn download(&self, timeout: Duration) -> ProbeResult<f64> {
        let start = Instant::now();
        let mut response = self
            .client
            .get(&self.config.download_url)
            .timeout(timeout)
            .send()
            .await
            .map_err(classify)?;

        if !response.status().is_success() {
            return Err(ProbeError::protocol(format!(
                "download returned {}",
                response.status()
            )));
        }

        let mut received: u64 = 0;
        while let Some(chunk) = response.chunk().await.map_err(classify)? {
            received += chunk.len() as u64;
        }
        let elapsed = start.elapsed();
        log::debug!("speed test downloaded {} bytes in {:?}", received, elapsed);
        mbps(received, elapsed)
    }

    async fn upload(&self, timeout: Duration) -> ProbeResult<f64> {
        let payload = vec![0u8; self.config.upload_bytes];
        let sent = payload.len() as u64;

        let start = Instant::now();
        let response = self
            .client
            .post(&self.config.upload_url)
            .timeout(timeout)
            .body(payload)
            .send()
            .await
            .map_err(classify)?;
        let elapsed = start.elapsed();

        if !response.status().is_success() {
            return Err(ProbeError::protocol(format!(
                "upload returned {}",
                response.status()
            )));
        }
        log::debug!("speed test uploaded {} bytes in {:?}", sent, elapsed);
        mbps(sent, elapsed)
    }
}

#[async_trait]
impl Probe for SpeedTestProbe {
    fn name(&self) -> &str {
        "speed test"
    }

    fn metrics(&self) -> Vec<Metric> {
        vec![Metric::DownloadMbps, Metric::UploadMbps]
    }

    async fn measure(&mut self, timeout: Duration) -> ProbeResult<Measurement> {
        let started = Instant::now();
        let mut measurement = Measurement::new();

        let download = self.download(timeout).await;
        measurement.push(
            Metric::DownloadMbps,
            download.map(|v| MetricValue::for_metric(Metric::DownloadMbps, v)),
        );

        let remaining = timeout.saturating_sub(started.elapsed());
        if remaining.is_zero() {
            measurement.push_error(Metric::UploadMbps, ProbeError::Timeout);
        } else {
            let upload = self.upload(remaining).await;
            measurement.push(
                Metric::UploadMbps,
                upload.map(|v| MetricValue::for_metric(Metric::UploadMbps, v)),
            );
        }

        Ok(measurement)
    }
}

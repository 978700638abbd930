use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{redirect, Client};

use super::{Measurement, Probe};
use crate::core::monitor::error::{ProbeError, ProbeResult};
use crate::core::monitor::metrics::{round2, Metric};
use crate::error::Result;

/// Time to first byte of a lightweight GET.
pub struct HttpProbe {
    name: String,
    client: Client,
    url: String,
    metric: Metric,
}

impl HttpProbe {
    pub fn new<S: Into<String>>(url: S, metric: Metric) -> Result<Self> {
        Self::with_builder(url.into(), metric, Client::builder())
    }

    /// Same as [`HttpProbe::new`] but bypassing any system proxy
    pub fn direct<S: Into<String>>(url: S, metric: Metric) -> Result<Self> {
        Self::with_builder(url.into(), metric, Client::builder().no_proxy())
    }

    fn with_builder(url: String, metric: Metric, builder: reqwest::ClientBuilder) -> Result<Self> {
        let client = builder
            .redirect(redirect::Policy::limited(5))
            .user_agent(concat!("netpulse/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            name: format!("http {}", url),
            client,
            url,
            metric,
        })
    }
}

pub(crate) fn classify(err: reqwest::Error) -> ProbeError {
    if err.is_timeout() {
        ProbeError::Timeout
    } else if err.is_connect() {
        ProbeError::unreachable(err.to_string())
    } else {
        ProbeError::protocol(err.to_string())
    }
}

#[async_trait]
impl Probe for HttpProbe {
    fn name(&self) -> &str {
        &self.name
    }

    fn metrics(&self) -> Vec<Metric> {
        vec![self.metric]
    }

    async fn measure(&mut self, timeout: Duration) -> ProbeResult<Measurement> {
        let start = Instant::now();
        // send() resolves once the response head arrives
        let response = self
            .client
            .get(&self.url)
            .timeout(timeout)
            .send()
            .await
            .map_err(classify)?;
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::protocol(format!(
                "unexpected status {} from {}",
                status, self.url
            )));
        }

        let mut measurement = Measurement::new();
        measurement.push_value(self.metric, round2(elapsed_ms));
        Ok(measurement)
    }
}

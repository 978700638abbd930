use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;

use super::{Measurement, Probe};
use crate::core::monitor::error::ProbeResult;
use crate::core::monitor::metrics::Metric;

/// Several probes measured concurrently as one.
///
/// A failing part only fails its own metrics; the others still report.
pub struct CombinedProbe {
    name: String,
    parts: Vec<Box<dyn Probe>>,
}

impl CombinedProbe {
    pub fn new<S: Into<String>>(name: S, parts: Vec<Box<dyn Probe>>) -> Self {
        Self {
            name: name.into(),
            parts,
        }
    }
}

#[async_trait]
impl Probe for CombinedProbe {
    fn name(&self) -> &str {
        &self.name
    }

    fn metrics(&self) -> Vec<Metric> {
        self.parts.iter().flat_map(|part| part.metrics()).collect()
    }

    async fn measure(&mut self, timeout: Duration) -> ProbeResult<Measurement> {
        let results = join_all(self.parts.iter_mut().map(|part| part.measure(timeout))).await;

        let mut measurement = Measurement::new();
        for (part, result) in self.parts.iter().zip(results) {
            match result {
                Ok(partial) => {
                    for (metric, outcome) in partial.into_outcomes() {
                        measurement.push(metric, outcome);
                    }
                }
                Err(err) => {
                    log::trace!("{}: part {} failed: {}", self.name, part.name(), err);
                    for metric in part.metrics() {
                        measurement.push_error(metric, err.clone());
                    }
                }
            }
        }
        Ok(measurement)
    }
}

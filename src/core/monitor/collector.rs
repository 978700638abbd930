//! Scheduling wrapper around a probe.
//!
//! A collector owns one probe, runs it on its own timer, converts every probe
//! failure into failure readings and applies backoff after failed attempts.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc};
use tokio::time::sleep;

use super::backoff::{Backoff, BackoffPolicy};
use super::error::{ProbeError, ProbeResult};
use super::history::HistoryStore;
use super::metrics::{Metric, MetricValue, Reading};
use super::probes::Probe;

/// Immutable scheduling configuration of a collector
#[derive(Debug, Clone)]
pub struct CollectorSpec {
    pub name: String,
    pub metrics: Vec<Metric>,
    pub interval: Duration,
    pub timeout: Duration,
    /// Consecutive failures retried on the backoff schedule before falling
    /// back to the base interval
    pub max_retries: u32,
    pub backoff: BackoffPolicy,
    /// Run on the dedicated worker reserved for heavy probes
    pub dedicated: bool,
}

impl CollectorSpec {
    pub fn new<S: Into<String>>(
        name: S,
        metrics: Vec<Metric>,
        interval: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            metrics,
            interval,
            timeout,
            max_retries: 3,
            backoff: BackoffPolicy::default(),
            dedicated: false,
        }
    }

    pub fn with_retries(mut self, max_retries: u32, backoff: BackoffPolicy) -> Self {
        self.max_retries = max_retries;
        self.backoff = backoff;
        self
    }

    pub fn dedicated(mut self) -> Self {
        self.dedicated = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorState {
    Idle,
    Running,
    Succeeded,
    Failed,
    Stopped,
}

pub struct Collector {
    spec: CollectorSpec,
    probe: Box<dyn Probe>,
    state: CollectorState,
    attempt: u64,
    consecutive_failures: u32,
    backoff: Backoff,
    next_delay: Duration,
    history: Option<Arc<HistoryStore>>,
}

impl Collector {
    pub fn new(spec: CollectorSpec, probe: Box<dyn Probe>) -> Self {
        let backoff = Backoff::new(spec.backoff);
        let next_delay = spec.interval;
        Self {
            spec,
            probe,
            state: CollectorState::Idle,
            attempt: 0,
            consecutive_failures: 0,
            backoff,
            next_delay,
            history: None,
        }
    }

    /// Record successful values into `history` as they are measured
    pub fn with_history(mut self, history: Arc<HistoryStore>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn spec(&self) -> &CollectorSpec {
        &self.spec
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn state(&self) -> CollectorState {
        self.state
    }

    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Delay before the next attempt may fire
    pub fn next_delay(&self) -> Duration {
        self.next_delay
    }

    /// Run one attempt of the probe, bounded by the collector timeout.
    pub async fn tick(&mut self) -> Vec<Reading> {
        self.attempt += 1;
        let attempt = self.attempt;
        self.state = CollectorState::Running;

        let outcomes: Vec<(Metric, ProbeResult<MetricValue>)> = match tokio::time::timeout(
            self.spec.timeout,
            self.probe.measure(self.spec.timeout),
        )
        .await
        {
            Ok(Ok(measurement)) => measurement.into_outcomes(),
            Ok(Err(error)) => self.fail_all(error),
            Err(_) => self.fail_all(ProbeError::Timeout),
        };

        let timestamp = Utc::now();
        let failed = outcomes
            .iter()
            .any(|(_, outcome)| matches!(outcome, Err(e) if e.is_failure()));

        let readings: Vec<Reading> = outcomes
            .into_iter()
            .map(|(metric, outcome)| {
                if let (Some(history), Ok(value)) = (&self.history, &outcome) {
                    history.record(metric, timestamp, value.as_f64());
                }
                Reading {
                    metric,
                    timestamp,
                    attempt,
                    outcome,
                }
            })
            .collect();

        if failed {
            self.consecutive_failures += 1;
            self.state = CollectorState::Failed;
            self.next_delay = if self.consecutive_failures <= self.spec.max_retries {
                self.backoff.mark_failure()
            } else {
                if self.consecutive_failures == self.spec.max_retries + 1 {
                    log::warn!(
                        "Collector {} failed {} times in a row, retrying at base interval",
                        self.spec.name,
                        self.consecutive_failures
                    );
                }
                self.spec.interval
            };
            log::debug!(
                "Collector {} attempt {} failed, next in {:?}",
                self.spec.name,
                attempt,
                self.next_delay
            );
        } else {
            if self.consecutive_failures > 0 {
                log::info!("Collector {} recovered", self.spec.name);
            }
            self.consecutive_failures = 0;
            self.backoff.mark_success();
            self.state = CollectorState::Succeeded;
            self.next_delay = self.spec.interval;
        }

        readings
    }

    fn fail_all(&self, error: ProbeError) -> Vec<(Metric, ProbeResult<MetricValue>)> {
        self.spec
            .metrics
            .iter()
            .map(|&metric| (metric, Err(error.clone())))
            .collect()
    }

    /// Tick forever on the collector's own schedule until shutdown.
    ///
    /// The first attempt fires immediately.
    pub async fn run(
        mut self,
        updates: mpsc::Sender<Reading>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        log::debug!("Collector {} started", self.spec.name);
        let mut delay = Duration::ZERO;

        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => break,
                _ = sleep(delay) => {}
            }

            for reading in self.tick().await {
                if updates.send(reading).await.is_err() {
                    log::debug!("Collector {} lost its merge point", self.spec.name);
                    self.state = CollectorState::Stopped;
                    return;
                }
            }

            delay = self.next_delay;
            self.state = CollectorState::Idle;
        }

        self.state = CollectorState::Stopped;
        log::debug!("Collector {} stopped", self.spec.name);
    }
}

//! Tokio runtime hosting the monitoring engine for synchronous callers.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use super::engine::{Engine, EngineBuilder};
use super::history::HistoryPoint;
use super::metrics::{Metric, Snapshot};
use super::publisher::Subscription;

/// Wrapper around the Tokio runtime running the engine.
pub struct MonitorRuntime {
    /// Receiver that always holds the latest snapshot
    pub snapshot_rx: watch::Receiver<Arc<Snapshot>>,

    // Declared before the runtime so it is dropped first
    engine: Engine,

    runtime: tokio::runtime::Runtime,
}

impl MonitorRuntime {
    /// Start the engine on a 2-worker runtime.
    pub fn start(builder: EngineBuilder) -> anyhow::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .thread_name("netpulse-worker")
            .build()?;

        let engine = {
            let _guard = runtime.enter();
            builder.start()?
        };
        let snapshot_rx = engine.watch();

        log::info!("MonitorRuntime initialized");

        Ok(Self {
            snapshot_rx,
            engine,
            runtime,
        })
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn current_snapshot(&self) -> Arc<Snapshot> {
        self.engine.current_snapshot()
    }

    pub fn subscribe(&self) -> Subscription {
        self.engine.subscribe()
    }

    pub fn history(&self, metric: Metric, max_points: usize) -> Vec<HistoryPoint> {
        self.engine.history(metric, max_points)
    }

    /// Drive a future on the monitoring runtime
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    /// Shut the engine down and return its final snapshot.
    pub fn shutdown(self, grace: Duration) -> Arc<Snapshot> {
        let Self {
            engine, runtime, ..
        } = self;
        let snapshot = runtime.block_on(engine.shutdown(grace));
        runtime.shutdown_timeout(Duration::from_millis(500));
        snapshot
    }
}

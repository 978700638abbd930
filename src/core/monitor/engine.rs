//! Engine: owns the collectors and the single merge point.
//!
//! Every collector runs as its own task and sends readings over one bounded
//! channel to the orchestrator, which is the only writer of the current
//! snapshot. Each merged snapshot is logged and then published.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::runtime::{Handle, Runtime};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use super::aggregator::{merge, merge_all};
use super::collector::Collector;
use super::history::{HistoryPoint, HistoryStore, DEFAULT_HISTORY_SIZE};
use super::logger::SnapshotLog;
use super::metrics::{Metric, Reading, Snapshot};
use super::publisher::{Publisher, Subscription, DEFAULT_INBOX_CAPACITY};
use crate::error::{NetpulseError, Result};

const READING_CHANNEL_CAPACITY: usize = 256;
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

pub struct EngineBuilder {
    collectors: Vec<Collector>,
    history_capacity: usize,
    inbox_capacity: usize,
    log: Option<SnapshotLog>,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            collectors: Vec::new(),
            history_capacity: DEFAULT_HISTORY_SIZE,
            inbox_capacity: DEFAULT_INBOX_CAPACITY,
            log: None,
        }
    }

    pub fn collector(mut self, collector: Collector) -> Self {
        self.collectors.push(collector);
        self
    }

    pub fn collectors<I: IntoIterator<Item = Collector>>(mut self, collectors: I) -> Self {
        self.collectors.extend(collectors);
        self
    }

    pub fn history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    /// Per-subscriber inbox size
    pub fn inbox_capacity(mut self, capacity: usize) -> Self {
        self.inbox_capacity = capacity;
        self
    }

    pub fn log(mut self, log: SnapshotLog) -> Self {
        self.log = Some(log);
        self
    }

    fn check_ownership(&self) -> Result<()> {
        let mut owners: HashMap<Metric, &str> = HashMap::new();
        for collector in &self.collectors {
            for &metric in &collector.spec().metrics {
                if let Some(other) = owners.insert(metric, collector.name()) {
                    return Err(NetpulseError::engine(format!(
                        "metric {} is produced by both {} and {}",
                        metric,
                        other,
                        collector.name()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Spawn the orchestrator and every collector on the current tokio runtime.
    ///
    /// Collectors flagged dedicated go to a separate single-worker runtime.
    pub fn start(self) -> Result<Engine> {
        self.check_ownership()?;
        let handle = Handle::try_current()
            .map_err(|_| NetpulseError::engine("engine must be started inside a tokio runtime"))?;

        let history = Arc::new(HistoryStore::with_capacity(self.history_capacity));
        let publisher = Arc::new(Publisher::new(self.inbox_capacity));
        let (reading_tx, reading_rx) = mpsc::channel::<Reading>(READING_CHANNEL_CAPACITY);
        let (shutdown_tx, _) = broadcast::channel::<()>(1);
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let heavy = if self.collectors.iter().any(|c| c.spec().dedicated) {
            Some(
                tokio::runtime::Builder::new_multi_thread()
                    .worker_threads(1)
                    .enable_all()
                    .thread_name("netpulse-heavy")
                    .build()?,
            )
        } else {
            None
        };

        let orchestrator = handle.spawn(orchestrator_task(
            reading_rx,
            publisher.clone(),
            self.log,
            stop_rx,
        ));

        let mut tasks = Vec::with_capacity(self.collectors.len());
        for collector in self.collectors {
            let collector = collector.with_history(history.clone());
            let name = collector.name().to_string();
            let dedicated = collector.spec().dedicated;
            let run = collector.run(reading_tx.clone(), shutdown_tx.subscribe());

            let task = match heavy.as_ref() {
                Some(runtime) if dedicated => runtime.spawn(run),
                _ => handle.spawn(run),
            };
            tasks.push((name, task));
        }

        log::info!("Engine started with {} collectors", tasks.len());

        Ok(Engine {
            publisher,
            history,
            shutdown_tx,
            stop_tx: Some(stop_tx),
            orchestrator: Some(orchestrator),
            tasks,
            heavy,
        })
    }
}

pub struct Engine {
    publisher: Arc<Publisher>,
    history: Arc<HistoryStore>,
    shutdown_tx: broadcast::Sender<()>,
    stop_tx: Option<oneshot::Sender<()>>,
    orchestrator: Option<JoinHandle<Option<SnapshotLog>>>,
    tasks: Vec<(String, JoinHandle<()>)>,
    heavy: Option<Runtime>,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Latest snapshot; never blocks
    pub fn current_snapshot(&self) -> Arc<Snapshot> {
        self.publisher.current()
    }

    pub fn subscribe(&self) -> Subscription {
        self.publisher.subscribe()
    }

    pub fn watch(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.publisher.watch()
    }

    /// Newest `max_points` successful samples of `metric`, oldest first
    pub fn history(&self, metric: Metric, max_points: usize) -> Vec<HistoryPoint> {
        self.history.series(metric, max_points)
    }

    pub fn history_store(&self) -> Arc<HistoryStore> {
        self.history.clone()
    }

    pub fn collector_names(&self) -> Vec<&str> {
        self.tasks.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Stop the engine and return the final snapshot.
    ///
    /// The orchestrator stops first, so no snapshot is published and no log
    /// line written once this is called. Collectors then get `grace` to
    /// finish in-flight measurements before being aborted.
    pub async fn shutdown(mut self, grace: Duration) -> Arc<Snapshot> {
        log::info!("Engine shutting down");

        if let Some(stop) = self.stop_tx.take() {
            let _ = stop.send(());
        }
        let mut log = match self.orchestrator.take() {
            Some(orchestrator) => orchestrator.await.unwrap_or_else(|e| {
                log::error!("Orchestrator task failed: {}", e);
                None
            }),
            None => None,
        };

        let _ = self.shutdown_tx.send(());
        let mut tasks = std::mem::take(&mut self.tasks);
        let finished = tokio::time::timeout(
            grace,
            join_all(tasks.iter_mut().map(|(_, task)| task)),
        )
        .await;

        if finished.is_err() {
            for (name, task) in &tasks {
                if !task.is_finished() {
                    log::warn!("Collector {} did not stop within {:?}, aborting", name, grace);
                    task.abort();
                }
            }
        }

        self.publisher.close();
        if let Some(log) = log.as_mut() {
            log.flush();
        }
        if let Some(runtime) = self.heavy.take() {
            runtime.shutdown_background();
        }

        log::info!("Engine stopped");
        self.publisher.current()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        // Dropped without shutdown(): stop everything without waiting
        if let Some(stop) = self.stop_tx.take() {
            let _ = stop.send(());
        }
        let _ = self.shutdown_tx.send(());
        for (_, task) in &self.tasks {
            task.abort();
        }
        self.publisher.close();
        if let Some(runtime) = self.heavy.take() {
            runtime.shutdown_background();
        }
    }
}

async fn orchestrator_task(
    mut readings: mpsc::Receiver<Reading>,
    publisher: Arc<Publisher>,
    mut log: Option<SnapshotLog>,
    mut stop: oneshot::Receiver<()>,
) -> Option<SnapshotLog> {
    let mut current = Arc::new(Snapshot::empty());

    loop {
        tokio::select! {
            biased;
            _ = &mut stop => break,
            reading = readings.recv() => {
                let Some(reading) = reading else { break };
                let Some(next) = merge(&current, &reading) else {
                    log::trace!("Discarded superseded reading for {}", reading.metric);
                    continue;
                };
                current = Arc::new(next);

                if let Some(log) = log.as_mut() {
                    log.append(&current);
                }
                publisher.publish(current.clone());
            }
        }
    }

    log::debug!("Orchestrator stopped");
    log
}

/// Run every collector exactly once and fold the readings into a snapshot.
pub async fn run_once(mut collectors: Vec<Collector>) -> Snapshot {
    let batches = join_all(collectors.iter_mut().map(|c| c.tick())).await;
    let readings: Vec<Reading> = batches.into_iter().flatten().collect();
    merge_all(Snapshot::empty(), &readings)
}

//! Continuous network and system health monitoring.
//!
//! Collectors run probes on their own schedules; their readings are merged
//! into immutable snapshots by a single orchestrator, then logged, kept in
//! history and published to subscribers.

pub mod aggregator;
pub mod backoff;
mod collector;
mod engine;
pub mod error;
pub mod health;
pub mod history;
pub mod logger;
mod metrics;
pub mod probes;
mod publisher;
mod runtime;
pub mod setup;

pub use aggregator::{merge, merge_all};
pub use backoff::{Backoff, BackoffPolicy};
pub use collector::{Collector, CollectorSpec, CollectorState};
pub use engine::{run_once, Engine, EngineBuilder, DEFAULT_SHUTDOWN_GRACE};
pub use error::{ProbeError, ProbeResult};
pub use health::{evaluate_health, Health, HealthConfig, HealthStatus};
pub use history::{HistoryPoint, HistoryStore, DEFAULT_HISTORY_SIZE};
pub use logger::{format_line, LogOutcome, SnapshotLog};
pub use metrics::{Metric, MetricState, MetricValue, Reading, Snapshot, Unit, ValueKind};
pub use probes::{Measurement, Probe};
pub use publisher::{Publisher, Subscription};
pub use runtime::MonitorRuntime;
pub use setup::create_collectors;

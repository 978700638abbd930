// Core business logic module

pub mod config;
pub mod monitor;
pub mod netinfo;

// Re-export commonly used items
pub use config::{CollectorKind, Config};
pub use monitor::{Engine, EngineBuilder, Metric, Snapshot};
pub use netinfo::NetworkInfo;

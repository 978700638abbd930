// netpulse library - public API

// Re-export error types
pub mod error;
pub use error::{NetpulseError, Result};

// Module declarations
pub mod commands;
pub mod core;
pub mod platform;
pub mod ui;

// Re-export commonly used types
pub use core::config::Config;
pub use core::monitor::{Engine, Metric, Snapshot};

// Initialize logging. `RUST_LOG` overrides the default level.
pub fn init_logging(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp_millis()
        .init();
}

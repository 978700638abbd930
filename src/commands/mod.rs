// Command handlers module
pub mod completions;
pub mod config;
pub mod once;
pub mod run;
pub mod version;

// Re-exports for cleaner imports
pub use once::execute as once;
pub use run::execute as run;
pub use version::execute as version;

use anyhow::Result;
use clap::ArgMatches;
use std::path::PathBuf;

use crate::core::Config;

/// Load the configuration named by `--config`, or the default one
pub fn load_config(matches: &ArgMatches) -> Result<Config> {
    match matches.get_one::<PathBuf>("config") {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
}

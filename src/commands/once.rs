//! Single measurement pass.

use anyhow::{Context, Result};
use clap::ArgMatches;
use colored::Colorize;

use super::load_config;
use crate::core::monitor::{create_collectors, evaluate_health, run_once};
use crate::core::netinfo;
use crate::ui::formatters::{print_network_info, print_snapshot};

pub fn execute(matches: &ArgMatches) -> Result<()> {
    let config = load_config(matches)?;
    let json_output = matches.get_flag("json");

    let collectors = create_collectors(&config).context("Failed to configure collectors")?;
    if !json_output {
        println!(
            "{}",
            format!("Running {} collectors once...", collectors.len()).cyan()
        );
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .thread_name("netpulse-once")
        .build()?;
    let (snapshot, network) =
        runtime.block_on(async { tokio::join!(run_once(collectors), netinfo::gather(&config)) });

    if json_output {
        let output = serde_json::json!({ "network": network, "snapshot": snapshot });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!();
        print_network_info(&network);
        println!();
        print_snapshot(&snapshot, &evaluate_health(&snapshot, &config.health));
    }
    Ok(())
}

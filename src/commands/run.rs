//! Continuous monitoring command.

use anyhow::{Context, Result};
use clap::ArgMatches;
use colored::Colorize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::load_config;
use crate::core::monitor::{
    create_collectors, evaluate_health, EngineBuilder, MonitorRuntime, SnapshotLog,
};
use crate::core::netinfo;
use crate::ui::formatters::{format_summary, print_network_info, print_snapshot};

const POLL: Duration = Duration::from_millis(200);

pub fn execute(matches: &ArgMatches) -> Result<()> {
    let config = load_config(matches)?;
    config.validate().context("Invalid configuration")?;

    let json_output = matches.get_flag("json");
    let duration = matches.get_one::<u64>("duration").map(|s| Duration::from_secs(*s));
    let log_path = match matches.get_one::<PathBuf>("log") {
        Some(path) => path.clone(),
        None => config.resolved_log_path()?,
    };

    let collectors = create_collectors(&config).context("Failed to configure collectors")?;
    let log = SnapshotLog::new(&log_path)
        .with_interval(config.log_every())
        .with_health(config.health.clone());
    let builder = EngineBuilder::new()
        .collectors(collectors)
        .history_capacity(config.history_capacity)
        .log(log);

    let monitor = MonitorRuntime::start(builder).context("Failed to start monitoring engine")?;

    let cancel_flag = Arc::new(AtomicBool::new(false));
    let cancel_flag_clone = cancel_flag.clone();
    ctrlc::set_handler(move || {
        cancel_flag_clone.store(true, Ordering::Relaxed);
    })
    .map_err(|e| anyhow::anyhow!("Failed to set Ctrl+C handler: {}", e))?;

    let network = monitor.block_on(netinfo::gather(&config));
    log::info!(
        "Interface {} ({}), gateway {}, public IP {}",
        network.interface.as_deref().unwrap_or("-"),
        network.local_ip.map(|ip| ip.to_string()).unwrap_or_else(|| "-".to_string()),
        network.gateway.map(|ip| ip.to_string()).unwrap_or_else(|| "-".to_string()),
        network.public_ip.map(|ip| ip.to_string()).unwrap_or_else(|| "-".to_string())
    );

    if json_output {
        println!("{}", serde_json::json!({ "network": network }));
    } else {
        print_network_info(&network);
        println!();
        println!("{}", "Monitoring network health...".cyan().bold());
        println!("{}", format!("Logging to {}", log_path.display()).dimmed());
        println!("{}", "Press Ctrl+C to stop".dimmed());
        println!();
    }

    let print_every = config.log_every().max(Duration::from_secs(1));
    let started = Instant::now();
    let mut last_print: Option<Instant> = None;
    let mut snapshots = monitor.snapshot_rx.clone();

    loop {
        if cancel_flag.load(Ordering::Relaxed) {
            break;
        }
        if duration.is_some_and(|d| started.elapsed() >= d) {
            break;
        }

        let changed = monitor.block_on(async { tokio::time::timeout(POLL, snapshots.changed()).await });
        match changed {
            Ok(Ok(())) => {}
            // Engine gone
            Ok(Err(_)) => break,
            Err(_) => continue,
        }

        if last_print.is_some_and(|at| at.elapsed() < print_every) {
            continue;
        }
        let snapshot = snapshots.borrow_and_update().clone();
        last_print = Some(Instant::now());

        if json_output {
            println!("{}", serde_json::to_string(&*snapshot)?);
        } else {
            let health = evaluate_health(&snapshot, &config.health);
            println!("{}", format_summary(&snapshot, &health));
        }
    }

    if !json_output {
        println!();
        println!("{}", "Stopping collectors...".yellow());
    }
    let last = monitor.shutdown(config.shutdown_grace());

    if json_output {
        println!("{}", serde_json::to_string(&*last)?);
    } else {
        println!();
        print_snapshot(&last, &evaluate_health(&last, &config.health));
    }
    Ok(())
}

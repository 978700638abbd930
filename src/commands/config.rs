use anyhow::{Context, Result};
use clap::ArgMatches;
use colored::Colorize;
use std::path::PathBuf;

use crate::core::{CollectorKind, Config};
use crate::ui::prompts;

pub fn execute(matches: &ArgMatches) -> Result<()> {
    match matches.subcommand() {
        Some(("show", sub_matches)) => show(sub_matches),
        Some(("init", sub_matches)) => init(sub_matches),
        Some(("path", sub_matches)) => path(sub_matches),
        _ => {
            println!("Use 'netpulse config --help' for more information.");
            Ok(())
        }
    }
}

fn target_path(matches: &ArgMatches) -> Result<PathBuf> {
    match matches.get_one::<PathBuf>("config") {
        Some(path) => Ok(path.clone()),
        None => Config::config_path(),
    }
}

fn show(matches: &ArgMatches) -> Result<()> {
    let path = target_path(matches)?;
    let config = Config::load_from(&path)?;

    println!("{} {}", "Config file:".white().bold(), path.display());
    if !path.exists() {
        prompts::dimmed("(not created yet, showing defaults)");
    }
    println!("{}", serde_json::to_string_pretty(&config)?);

    println!();
    println!("{}", "Collectors:".white().bold());
    for kind in CollectorKind::ALL {
        let settings = config.collector_settings(kind);
        let state = if settings.enabled {
            "enabled".green()
        } else {
            "disabled".dimmed()
        };
        println!(
            "  {:<12} {:<8} every {:>4}s, timeout {:>6}ms",
            kind.name(),
            state,
            settings.interval.as_secs(),
            settings.timeout.as_millis()
        );
    }

    if let Err(e) = config.validate() {
        prompts::warn(&format!("configuration is invalid: {}", e));
    }
    Ok(())
}

fn init(matches: &ArgMatches) -> Result<()> {
    let path = target_path(matches)?;
    let force = matches.get_flag("force");

    if path.exists() && !force {
        let overwrite = prompts::confirm(&format!(
            "{} already exists. Overwrite with defaults? [y/N]",
            path.display()
        ))?;
        if !overwrite {
            prompts::info("Keeping existing configuration.");
            return Ok(());
        }
    }

    Config::default()
        .save_to(&path)
        .with_context(|| format!("Failed to initialize {:?}", path))?;
    prompts::success(&format!("Wrote default configuration to {}", path.display()));
    Ok(())
}

fn path(matches: &ArgMatches) -> Result<()> {
    println!("{}", target_path(matches)?.display());
    Ok(())
}

use anyhow::Result;
use clap::{value_parser, Arg, ArgAction, Command};
use std::path::PathBuf;

use netpulse::commands;

fn build_cli() -> Command {
    Command::new("netpulse")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Continuous network and system health monitor")
        .disable_version_flag(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("PATH")
                .help("Use this configuration file instead of the default one")
                .value_parser(value_parser!(PathBuf))
                .global(true),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .help("Log engine activity to stderr")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .subcommand(
            Command::new("run")
                .about("Monitor continuously until Ctrl+C")
                .arg(
                    Arg::new("json")
                        .long("json")
                        .help("Print snapshots as JSON lines")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("log")
                        .short('l')
                        .long("log")
                        .value_name("PATH")
                        .help("Append snapshot lines to this file")
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(
                    Arg::new("duration")
                        .short('d')
                        .long("duration")
                        .value_name("SECS")
                        .help("Stop after this many seconds")
                        .value_parser(value_parser!(u64)),
                ),
        )
        .subcommand(
            Command::new("once")
                .about("Run every collector once and print the snapshot")
                .arg(
                    Arg::new("json")
                        .long("json")
                        .help("Print the snapshot as JSON")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("config")
                .about("Manage configuration (use 'netpulse config --help' for subcommands)")
                .subcommand_required(true)
                .arg_required_else_help(true)
                .subcommand(Command::new("show").about("Show the effective configuration"))
                .subcommand(
                    Command::new("init")
                        .about("Write the default configuration file")
                        .arg(
                            Arg::new("force")
                                .short('f')
                                .long("force")
                                .help("Overwrite without asking")
                                .action(ArgAction::SetTrue),
                        ),
                )
                .subcommand(Command::new("path").about("Print the configuration file path")),
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completions")
                .arg(
                    Arg::new("shell")
                        .help("Shell to generate completions for (bash, zsh, fish, powershell, elvish)")
                        .required(true)
                        .index(1),
                ),
        )
        .subcommand(Command::new("version").about("Shows version information"))
}

fn main() -> Result<()> {
    let matches = build_cli().get_matches();
    netpulse::init_logging(matches.get_flag("verbose"));

    match matches.subcommand() {
        Some(("run", sub_matches)) => commands::run(sub_matches),
        Some(("once", sub_matches)) => commands::once(sub_matches),
        Some(("config", sub_matches)) => commands::config::execute(sub_matches),
        Some(("completions", sub_matches)) => {
            commands::completions::execute(sub_matches, &mut build_cli())
        }
        Some(("version", _)) => commands::version(),
        _ => {
            println!("Use 'netpulse --help' for more information.");
            Ok(())
        }
    }
}

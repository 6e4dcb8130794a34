//! archival-import CLI - Main entry point

mod commands;
mod error;
mod output;

use archival_import_sdk::logging::{self, LogConfig, LogFormat, LogLevel};
use clap::{Parser, Subcommand};
use std::process::ExitCode;
use tracing::error;

use commands::id::IdArgs;
use commands::import::ImportArgs;
use commands::show::ShowArgs;

/// Import archival descriptions into a versioned graph
#[derive(Debug, Parser)]
#[command(name = "archival-import", version, about)]
struct Cli {
    /// Minimum log level (RUST_LOG overrides)
    #[arg(long, global = true, default_value = "warn")]
    log_level: LogLevel,

    /// Log line format: text or json
    #[arg(long, global = true, default_value = "text")]
    log_format: LogFormat,

    /// Shorthand for --log-level debug
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Import files into a graph snapshot
    Import(ImportArgs),
    /// Print a stored entity and its dependents
    Show(ShowArgs),
    /// Print the id generated for a local identifier in a scope
    Id(IdArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { LogLevel::Debug } else { cli.log_level };
    let log_config = LogConfig::new().level(level).format(cli.log_format);
    if let Err(e) = logging::init(&log_config) {
        eprintln!("Warning: {}", e);
    }

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command) -> anyhow::Result<()> {
    match command {
        Command::Import(args) => commands::import::handle_import(&args)?,
        Command::Show(args) => commands::show::handle_show(&args)?,
        Command::Id(args) => commands::id::handle_id(&args)?,
    }
    Ok(())
}

//! TerraStream CLI
//!
//! Inspects layer configuration files and runs a synthetic frame loop
//! against a tile layer.

mod commands;
mod error;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use terrastream::logging::{default_log_dir, init_logging, LoggingGuard, DEFAULT_LOG_FILE};

use commands::config::ConfigCommands;
use commands::simulate::SimulateArgs;
use error::CliError;

#[derive(Parser)]
#[command(name = "terrastream", version)]
#[command(about = "Level-of-detail tile streaming tools", long_about = None)]
struct Cli {
    /// Also write log output to stderr
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Directory for the log file
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect and create layer configuration files
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Fly a synthetic viewer over a layer and report per-frame selection
    Simulate(SimulateArgs),
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        e.exit();
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Config { command } => commands::config::run(command),
        Commands::Simulate(args) => {
            let _guard = start_logging(cli.log_dir, cli.verbose)?;
            commands::simulate::run(args)
        }
    }
}

fn start_logging(log_dir: Option<PathBuf>, verbose: bool) -> Result<LoggingGuard, CliError> {
    let dir = log_dir.unwrap_or_else(default_log_dir);
    let guard = init_logging(&dir, DEFAULT_LOG_FILE, verbose)?;
    tracing::info!(
        version = terrastream::VERSION,
        log = %guard.log_path().display(),
        "TerraStream starting"
    );
    Ok(guard)
}

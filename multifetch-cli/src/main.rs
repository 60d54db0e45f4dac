//! Multifetch CLI - fetch many URLs concurrently
//!
//! ```text
//! multifetch fetch https://example.com/a.png https://example.com/b.png --out downloads
//! multifetch config
//! ```

mod commands;
mod error;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use multifetch::logging::{self, LogConfig};

use commands::fetch::FetchArgs;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "multifetch", version, about = "Concurrent downloader with a shared cache")]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Also write logs to daily files in this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Download one or more URLs
    Fetch(FetchArgs),

    /// Show the effective configuration
    Config,
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        process::exit(e.exit_code());
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let mut log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };
    if let Some(dir) = cli.log_dir {
        log_config = log_config.with_directory(dir);
    }
    let _log_guard = logging::init(&log_config)?;

    match cli.command {
        Commands::Fetch(args) => commands::fetch::run(args, cli.config.as_deref()),
        Commands::Config => commands::config::run(cli.config.as_deref()),
    }
}

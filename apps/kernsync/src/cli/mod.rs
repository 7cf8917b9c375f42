//! # kernsync CLI Module
//!
//! ## Available Commands
//!
//! - `server` - Startup pass, optional autosync, HTTP trigger
//! - `sync` - Run one pass and print its report
//! - `list` - List rows of the kernel table
//! - `forget` - Delete rows of the kernel table
//! - `check` - Validate configuration and database location

mod commands;

use crate::config::{Config, RecordType};
use clap::{Parser, Subcommand};
use kernsync_core::{KernelRecord, KernsyncError, RemoteKernelRecord};
use std::path::PathBuf;

pub use commands::*;

/// Default configuration file, read when present.
pub const DEFAULT_CONFIG_FILE: &str = "kernsync.toml";

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// kernsync - kernel and session synchronizer
///
/// Keeps running kernels, the persistent kernel table and an optional remote
/// kernel gateway consistent with each other.
#[derive(Parser, Debug)]
#[command(name = "kernsync")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file (default: kernsync.toml, if present)
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    /// Kernel table location: ":memory:" or a file path
    #[arg(short = 'D', long, global = true)]
    pub database: Option<String>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP server and the scheduler
    Server {
        /// Host to bind to
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(short, long)]
        port: Option<u16>,

        /// Run passes periodically after the startup pass
        #[arg(long)]
        autosync: bool,

        /// Seconds between automatic passes
        #[arg(long)]
        interval: Option<f64>,
    },

    /// Run one sync pass
    Sync,

    /// List rows of the kernel table
    List,

    /// Delete rows of the kernel table matching an identifier
    Forget {
        /// Identifier field (e.g. kernel_id)
        #[arg(short, long, default_value = "kernel_id")]
        field: String,

        /// Identifier value
        #[arg(short = 'V', long)]
        value: String,
    },

    /// Validate configuration and database location
    Check,
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Load configuration and apply global overrides.
pub fn load_config(cli: &Cli) -> Result<Config, KernsyncError> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path, true)?,
        None => Config::load(std::path::Path::new(DEFAULT_CONFIG_FILE), false)?,
    };
    if let Some(database) = &cli.database {
        config.storage.database.clone_from(database);
    }
    Ok(config)
}

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), KernsyncError> {
    let mut config = load_config(&cli)?;
    let output = Output {
        json_mode: cli.json_mode,
        verbose: cli.verbose,
    };

    let command = cli.command.unwrap_or(Commands::Check);
    if let Commands::Server {
        host,
        port,
        autosync,
        interval,
    } = &command
    {
        if let Some(host) = host {
            config.server.host.clone_from(host);
        }
        if let Some(port) = port {
            config.server.port = *port;
        }
        if *autosync {
            config.sync.autosync = true;
        }
        if let Some(interval) = interval {
            config.sync.interval_secs = *interval;
        }
    }

    match config.storage.record_type {
        RecordType::Kernel => run::<KernelRecord>(&command, &config, output).await,
        RecordType::Remote => run::<RemoteKernelRecord>(&command, &config, output).await,
    }
}

async fn run<R: kernsync_core::Record>(
    command: &Commands,
    config: &Config,
    output: Output,
) -> Result<(), KernsyncError> {
    match command {
        Commands::Server { .. } => cmd_server::<R>(config).await,
        Commands::Sync => cmd_sync::<R>(config, output).await,
        Commands::List => cmd_list::<R>(config, output),
        Commands::Forget { field, value } => cmd_forget::<R>(config, output, field, value),
        Commands::Check => cmd_check::<R>(config, output),
    }
}

//! AppVault CLI
//!
//! Command-line tools for AppVault data directories.
//!
//! # Commands
//!
//! - `inspect` - Display applications, submissions and blob statistics
//! - `verify` - Re-hash every blob and check every reference
//! - `gc` - Delete blobs nothing references
//! - `token` - Mint a signed handshake

mod commands;

use appvault_server::ENV_DATA_DIR;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// AppVault command-line admin tools.
#[derive(Parser)]
#[command(name = "appvault")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the data directory (defaults to $APPVAULT_DATA_DIR)
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display applications, submissions and blob statistics
    Inspect {
        /// Only show this application
        #[arg(short, long)]
        app: Option<String>,

        /// List every manifest entry
        #[arg(short, long)]
        files: bool,

        /// Output format (text, json)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Verify blob digests and manifest references
    Verify,

    /// Delete blobs no manifest or submission references
    Gc,

    /// Mint a signed handshake query string
    Token {
        /// Application ID
        #[arg(short, long)]
        app: String,

        /// Action to authorize (push, pull, submit)
        #[arg(long)]
        action: String,

        /// Developer user ID (development token)
        #[arg(short, long)]
        user: Option<String>,

        /// Submission ID (production token)
        #[arg(short, long)]
        submission: Option<String>,

        /// Signing secret (defaults to $APPVAULT_SECRET)
        #[arg(long)]
        secret: Option<String>,

        /// Output format (query, json)
        #[arg(long, default_value = "query")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let data_dir = || -> Result<PathBuf, String> {
        cli.path
            .clone()
            .or_else(|| std::env::var_os(ENV_DATA_DIR).map(PathBuf::from))
            .ok_or_else(|| format!("Data directory required: pass --path or set {ENV_DATA_DIR}"))
    };

    match &cli.command {
        Commands::Inspect { app, files, format } => {
            commands::inspect::run(&data_dir()?, app.as_deref(), *files, format)?;
        }
        Commands::Verify => {
            commands::verify::run(&data_dir()?)?;
        }
        Commands::Gc => {
            commands::gc::run(&data_dir()?)?;
        }
        Commands::Token {
            app,
            action,
            user,
            submission,
            secret,
            format,
        } => {
            commands::token::run(
                secret.clone(),
                app,
                action,
                user.as_deref(),
                submission.as_deref(),
                format,
            )?;
        }
        Commands::Version => {
            println!("AppVault CLI v{}", env!("CARGO_PKG_VERSION"));
            println!(
                "Bundle footer format: {}",
                appvault_protocol::FOOTER_MAGIC
            );
        }
    }

    Ok(())
}

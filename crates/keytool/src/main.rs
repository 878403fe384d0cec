//! `lumi-keytool`: operator CLI for field encryption keys.
//!
//! Startup sequence:
//! 1. Parse the command line.
//! 2. Load and validate [`Config`] from environment variables.
//! 3. Initialise structured JSON logging to stderr.
//! 4. Resolve the keys the subcommand needs and run it, writing to stdout.

mod commands;
mod config;
mod key_source;
mod telemetry;

use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use config::Config;

#[derive(Debug, Parser)]
#[command(name = "lumi-keytool", version, about = "Manage field encryption keys and encrypted records")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate a new key and print it as a settings line and a `.env` line.
    GenerateKey,

    /// Encrypt legacy plaintext values that have no encrypted value yet.
    Migrate {
        /// JSON file of loan application records.
        #[arg(long)]
        records: PathBuf,
        /// Report what would change without writing anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// Re-encrypt every value from the old key to the active key.
    Rotate {
        /// JSON file of loan application records.
        #[arg(long)]
        records: PathBuf,
        /// Stop at the first attribute that fails to rotate.
        #[arg(long)]
        fail_fast: bool,
    },

    /// Check that every value decrypts under the active key.
    Verify {
        /// JSON file of loan application records.
        #[arg(long)]
        records: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // -----------------------------------------------------------------------
    // 1. Command line
    // -----------------------------------------------------------------------
    let cli = Cli::parse();

    // -----------------------------------------------------------------------
    // 2. Configuration
    // -----------------------------------------------------------------------
    let cfg = Config::from_env().map_err(|e| {
        // Telemetry is not yet up; write to stderr directly.
        eprintln!("ERROR: configuration invalid: {e}");
        e
    })?;

    // -----------------------------------------------------------------------
    // 3. Telemetry
    // -----------------------------------------------------------------------
    telemetry::init(&cfg.log_level)?;
    info!(version = env!("CARGO_PKG_VERSION"), command = ?cli.command, "lumi-keytool starting");

    // -----------------------------------------------------------------------
    // 4. Command
    // -----------------------------------------------------------------------
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match cli.command {
        Command::GenerateKey => commands::generate::run(&mut out)?,

        Command::Migrate { records, dry_run } => {
            let store = cfg.active_key_source()?.store().await?;
            let report = commands::migrate::run(&store, &records, dry_run, &mut out)?;
            if !report.failures.is_empty() {
                anyhow::bail!("{} attribute(s) could not be migrated", report.failures.len());
            }
        }

        Command::Rotate { records, fail_fast } => {
            let old = cfg.old_key_source()?.store().await?;
            let new = cfg.active_key_source()?.store().await?;
            let report = commands::rotate::run(&old, &new, &records, fail_fast, &mut out)?;
            if !report.is_clean() {
                anyhow::bail!("{} attribute(s) could not be rotated", report.attributes_failed);
            }
        }

        Command::Verify { records } => {
            let store = cfg.active_key_source()?.store().await?;
            let report = commands::verify::run(&store, &records, &mut out)?;
            if !report.is_clean() {
                anyhow::bail!(
                    "{} attribute(s) do not decrypt under the active key",
                    report.failures.len()
                );
            }
        }
    }

    out.flush()?;
    Ok(())
}

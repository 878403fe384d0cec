//! Subcommand implementations. Each writes its result to `out` and logs to stderr.

pub mod generate;
pub mod migrate;
pub mod rotate;
pub mod verify;

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use fieldstore::record::LoanApplication;
use fieldstore::JsonFileRepository;
use serde::Serialize;

/// Open the loan application records file.
fn open_records(path: &Path) -> Result<JsonFileRepository<LoanApplication>> {
    JsonFileRepository::open(path)
        .with_context(|| format!("failed to load records from {}", path.display()))
}

/// Write `report` as pretty JSON followed by a newline.
fn write_report<T: Serialize>(out: &mut impl Write, report: &T) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, report).context("failed to write report")?;
    writeln!(out)?;
    Ok(())
}

//! `migrate`: encrypt legacy plaintext values in a records file.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use common::protocol::MigrationReport;
use fieldstore::{encrypt_legacy, EncryptedFieldStore};
use tracing::info;

use super::{open_records, write_report};

/// Run the migration and write the report. Nothing is written back on a dry run.
pub fn run(
    store: &EncryptedFieldStore,
    records: &Path,
    dry_run: bool,
    out: &mut impl Write,
) -> Result<MigrationReport> {
    let mut repo = open_records(records)?;
    let report = encrypt_legacy(&mut repo, store, dry_run)?;

    if dry_run {
        info!(
            records = report.records_encrypted,
            "dry run: no changes written; re-run without --dry-run to apply"
        );
    } else {
        repo.flush()
            .with_context(|| format!("failed to write {}", records.display()))?;
    }

    write_report(out, &report)?;
    Ok(report)
}

//! `verify`: confirm every token in a records file opens under the active key.

use std::io::Write;
use std::path::Path;

use anyhow::Result;
use common::protocol::VerificationReport;
use fieldstore::{verify, EncryptedFieldStore};

use super::{open_records, write_report};

/// Verify the records file and write the report.
pub fn run(store: &EncryptedFieldStore, records: &Path, out: &mut impl Write) -> Result<VerificationReport> {
    let repo = open_records(records)?;
    let report = verify(&repo, store)?;
    write_report(out, &report)?;
    Ok(report)
}

//! `rotate`: re-encrypt a records file from the old key to the active key.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use common::protocol::RotationReport;
use fieldstore::{rotate_repository, EncryptedFieldStore, FailurePolicy, RotationError};
use tracing::warn;

use super::{open_records, write_report};

/// Rotate every record and write the report.
///
/// Records rotated before an abort are still written back, so the command can
/// simply be re-run once the failing record is dealt with.
pub fn run(
    old: &EncryptedFieldStore,
    new: &EncryptedFieldStore,
    records: &Path,
    fail_fast: bool,
    out: &mut impl Write,
) -> Result<RotationReport> {
    if old.key_id() == new.key_id() {
        anyhow::bail!("old and active keys are identical (id {}); nothing to rotate", new.key_id());
    }

    let policy = if fail_fast {
        FailurePolicy::AbortOnFirstFailure
    } else {
        FailurePolicy::Continue
    };

    let mut repo = open_records(records)?;
    let result = rotate_repository(&mut repo, old, new, policy);

    repo.flush()
        .with_context(|| format!("failed to write {}", records.display()))?;

    match result {
        Ok(report) => {
            write_report(out, &report)?;
            Ok(report)
        }
        Err(RotationError::Aborted { failure, report }) => {
            write_report(out, &*report)?;
            warn!(record = %failure.record, attribute = %failure.attribute, "rotation stopped early");
            anyhow::bail!(
                "rotation aborted at record {} attribute {}",
                failure.record,
                failure.attribute
            )
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use fieldstore::record::loan::IRD_NUMBER;
    use fieldstore::record::LoanApplication;
    use fieldstore::{verify, JsonFileRepository};

    use super::*;
    use crate::commands::fixtures;

    #[test]
    fn rotates_file_and_is_rerunnable() {
        let (old, new) = (fixtures::store(), fixtures::store());
        let (_dir, path) = fixtures::records_file(&old);

        let first = run(&old, &new, &path, false, &mut Vec::new()).unwrap();
        assert_eq!(first.attributes_rotated, 3);
        assert!(first.is_clean());

        let mut out = Vec::new();
        let second = run(&old, &new, &path, false, &mut out).unwrap();
        assert_eq!(second.attributes_rotated, 0);
        assert_eq!(second.attributes_already_migrated, 3);
        let printed: RotationReport = serde_json::from_slice(&out).unwrap();
        assert_eq!(printed, second);

        let repo: JsonFileRepository<LoanApplication> = JsonFileRepository::open(&path).unwrap();
        assert!(verify(&repo, &new).unwrap().is_clean());
    }

    #[test]
    fn fail_fast_keeps_progress_before_the_failure() {
        let (old, new, stranger) = (fixtures::store(), fixtures::store(), fixtures::store());
        let (_dir, path) = fixtures::records_file(&old);

        let mut repo: JsonFileRepository<LoanApplication> = JsonFileRepository::open(&path).unwrap();
        let mut third = repo.records()[2].clone();
        third.set_ird_number(&stranger, Some("555555555")).unwrap();
        fieldstore::RecordRepository::save(&mut repo, &third).unwrap();
        repo.flush().unwrap();

        let err = run(&old, &new, &path, true, &mut Vec::new()).unwrap_err();
        assert!(err.to_string().contains(IRD_NUMBER));

        let repo: JsonFileRepository<LoanApplication> = JsonFileRepository::open(&path).unwrap();
        assert!(repo.records()[0].ird_number(&new, None).is_ok());
    }

    #[test]
    fn same_key_is_rejected() {
        let store = fixtures::store();
        let (_dir, path) = fixtures::records_file(&store);
        assert!(run(&store, &store, &path, false, &mut Vec::new()).is_err());
    }
}

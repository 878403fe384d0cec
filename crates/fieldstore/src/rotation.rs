//! Key rotation: re-encrypt every stored token from an old key to a new key.
//!
//! # Lifecycle
//!
//! 1. The operator provisions a new key and keeps the old one available.
//! 2. [`rotate_repository`] loads every record, decrypts each present token
//!    with the old key and re-encrypts it with the new key.
//! 3. Each record whose tokens changed is saved on its own. Rotation is not
//!    atomic across the set; a crash leaves a mix of old- and new-key tokens.
//! 4. Re-running with the same key pair is safe: a token that no longer opens
//!    under the old key but opens under the new key is counted as already
//!    migrated rather than failed.
//!
//! # Security invariants
//!
//! - Recovered plaintext lives only in a zeroizing buffer for the duration of
//!   one attribute and is never logged or reported.
//! - Failures are reported by record reference and attribute name only.

use common::protocol::{AttributeFailure, FailureReason, RotationReport};
use common::{DecryptFailure, FieldError};
use thiserror::Error;
use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::attribute::EncryptedAttribute;
use crate::record::Record;
use crate::repository::{RecordRepository, RepositoryError};
use crate::store::EncryptedFieldStore;

/// What to do when an attribute fails to rotate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Record the failure, skip the attribute, carry on.
    #[default]
    Continue,
    /// Stop at the first failure and return the partial report in the error.
    AbortOnFirstFailure,
}

/// Errors that end a rotation run early.
#[derive(Debug, Error)]
pub enum RotationError {
    /// [`FailurePolicy::AbortOnFirstFailure`] was set and an attribute failed.
    #[error("rotation aborted at record {} attribute {}", failure.record, failure.attribute)]
    Aborted {
        /// The failure that stopped the run.
        failure: AttributeFailure,
        /// Tallies up to and including the failure.
        report: Box<RotationReport>,
    },

    /// The record set could not be loaded.
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<RotationError> for FieldError {
    fn from(e: RotationError) -> Self {
        match e {
            RotationError::Aborted { failure, .. } => match failure.reason {
                FailureReason::Decryption(reason) => FieldError::Decryption(reason),
                FailureReason::Encryption => FieldError::Encryption(format!(
                    "re-encryption failed for {} {}",
                    failure.record, failure.attribute
                )),
                FailureReason::Persist => {
                    FieldError::Repository(format!("failed to persist {}", failure.record))
                }
            },
            RotationError::Repository(e) => e.into(),
        }
    }
}

/// Result of rotating one present attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeOutcome {
    /// Re-encrypted under the new key.
    Rotated,
    /// Already sealed under the new key; left untouched.
    AlreadyMigrated,
    /// Could not be rotated; left untouched.
    Failed(FailureReason),
}

/// Rotate a single attribute. Returns `None` when it holds no value.
pub fn rotate_attribute(
    attribute: &mut EncryptedAttribute,
    old: &EncryptedFieldStore,
    new: &EncryptedFieldStore,
) -> Option<AttributeOutcome> {
    let token = attribute.token()?.clone();

    let outcome = match old.decrypt(&token) {
        Ok(plaintext) => {
            let plaintext = Zeroizing::new(plaintext);
            match new.encrypt(&plaintext) {
                Ok(rotated) => {
                    attribute.replace_token(rotated);
                    AttributeOutcome::Rotated
                }
                Err(_) => AttributeOutcome::Failed(FailureReason::Encryption),
            }
        }
        Err(old_err) => {
            if new.decrypt(&token).is_ok() {
                AttributeOutcome::AlreadyMigrated
            } else {
                let reason = old_err
                    .decrypt_failure()
                    .unwrap_or(DecryptFailure::Malformed);
                AttributeOutcome::Failed(FailureReason::Decryption(reason))
            }
        }
    };
    Some(outcome)
}

/// Rotate every record in memory. Callers persist the records afterwards.
///
/// # Errors
///
/// Returns [`RotationError::Aborted`] only under
/// [`FailurePolicy::AbortOnFirstFailure`].
pub fn rotate<R: Record>(
    records: &mut [R],
    old: &EncryptedFieldStore,
    new: &EncryptedFieldStore,
    policy: FailurePolicy,
) -> Result<RotationReport, RotationError> {
    log_start(old, new, records.len());
    let mut report = RotationReport::default();
    for record in records.iter_mut() {
        if let Err(stop) = rotate_record(record, old, new, &mut report, policy) {
            return Err(aborted(stop.failure, report));
        }
    }
    log_summary(&report);
    Ok(report)
}

/// Rotate every record in `repo`, saving each record whose tokens changed.
///
/// A failed save is reported as a persist failure for each attribute that
/// had been rotated in that record; the record keeps its old tokens in storage.
///
/// # Errors
///
/// Returns [`RotationError::Repository`] if the records cannot be loaded, and
/// [`RotationError::Aborted`] under [`FailurePolicy::AbortOnFirstFailure`].
pub fn rotate_repository<R, Repo>(
    repo: &mut Repo,
    old: &EncryptedFieldStore,
    new: &EncryptedFieldStore,
    policy: FailurePolicy,
) -> Result<RotationReport, RotationError>
where
    R: Record + 'static,
    Repo: RecordRepository<R> + ?Sized,
{
    let mut records = repo.all()?;
    log_start(old, new, records.len());

    let mut report = RotationReport::default();
    for record in records.iter_mut() {
        let rotated = match rotate_record(record, old, new, &mut report, policy) {
            Ok(rotated) => rotated,
            Err(stop) => {
                // The record is not saved, so its earlier rotations never reach storage.
                report.attributes_rotated -= stop.rotated.len();
                return Err(aborted(stop.failure, report));
            }
        };
        if rotated.is_empty() {
            continue;
        }

        if let Err(e) = repo.save(record) {
            let record_ref = record.record_ref();
            warn!(record = %record_ref, error = %e, "failed to persist rotated record");
            report.attributes_rotated -= rotated.len();
            let mut first = None;
            for name in rotated {
                let failure = AttributeFailure {
                    record: record_ref.clone(),
                    attribute: name.to_owned(),
                    reason: FailureReason::Persist,
                };
                first.get_or_insert_with(|| failure.clone());
                report.push_failure(failure);
            }
            if let (FailurePolicy::AbortOnFirstFailure, Some(failure)) = (policy, first) {
                return Err(aborted(failure, report));
            }
        }
    }

    log_summary(&report);
    Ok(report)
}

/// A record abandoned under [`FailurePolicy::AbortOnFirstFailure`].
struct RecordAbort {
    failure: AttributeFailure,
    /// Attributes of the same record re-encrypted before the failure.
    rotated: Vec<&'static str>,
}

/// Rotate one record's attributes, returning the names that were re-encrypted.
fn rotate_record<R: Record>(
    record: &mut R,
    old: &EncryptedFieldStore,
    new: &EncryptedFieldStore,
    report: &mut RotationReport,
    policy: FailurePolicy,
) -> Result<Vec<&'static str>, RecordAbort> {
    report.records_processed += 1;
    let mut rotated = Vec::new();

    for &name in record.encrypted_attribute_names() {
        let Some(attribute) = record.encrypted_attribute_mut(name) else {
            continue;
        };
        match rotate_attribute(attribute, old, new) {
            None => {}
            Some(AttributeOutcome::Rotated) => {
                report.attributes_rotated += 1;
                rotated.push(name);
            }
            Some(AttributeOutcome::AlreadyMigrated) => {
                report.attributes_already_migrated += 1;
            }
            Some(AttributeOutcome::Failed(reason)) => {
                let failure = AttributeFailure {
                    record: record.record_ref(),
                    attribute: name.to_owned(),
                    reason,
                };
                warn!(
                    record = %failure.record,
                    attribute = name,
                    reason = ?reason,
                    "attribute rotation failed; skipping"
                );
                report.push_failure(failure.clone());
                if policy == FailurePolicy::AbortOnFirstFailure {
                    return Err(RecordAbort { failure, rotated });
                }
            }
        }
    }
    Ok(rotated)
}

fn aborted(failure: AttributeFailure, report: RotationReport) -> RotationError {
    warn!(record = %failure.record, attribute = %failure.attribute, "rotation aborted");
    RotationError::Aborted {
        failure,
        report: Box::new(report),
    }
}

fn log_start(old: &EncryptedFieldStore, new: &EncryptedFieldStore, records: usize) {
    info!(
        old_key_id = %old.key_id(),
        new_key_id = %new.key_id(),
        records,
        "starting key rotation"
    );
}

fn log_summary(report: &RotationReport) {
    info!(
        records = report.records_processed,
        rotated = report.attributes_rotated,
        already_migrated = report.attributes_already_migrated,
        failed = report.attributes_failed,
        "key rotation finished"
    );
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use common::RecordRef;

    use super::*;
    use crate::key::EncryptionKey;
    use crate::record::loan::{CUSTOMER_DATE_OF_BIRTH, IRD_NUMBER, NZBN};
    use crate::record::{LoanApplication, LoanKind};
    use crate::repository::{InMemoryRepository, MockRecordRepository};
    use crate::token::EncryptedToken;

    fn store() -> EncryptedFieldStore {
        EncryptedFieldStore::new(EncryptionKey::generate())
    }

    fn populated(s: &EncryptedFieldStore, kind: LoanKind, ird: &str) -> LoanApplication {
        let mut app = LoanApplication::new(kind, "john@example.com", "John", "Smith", 10_000);
        app.set_ird_number(s, Some(ird)).unwrap();
        app.set_customer_date_of_birth(s, NaiveDate::from_ymd_opt(1985, 6, 15))
            .unwrap();
        app
    }

    #[test]
    fn rotates_every_present_attribute() {
        let (old, new) = (store(), store());
        let mut marketing = populated(&old, LoanKind::Marketing, "123456789");
        marketing.set_nzbn(&old, Some("9429041234567")).unwrap();
        let mut records = vec![marketing, populated(&old, LoanKind::Deposit, "987654321")];

        let report = rotate(&mut records, &old, &new, FailurePolicy::Continue).unwrap();
        assert_eq!(report.records_processed, 2);
        assert_eq!(report.attributes_rotated, 5);
        assert_eq!(report.attributes_failed, 0);

        assert_eq!(
            records[0].ird_number(&new, None).unwrap().as_deref(),
            Some("123456789")
        );
        assert_eq!(
            records[0].nzbn(&new, None).unwrap().as_deref(),
            Some("9429041234567")
        );
        assert!(records[1].ird_number(&old, None).is_err());
    }

    #[test]
    fn absent_values_are_not_counted() {
        let (old, new) = (store(), store());
        let mut records = vec![LoanApplication::new(LoanKind::Renovation, "a@b.nz", "A", "B", 1)];
        let report = rotate(&mut records, &old, &new, FailurePolicy::Continue).unwrap();
        assert_eq!(report.records_processed, 1);
        assert_eq!(report.attributes_rotated, 0);
        assert_eq!(report.attributes_already_migrated, 0);
    }

    #[test]
    fn second_run_reports_already_migrated() {
        let (old, new) = (store(), store());
        let mut records = vec![
            populated(&old, LoanKind::Deposit, "123456789"),
            populated(&old, LoanKind::Renovation, "87654321"),
        ];
        rotate(&mut records, &old, &new, FailurePolicy::Continue).unwrap();

        let again = rotate(&mut records, &old, &new, FailurePolicy::Continue).unwrap();
        assert_eq!(again.attributes_rotated, 0);
        assert_eq!(again.attributes_already_migrated, 4);
        assert_eq!(again.attributes_failed, 0);
        assert!(again.is_clean());
    }

    #[test]
    fn corrupted_token_is_isolated() {
        let (old, new) = (store(), store());
        let mut records: Vec<_> = (0..5)
            .map(|_| {
                let mut app = LoanApplication::new(LoanKind::Deposit, "x@y.nz", "X", "Y", 1);
                app.set_ird_number(&old, Some("123456789")).unwrap();
                app
            })
            .collect();
        let mut bytes = records[2]
            .encrypted_attribute(IRD_NUMBER)
            .and_then(|a| a.token())
            .unwrap()
            .clone()
            .into_bytes();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        *records[2].encrypted_attribute_mut(IRD_NUMBER).unwrap() =
            EncryptedAttribute::from_token(Some(EncryptedToken::from_bytes(bytes)));

        let report = rotate(&mut records, &old, &new, FailurePolicy::Continue).unwrap();
        assert_eq!(report.records_processed, 5);
        assert_eq!(report.attributes_rotated, 4);
        assert_eq!(report.attributes_failed, 1);
        assert_eq!(report.failures[0].record, records[2].record_ref());
        assert_eq!(
            report.failures[0].reason,
            FailureReason::Decryption(DecryptFailure::Authentication)
        );
    }

    #[test]
    fn token_under_unrelated_key_fails() {
        let (old, new, stranger) = (store(), store(), store());
        let mut records = vec![populated(&stranger, LoanKind::Deposit, "123456789")];
        let report = rotate(&mut records, &old, &new, FailurePolicy::Continue).unwrap();
        assert_eq!(report.attributes_failed, 2);
        assert_eq!(
            report.failures[0].reason,
            FailureReason::Decryption(DecryptFailure::KeyMismatch)
        );
    }

    #[test]
    fn abort_policy_stops_at_first_failure() {
        let (old, new, stranger) = (store(), store(), store());
        let mut records = vec![
            populated(&old, LoanKind::Deposit, "111111111"),
            populated(&stranger, LoanKind::Deposit, "222222222"),
            populated(&old, LoanKind::Deposit, "333333333"),
        ];
        let err = rotate(&mut records, &old, &new, FailurePolicy::AbortOnFirstFailure).unwrap_err();
        match err {
            RotationError::Aborted { failure, report } => {
                assert_eq!(failure.record, records[1].record_ref());
                assert_eq!(failure.attribute, IRD_NUMBER);
                assert_eq!(report.records_processed, 2);
                assert_eq!(report.attributes_rotated, 2);
                assert_eq!(report.attributes_failed, 1);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(records[2].ird_number(&old, None).is_ok());
    }

    #[test]
    fn repository_rotation_saves_only_changed_records() {
        let (old, new) = (store(), store());
        let rotated_app = populated(&old, LoanKind::Marketing, "123456789");
        let empty_app = LoanApplication::new(LoanKind::Deposit, "e@f.nz", "E", "F", 1);
        let records = vec![rotated_app.clone(), empty_app];

        let mut repo = MockRecordRepository::<LoanApplication>::new();
        repo.expect_all().returning(move || Ok(records.clone()));
        let target = rotated_app.record_ref();
        repo.expect_save()
            .withf(move |r: &LoanApplication| r.record_ref() == target)
            .times(1)
            .returning(|_| Ok(()));

        let report = rotate_repository(&mut repo, &old, &new, FailurePolicy::Continue).unwrap();
        assert_eq!(report.records_processed, 2);
        assert_eq!(report.attributes_rotated, 2);
    }

    #[test]
    fn persist_failure_moves_rotated_attributes_to_failed() {
        let (old, new) = (store(), store());
        let records = vec![populated(&old, LoanKind::Deposit, "123456789")];

        let mut repo = MockRecordRepository::<LoanApplication>::new();
        repo.expect_all().returning(move || Ok(records.clone()));
        repo.expect_save()
            .returning(|r| Err(RepositoryError::NotFound(r.record_ref())));

        let report = rotate_repository(&mut repo, &old, &new, FailurePolicy::Continue).unwrap();
        assert_eq!(report.attributes_rotated, 0);
        assert_eq!(report.attributes_failed, 2);
        assert!(report
            .failures
            .iter()
            .all(|f| f.reason == FailureReason::Persist));
        let names: Vec<_> = report.failures.iter().map(|f| f.attribute.as_str()).collect();
        assert_eq!(names, vec![IRD_NUMBER, CUSTOMER_DATE_OF_BIRTH]);
    }

    #[test]
    fn repository_rotation_is_rerunnable() {
        let (old, new) = (store(), store());
        let mut repo = InMemoryRepository::from_records(vec![
            populated(&old, LoanKind::Marketing, "123456789"),
            populated(&old, LoanKind::Deposit, "87654321"),
        ]);

        let first = rotate_repository(&mut repo, &old, &new, FailurePolicy::Continue).unwrap();
        assert_eq!(first.attributes_rotated, 4);

        let second = rotate_repository(&mut repo, &old, &new, FailurePolicy::Continue).unwrap();
        assert_eq!(second.attributes_rotated, 0);
        assert_eq!(second.attributes_already_migrated, 4);
        assert!(second.is_clean());
        assert!(repo.records()[0].nzbn(&new, None).unwrap().is_none());
    }

    #[test]
    fn abort_mid_record_does_not_count_unsaved_rotations() {
        let (old, new, stranger) = (store(), store(), store());
        let mut app = LoanApplication::new(LoanKind::Deposit, "j@k.nz", "J", "K", 1);
        app.set_ird_number(&old, Some("123456789")).unwrap();
        app.set_customer_date_of_birth(&stranger, NaiveDate::from_ymd_opt(1985, 6, 15))
            .unwrap();
        let stored_ird = app.encrypted_attribute(IRD_NUMBER).unwrap().clone();
        let mut repo = InMemoryRepository::from_records(vec![app]);

        let err = rotate_repository(&mut repo, &old, &new, FailurePolicy::AbortOnFirstFailure)
            .unwrap_err();
        let RotationError::Aborted { failure, report } = err else {
            panic!("expected an aborted rotation");
        };
        assert_eq!(failure.attribute, CUSTOMER_DATE_OF_BIRTH);
        assert_eq!(report.attributes_rotated, 0);
        assert_eq!(report.attributes_failed, 1);

        let saved = &repo.records()[0];
        assert_eq!(saved.encrypted_attribute(IRD_NUMBER), Some(&stored_ird));
        assert_eq!(
            saved.ird_number(&old, None).unwrap().as_deref(),
            Some("123456789")
        );
    }

    #[test]
    fn load_failure_is_a_repository_error() {
        let (old, new) = (store(), store());
        let mut repo = MockRecordRepository::<LoanApplication>::new();
        repo.expect_all()
            .returning(|| Err(RepositoryError::NotFound(RecordRef::new("all"))));
        let err = rotate_repository(&mut repo, &old, &new, FailurePolicy::Continue).unwrap_err();
        assert!(matches!(err, RotationError::Repository(_)));
        assert_eq!(FieldError::from(err).code(), "repository_error");
    }

    #[test]
    fn marketing_nzbn_is_rotated_too() {
        let (old, new) = (store(), store());
        let mut app = LoanApplication::new(LoanKind::Marketing, "m@n.nz", "M", "N", 1);
        app.set_nzbn(&old, Some("9429041234567")).unwrap();
        let mut records = vec![app];
        let report = rotate(&mut records, &old, &new, FailurePolicy::Continue).unwrap();
        assert_eq!(report.attributes_rotated, 1);
        assert!(records[0].encrypted_attribute(NZBN).is_some());
    }
}

//! One-off encryption of legacy plaintext values, and post-rotation verification.

use common::protocol::{AttributeFailure, FailureReason, MigrationReport, VerificationReport};
use common::{DecryptFailure, FieldError};
use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::record::{LegacyPlaintext, Record};
use crate::repository::RecordRepository;
use crate::store::EncryptedFieldStore;

/// Encrypt every legacy plaintext value whose attribute has no token yet.
///
/// The legacy plaintext is cleared once its token is in place. Attributes that
/// already hold a token are left alone, so the pass can be re-run. With
/// `dry_run` set nothing is saved and the report counts what would change.
///
/// # Errors
///
/// Returns [`FieldError::Repository`] if the records cannot be loaded.
/// Per-attribute and per-record failures are collected in the report.
pub fn encrypt_legacy<R, Repo>(
    repo: &mut Repo,
    store: &EncryptedFieldStore,
    dry_run: bool,
) -> Result<MigrationReport, FieldError>
where
    R: LegacyPlaintext + 'static,
    Repo: RecordRepository<R> + ?Sized,
{
    let records = repo.all()?;
    info!(records = records.len(), dry_run, key_id = %store.key_id(), "encrypting legacy plaintext");

    let mut report = MigrationReport {
        dry_run,
        ..MigrationReport::default()
    };

    for mut record in records {
        report.records_scanned += 1;
        let mut encrypted = Vec::new();

        for &name in record.encrypted_attribute_names() {
            let has_token = record
                .encrypted_attribute(name)
                .map_or(true, |attr| !attr.is_empty());
            if has_token {
                continue;
            }
            let Some(legacy) = record.legacy_plaintext(name).map(Zeroizing::new) else {
                continue;
            };
            let Some(attribute) = record.encrypted_attribute_mut(name) else {
                continue;
            };
            match attribute.set(store, Some(legacy.as_str())) {
                Ok(()) => {
                    record.clear_legacy_plaintext(name);
                    encrypted.push(name);
                }
                Err(e) => {
                    warn!(record = %record.record_ref(), attribute = name, error = %e, "legacy value not encrypted");
                    report.failures.push(AttributeFailure {
                        record: record.record_ref(),
                        attribute: name.to_owned(),
                        reason: FailureReason::Encryption,
                    });
                }
            }
        }

        if encrypted.is_empty() {
            continue;
        }

        if !dry_run {
            if let Err(e) = repo.save(&record) {
                warn!(record = %record.record_ref(), error = %e, "failed to persist migrated record");
                for name in encrypted {
                    report.failures.push(AttributeFailure {
                        record: record.record_ref(),
                        attribute: name.to_owned(),
                        reason: FailureReason::Persist,
                    });
                }
                continue;
            }
        }

        report.records_encrypted += 1;
        report.attributes_encrypted += encrypted.len();
        *report.by_kind.entry(record.kind().to_owned()).or_default() += 1;
    }

    let verb = if dry_run { "would encrypt" } else { "encrypted" };
    for (kind, count) in &report.by_kind {
        info!(kind = %kind, records = count, dry_run, "legacy values encrypted");
        report.summary.push(format!("{kind}: {verb} {count} record(s)"));
    }
    report.summary.push(if dry_run {
        format!(
            "DRY RUN: would encrypt {} record(s); run without --dry-run to apply",
            report.records_encrypted
        )
    } else {
        format!("encrypted {} record(s)", report.records_encrypted)
    });
    info!(
        scanned = report.records_scanned,
        records = report.records_encrypted,
        attributes = report.attributes_encrypted,
        failed = report.failures.len(),
        dry_run,
        "legacy encryption finished"
    );
    Ok(report)
}

/// Check that every present token decrypts under `store`'s key.
///
/// Run after a rotation to confirm the old key can be retired.
///
/// # Errors
///
/// Returns [`FieldError::Repository`] if the records cannot be loaded.
pub fn verify<R, Repo>(repo: &Repo, store: &EncryptedFieldStore) -> Result<VerificationReport, FieldError>
where
    R: Record + 'static,
    Repo: RecordRepository<R> + ?Sized,
{
    let records = repo.all()?;
    let mut report = VerificationReport::default();

    for record in &records {
        report.records_scanned += 1;
        for &name in record.encrypted_attribute_names() {
            let Some(token) = record.encrypted_attribute(name).and_then(|a| a.token()) else {
                continue;
            };
            match store.decrypt(token) {
                Ok(plaintext) => {
                    drop(Zeroizing::new(plaintext));
                    report.attributes_verified += 1;
                }
                Err(e) => {
                    let reason = FailureReason::Decryption(
                        e.decrypt_failure().unwrap_or(DecryptFailure::Malformed),
                    );
                    warn!(record = %record.record_ref(), attribute = name, error = %e, "token does not decrypt under active key");
                    report.failures.push(AttributeFailure {
                        record: record.record_ref(),
                        attribute: name.to_owned(),
                        reason,
                    });
                }
            }
        }
    }

    info!(
        key_id = %store.key_id(),
        scanned = report.records_scanned,
        verified = report.attributes_verified,
        failed = report.failures.len(),
        "verification finished"
    );
    Ok(report)
}

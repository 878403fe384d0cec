//! Searching on encrypted attributes.
//!
//! Storage cannot match randomised tokens, so the only supported strategy is
//! to narrow the candidate set by a queryable attribute and then compare the
//! decrypted value of each candidate in application code.

use common::FieldError;
use tracing::warn;

use crate::attribute::{AuditScope, DecryptAudit};
use crate::record::Record;
use crate::repository::RecordRepository;
use crate::store::EncryptedFieldStore;

/// Fetch candidates by a queryable attribute, then keep those whose encrypted
/// attribute decrypts to exactly `expected_plaintext`.
///
/// Candidate order is preserved. Candidates that lack the attribute, hold no
/// value, or whose token fails to decrypt are treated as non-matches; the
/// decrypt failure is logged without the value. Each candidate decrypt is
/// reported to `audit` when one is given.
///
/// # Errors
///
/// Returns [`FieldError::Repository`] if the candidate query fails, including
/// when `secondary_name` is itself an encrypted attribute.
pub fn find_by_secondary_then_filter<R, Repo>(
    repo: &Repo,
    store: &EncryptedFieldStore,
    secondary_name: &str,
    secondary_value: &str,
    encrypted_name: &str,
    expected_plaintext: &str,
    audit: Option<&dyn DecryptAudit>,
) -> Result<Vec<R>, FieldError>
where
    R: Record + 'static,
    Repo: RecordRepository<R> + ?Sized,
{
    let candidates = repo.filter_by(secondary_name, secondary_value)?;
    let candidate_count = candidates.len();

    let matches: Vec<R> = candidates
        .into_iter()
        .filter(|record| {
            let Some(attribute) = record.encrypted_attribute(encrypted_name) else {
                return false;
            };
            let record_ref = record.record_ref();
            let scope = audit.map(|hook| AuditScope {
                hook,
                record: &record_ref,
                attribute: encrypted_name,
            });
            match attribute.get(store, scope) {
                Ok(plaintext) => plaintext.as_deref() == Some(expected_plaintext),
                Err(e) => {
                    warn!(
                        record = %record_ref,
                        attribute = encrypted_name,
                        error = %e,
                        "skipping candidate that failed to decrypt"
                    );
                    false
                }
            }
        })
        .collect();

    tracing::debug!(
        attribute = encrypted_name,
        candidates = candidate_count,
        matches = matches.len(),
        "filtered candidates on encrypted attribute"
    );
    Ok(matches)
}

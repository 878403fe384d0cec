//! Transparent accessors over a single encrypted column, plus the decrypt audit hook.
//!
//! An [`EncryptedAttribute`] owns the physical token of one logical attribute.
//! Records expose typed getters/setters that delegate here, so callers only
//! ever see plaintext values and the token stays inside the record's own
//! persistence layer.
//!
//! Absent values never reach the cipher: `None` (or an empty string) on the
//! way in stores no token, and no token on the way out reads as `None`
//! without invoking decrypt or the audit hook.

use chrono::NaiveDate;
use common::{DecryptFailure, FieldError, RecordRef};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::store::EncryptedFieldStore;
use crate::token::EncryptedToken;

/// Result of one decrypt, as reported to a [`DecryptAudit`] hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecryptOutcome {
    /// The token decrypted successfully.
    Decrypted,
    /// The token was rejected.
    Failed(DecryptFailure),
}

/// A decrypt that just happened on a record attribute.
#[derive(Debug, Clone, Copy)]
pub struct DecryptEvent<'a> {
    /// Record the attribute belongs to.
    pub record: &'a RecordRef,
    /// Name of the encrypted attribute.
    pub attribute: &'a str,
    /// Whether decryption succeeded.
    pub outcome: DecryptOutcome,
}

/// Synchronous callback invoked once per decrypt of a present value.
pub trait DecryptAudit: Send + Sync {
    /// Observe a single decrypt. Must not block for long; it runs inline.
    fn on_decrypt(&self, event: &DecryptEvent<'_>);
}

impl<F> DecryptAudit for F
where
    F: Fn(&DecryptEvent<'_>) + Send + Sync,
{
    fn on_decrypt(&self, event: &DecryptEvent<'_>) {
        self(event)
    }
}

/// Audit hook that emits a structured `tracing` event per decrypt.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAudit;

impl DecryptAudit for TracingAudit {
    fn on_decrypt(&self, event: &DecryptEvent<'_>) {
        match event.outcome {
            DecryptOutcome::Decrypted => tracing::info!(
                target: "fieldstore::audit",
                record = %event.record,
                attribute = event.attribute,
                "sensitive attribute decrypted"
            ),
            DecryptOutcome::Failed(reason) => tracing::warn!(
                target: "fieldstore::audit",
                record = %event.record,
                attribute = event.attribute,
                reason = %reason,
                "sensitive attribute decrypt failed"
            ),
        }
    }
}

/// Who is reading, for the audit hook.
#[derive(Clone, Copy)]
pub struct AuditScope<'a> {
    /// Hook to notify.
    pub hook: &'a dyn DecryptAudit,
    /// Record being read.
    pub record: &'a RecordRef,
    /// Attribute being read.
    pub attribute: &'a str,
}

/// Physical storage of one encrypted logical attribute.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncryptedAttribute {
    token: Option<EncryptedToken>,
}

impl EncryptedAttribute {
    /// An attribute with no value.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Wrap a token loaded from storage (`None` for a NULL column).
    pub fn from_token(token: Option<EncryptedToken>) -> Self {
        Self { token }
    }

    /// Returns `true` when no value is stored.
    pub fn is_empty(&self) -> bool {
        self.token.is_none()
    }

    /// The stored token, for the record's own persistence and for rotation.
    pub fn token(&self) -> Option<&EncryptedToken> {
        self.token.as_ref()
    }

    /// Replace the stored token. Only rotation should call this directly.
    pub(crate) fn replace_token(&mut self, token: EncryptedToken) {
        self.token = Some(token);
    }

    /// Set the logical value. `None` and `""` clear the attribute.
    ///
    /// # Errors
    ///
    /// Returns [`FieldError::Encryption`] if the value cannot be encrypted; the
    /// previous token is kept in that case.
    pub fn set(
        &mut self,
        store: &EncryptedFieldStore,
        value: Option<&str>,
    ) -> Result<(), FieldError> {
        self.token = match value {
            Some(v) if !v.is_empty() => Some(store.encrypt(v)?),
            _ => None,
        };
        Ok(())
    }

    /// Set a date value, normalised to `YYYY-MM-DD`.
    ///
    /// # Errors
    ///
    /// See [`EncryptedAttribute::set`].
    pub fn set_date(
        &mut self,
        store: &EncryptedFieldStore,
        value: Option<NaiveDate>,
    ) -> Result<(), FieldError> {
        self.token = value.map(|d| store.encrypt_date(d)).transpose()?;
        Ok(())
    }

    /// Read the logical value, decrypting if a token is present.
    ///
    /// # Errors
    ///
    /// Returns [`FieldError::Decryption`] if the token is rejected.
    pub fn get(
        &self,
        store: &EncryptedFieldStore,
        audit: Option<AuditScope<'_>>,
    ) -> Result<Option<String>, FieldError> {
        self.read(audit, |token| store.decrypt(token))
    }

    /// Read a date value.
    ///
    /// # Errors
    ///
    /// Returns [`FieldError::Decryption`] if the token is rejected or does not
    /// hold a date.
    pub fn get_date(
        &self,
        store: &EncryptedFieldStore,
        audit: Option<AuditScope<'_>>,
    ) -> Result<Option<NaiveDate>, FieldError> {
        self.read(audit, |token| store.decrypt_date(token))
    }

    fn read<T>(
        &self,
        audit: Option<AuditScope<'_>>,
        decrypt: impl FnOnce(&EncryptedToken) -> Result<T, FieldError>,
    ) -> Result<Option<T>, FieldError> {
        let Some(token) = &self.token else {
            return Ok(None);
        };

        let result = decrypt(token);

        if let Some(scope) = audit {
            let outcome = match &result {
                Ok(_) => DecryptOutcome::Decrypted,
                Err(e) => DecryptOutcome::Failed(
                    e.decrypt_failure().unwrap_or(DecryptFailure::Malformed),
                ),
            };
            scope.hook.on_decrypt(&DecryptEvent {
                record: scope.record,
                attribute: scope.attribute,
                outcome,
            });
        }

        match result {
            Ok(v) => Ok(Some(v)),
            Err(e) => {
                warn!(error = %e, "failed to decrypt field");
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for EncryptedAttribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.token {
            Some(t) => write!(f, "EncryptedAttribute({t:?})"),
            None => f.write_str("EncryptedAttribute(None)"),
        }
    }
}

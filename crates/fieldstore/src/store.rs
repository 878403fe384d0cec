//! [`EncryptedFieldStore`]: the only component that holds the active key.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use common::{DecryptFailure, FieldError};

use crate::crypto::cipher::{self, CipherError, SealedToken};
use crate::key::{EncryptionKey, KeyError, KeyId};
use crate::token::EncryptedToken;

/// Canonical string form of dates before encryption (ISO-8601 calendar date).
pub const DATE_FORMAT: &str = "%Y-%m-%d";

impl From<KeyError> for FieldError {
    fn from(e: KeyError) -> Self {
        FieldError::Configuration(e.to_string())
    }
}

/// Encrypts and decrypts scalar field values under a single active key.
///
/// Construct once at startup with a resolved key and pass it explicitly to
/// whatever needs encryption. Clones share the same key; the key never
/// changes for the lifetime of a store, so concurrent use needs no locking.
#[derive(Clone, Debug)]
pub struct EncryptedFieldStore {
    key: Arc<EncryptionKey>,
}

impl EncryptedFieldStore {
    /// Create a store around an already resolved key.
    pub fn new(key: EncryptionKey) -> Self {
        Self { key: Arc::new(key) }
    }

    /// Create a store from a base64-encoded key.
    ///
    /// # Errors
    ///
    /// Returns [`FieldError::Configuration`] if the key cannot be parsed.
    pub fn from_base64(encoded: &str) -> Result<Self, FieldError> {
        Ok(Self::new(EncryptionKey::from_base64(encoded)?))
    }

    /// Create a store from the key held in environment variable `var`.
    ///
    /// # Errors
    ///
    /// Returns [`FieldError::Configuration`] if the variable is unset, empty or
    /// does not hold a valid key.
    pub fn from_env(var: &str) -> Result<Self, FieldError> {
        match std::env::var(var) {
            Ok(v) if !v.trim().is_empty() => Self::from_base64(&v),
            _ => Err(FieldError::Configuration(format!(
                "{var} is not set; run `lumi-keytool generate-key`"
            ))),
        }
    }

    /// Public id of the active key.
    pub fn key_id(&self) -> KeyId {
        self.key.id()
    }

    /// Encrypt a plaintext string under the active key.
    ///
    /// Every call draws a fresh nonce, so equal plaintexts give unequal tokens.
    ///
    /// # Errors
    ///
    /// Returns [`FieldError::Encryption`] if the cipher rejects the input.
    pub fn encrypt(&self, plaintext: &str) -> Result<EncryptedToken, FieldError> {
        let issued_at = u64::try_from(Utc::now().timestamp()).unwrap_or(0);
        let sealed = cipher::seal(
            plaintext.as_bytes(),
            self.key.expose(),
            self.key.id().0,
            issued_at,
        )
        .map_err(|e| FieldError::Encryption(e.to_string()))?;
        Ok(EncryptedToken::from_bytes(sealed.to_bytes()))
    }

    /// Authenticate and decrypt a token under the active key.
    ///
    /// Absent values must be handled by the caller; this is only for tokens
    /// that exist.
    ///
    /// # Errors
    ///
    /// Returns [`FieldError::Decryption`] with the reason the token was rejected.
    pub fn decrypt(&self, token: impl AsRef<[u8]>) -> Result<String, FieldError> {
        let sealed = SealedToken::from_bytes(token.as_ref()).map_err(|e| match e {
            CipherError::UnsupportedVersion(_) => {
                FieldError::Decryption(DecryptFailure::UnsupportedVersion)
            }
            _ => FieldError::Decryption(DecryptFailure::Malformed),
        })?;

        if sealed.key_id != self.key.id().0 {
            return Err(FieldError::Decryption(DecryptFailure::KeyMismatch));
        }

        let plaintext = cipher::open(&sealed, self.key.expose())
            .map_err(|_| FieldError::Decryption(DecryptFailure::Authentication))?;

        String::from_utf8(plaintext).map_err(|_| FieldError::Decryption(DecryptFailure::InvalidUtf8))
    }

    /// Encrypt a date after normalising it to `YYYY-MM-DD`.
    ///
    /// # Errors
    ///
    /// See [`EncryptedFieldStore::encrypt`].
    pub fn encrypt_date(&self, date: NaiveDate) -> Result<EncryptedToken, FieldError> {
        self.encrypt(&date.format(DATE_FORMAT).to_string())
    }

    /// Decrypt a token holding a `YYYY-MM-DD` date.
    ///
    /// # Errors
    ///
    /// Returns [`FieldError::Decryption`] if the token is rejected, or with
    /// [`DecryptFailure::UnexpectedValue`] if the plaintext is not a date.
    pub fn decrypt_date(&self, token: impl AsRef<[u8]>) -> Result<NaiveDate, FieldError> {
        let text = self.decrypt(token)?;
        NaiveDate::parse_from_str(&text, DATE_FORMAT)
            .map_err(|_| FieldError::Decryption(DecryptFailure::UnexpectedValue))
    }
}

//! Common error types shared across crates.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a token could not be decrypted.
///
/// Every variant describes the token, never its contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecryptFailure {
    /// The token is truncated or its header cannot be parsed.
    Malformed,
    /// The token carries a format version this build does not understand.
    UnsupportedVersion,
    /// The token was sealed under a different key.
    KeyMismatch,
    /// The authentication tag did not verify (tampered or corrupted data).
    Authentication,
    /// The decrypted bytes are not valid UTF-8.
    InvalidUtf8,
    /// The decrypted text does not parse as the expected type (e.g. a date).
    UnexpectedValue,
}

impl std::fmt::Display for DecryptFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            DecryptFailure::Malformed => "malformed token",
            DecryptFailure::UnsupportedVersion => "unsupported token version",
            DecryptFailure::KeyMismatch => "token was sealed under a different key",
            DecryptFailure::Authentication => "token failed authentication",
            DecryptFailure::InvalidUtf8 => "decrypted value is not valid UTF-8",
            DecryptFailure::UnexpectedValue => "decrypted value has an unexpected type",
        })
    }
}

/// Top-level error type for field encryption.
///
/// Variants map to the categories operators and callers need to tell apart:
/// - [`FieldError::Configuration`] → fatal at startup, never retried
/// - [`FieldError::Encryption`] → input rejected by the cipher
/// - [`FieldError::Decryption`] → wrong key, corrupted or malformed token
/// - [`FieldError::Repository`] → record storage failed
///
/// Messages never contain plaintext or key material.
#[derive(Debug, Error)]
pub enum FieldError {
    /// No usable key was provided, or the key could not be parsed.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The plaintext was rejected by the cipher.
    #[error("encryption error: {0}")]
    Encryption(String),

    /// The token could not be authenticated or decoded.
    #[error("decryption error: {0}")]
    Decryption(DecryptFailure),

    /// Loading or persisting records failed.
    #[error("repository error: {0}")]
    Repository(String),
}

impl FieldError {
    /// Returns a stable, machine-readable code for this error category.
    pub fn code(&self) -> &'static str {
        match self {
            FieldError::Configuration(_) => "configuration_error",
            FieldError::Encryption(_) => "encryption_error",
            FieldError::Decryption(_) => "decryption_error",
            FieldError::Repository(_) => "repository_error",
        }
    }

    /// Returns the decrypt failure reason, if this is a decryption error.
    pub fn decrypt_failure(&self) -> Option<DecryptFailure> {
        match self {
            FieldError::Decryption(reason) => Some(*reason),
            _ => None,
        }
    }
}

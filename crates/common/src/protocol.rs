//! Report types produced by the batch operations.
//!
//! These types are serialised as JSON on stdout by `lumi-keytool` so operators
//! can archive or diff them. They identify records and attributes by reference
//! only; no report ever carries plaintext or key material.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::DecryptFailure;

// ---------------------------------------------------------------------------
// Record references
// ---------------------------------------------------------------------------

/// Opaque, non-sensitive identifier of a stored record (e.g. an application UUID).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordRef(pub String);

impl RecordRef {
    /// Construct a [`RecordRef`] from anything displayable.
    pub fn new(id: impl std::fmt::Display) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for RecordRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

/// Why a single attribute could not be processed by a batch operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The stored token could not be decrypted.
    Decryption(DecryptFailure),
    /// The recovered plaintext could not be re-encrypted.
    Encryption,
    /// The updated record could not be written back.
    Persist,
}

/// A single failed attribute, identified by record and attribute name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeFailure {
    /// Record the attribute belongs to.
    pub record: RecordRef,
    /// Name of the encrypted attribute.
    pub attribute: String,
    /// Why processing failed.
    pub reason: FailureReason,
}

// ---------------------------------------------------------------------------
// Rotation
// ---------------------------------------------------------------------------

/// Outcome of rotating a batch of records from an old key to a new key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationReport {
    /// Number of records attempted.
    pub records_processed: usize,
    /// Attributes re-encrypted under the new key.
    pub attributes_rotated: usize,
    /// Attributes that already decrypt under the new key.
    pub attributes_already_migrated: usize,
    /// Attributes that could not be rotated.
    pub attributes_failed: usize,
    /// One entry per failed attribute.
    pub failures: Vec<AttributeFailure>,
}

impl RotationReport {
    /// Returns `true` when no attribute failed.
    pub fn is_clean(&self) -> bool {
        self.attributes_failed == 0
    }

    /// Record a failed attribute and bump the failure tally.
    pub fn push_failure(&mut self, failure: AttributeFailure) {
        self.attributes_failed += 1;
        self.failures.push(failure);
    }
}

// ---------------------------------------------------------------------------
// Legacy plaintext migration
// ---------------------------------------------------------------------------

/// Outcome of encrypting legacy plaintext values that have no token yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationReport {
    /// Whether changes were only reported, not persisted.
    pub dry_run: bool,
    /// Number of records inspected.
    pub records_scanned: usize,
    /// Records that needed (or, in dry-run, would need) encryption.
    pub records_encrypted: usize,
    /// Attributes encrypted (or that would be).
    pub attributes_encrypted: usize,
    /// Records encrypted, grouped by record kind.
    pub by_kind: BTreeMap<String, usize>,
    /// One entry per attribute that could not be migrated.
    pub failures: Vec<AttributeFailure>,
    /// Operator-facing lines: one per kind, then the total.
    #[serde(default)]
    pub summary: Vec<String>,
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

/// Outcome of checking that every stored token decrypts under the active key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    /// Number of records inspected.
    pub records_scanned: usize,
    /// Attributes that decrypted successfully.
    pub attributes_verified: usize,
    /// One entry per attribute that did not decrypt.
    pub failures: Vec<AttributeFailure>,
}

impl VerificationReport {
    /// Returns `true` when every present token decrypted.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

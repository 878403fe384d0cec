//! Records that own encrypted attributes alongside plain, queryable ones.
//!
//! # Module invariants
//!
//! - Encrypted attributes are never queryable. A repository filter on a name
//!   listed in [`Record::ENCRYPTED_ATTRIBUTES`] is rejected before any record
//!   is touched.
//! - Tokens are reachable only through [`Record::encrypted_attribute`] and
//!   [`Record::encrypted_attribute_mut`]; typed accessors on concrete records
//!   are the user-facing surface.

pub mod loan;

pub use loan::{ApplicationStatus, LoanApplication, LoanKind};

use common::RecordRef;

use crate::attribute::EncryptedAttribute;

/// An entity persisted with zero or more encrypted attributes.
pub trait Record {
    /// Every encrypted attribute name any record of this type may carry.
    const ENCRYPTED_ATTRIBUTES: &'static [&'static str];

    /// Non-sensitive identifier used in reports, logs and audit events.
    fn record_ref(&self) -> RecordRef;

    /// Short label grouping records in reports (e.g. `"marketing"`).
    fn kind(&self) -> &'static str;

    /// Encrypted attributes this particular record carries.
    ///
    /// Defaults to all of [`Record::ENCRYPTED_ATTRIBUTES`].
    fn encrypted_attribute_names(&self) -> &'static [&'static str] {
        Self::ENCRYPTED_ATTRIBUTES
    }

    /// Borrow the physical storage of an encrypted attribute.
    fn encrypted_attribute(&self, name: &str) -> Option<&EncryptedAttribute>;

    /// Mutably borrow the physical storage of an encrypted attribute.
    fn encrypted_attribute_mut(&mut self, name: &str) -> Option<&mut EncryptedAttribute>;

    /// Equality test on a queryable attribute.
    ///
    /// Returns `None` when `attribute` is not a queryable attribute of this record.
    fn queryable_matches(&self, attribute: &str, value: &str) -> Option<bool>;
}

/// Returns `true` if `name` is an encrypted attribute of record type `R`.
pub fn is_encrypted_attribute<R: Record>(name: &str) -> bool {
    R::ENCRYPTED_ATTRIBUTES.contains(&name)
}

/// Records that may still hold sensitive values in legacy plaintext columns.
pub trait LegacyPlaintext: Record {
    /// The legacy plaintext for `attribute`, if one is stored.
    fn legacy_plaintext(&self, attribute: &str) -> Option<String>;

    /// Drop the legacy plaintext for `attribute` once it has been encrypted.
    fn clear_legacy_plaintext(&mut self, attribute: &str);
}

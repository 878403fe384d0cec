//! `fieldstore`: transparent field-level encryption for sensitive record attributes.
//!
//! An [`EncryptedFieldStore`] holds one symmetric key and turns plaintext
//! strings into opaque [`EncryptedToken`]s and back. Records keep tokens in
//! [`EncryptedAttribute`] slots and expose typed plaintext accessors, so
//! application code never handles ciphertext.
//!
//! Around the store sit the operational passes:
//! - [`rotation`]: re-encrypt every token from an old key to a new key.
//! - [`migration`]: encrypt legacy plaintext columns and verify a key set.
//! - [`query`]: search on an encrypted attribute via a queryable pre-filter.

pub mod attribute;
pub mod crypto;
pub mod key;
pub mod migration;
pub mod query;
pub mod record;
pub mod repository;
pub mod rotation;
pub mod store;
pub mod token;

pub use attribute::{
    AuditScope, DecryptAudit, DecryptEvent, DecryptOutcome, EncryptedAttribute, TracingAudit,
};
pub use common::{DecryptFailure, FieldError, RecordRef};
pub use key::{EncryptionKey, KeyError, KeyId};
pub use migration::{encrypt_legacy, verify};
pub use query::find_by_secondary_then_filter;
pub use record::{LegacyPlaintext, Record};
pub use repository::{InMemoryRepository, JsonFileRepository, RecordRepository, RepositoryError};
pub use rotation::{rotate, rotate_repository, FailurePolicy, RotationError};
pub use store::EncryptedFieldStore;
pub use token::EncryptedToken;

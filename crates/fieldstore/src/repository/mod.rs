//! Record persistence seam used by rotation, migration and search.
//!
//! Implementations filter only on queryable attributes. Filtering on an
//! encrypted attribute fails with [`RepositoryError::NotQueryable`]: tokens
//! are randomised, so the storage layer cannot match them.

pub mod json_file;
pub mod memory;

pub use json_file::JsonFileRepository;
pub use memory::InMemoryRepository;

use common::{FieldError, RecordRef};
use thiserror::Error;

use crate::record::Record;

/// Errors from a record repository.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The attribute is encrypted and cannot be filtered by storage.
    #[error("attribute `{0}` is encrypted and cannot be queried directly")]
    NotQueryable(String),

    /// The attribute is not known to the record type.
    #[error("unknown attribute `{0}`")]
    UnknownAttribute(String),

    /// A record passed to `save` does not exist in the repository.
    #[error("record {0} not found")]
    NotFound(RecordRef),

    /// Reading or writing the backing file failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The backing file could not be (de)serialised.
    #[error("serialisation error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl From<RepositoryError> for FieldError {
    fn from(e: RepositoryError) -> Self {
        FieldError::Repository(e.to_string())
    }
}

/// Load-and-save access to stored records of type `R`.
///
/// Result order is the storage order and must be stable between calls.
#[cfg_attr(test, mockall::automock)]
pub trait RecordRepository<R: Record + 'static> {
    /// Every stored record.
    fn all(&self) -> Result<Vec<R>, RepositoryError>;

    /// Records whose queryable `attribute` equals `value`.
    fn filter_by(&self, attribute: &str, value: &str) -> Result<Vec<R>, RepositoryError>;

    /// Persist an updated record, matched by [`Record::record_ref`].
    fn save(&mut self, record: &R) -> Result<(), RepositoryError>;
}

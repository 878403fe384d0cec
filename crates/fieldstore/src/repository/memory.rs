//! Vec-backed repository, used by tests and as the working set of the file repository.

use super::{RecordRepository, RepositoryError};
use crate::record::{is_encrypted_attribute, Record};

/// Records held in insertion order.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRepository<R> {
    records: Vec<R>,
}

impl<R> InMemoryRepository<R> {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    /// Create a repository holding `records` in the given order.
    pub fn from_records(records: Vec<R>) -> Self {
        Self { records }
    }

    /// Append a record.
    pub fn insert(&mut self, record: R) {
        self.records.push(record);
    }

    /// Borrow the stored records.
    pub fn records(&self) -> &[R] {
        &self.records
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if no records are stored.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl<R: Record + Clone + 'static> RecordRepository<R> for InMemoryRepository<R> {
    fn all(&self) -> Result<Vec<R>, RepositoryError> {
        Ok(self.records.clone())
    }

    fn filter_by(&self, attribute: &str, value: &str) -> Result<Vec<R>, RepositoryError> {
        if is_encrypted_attribute::<R>(attribute) {
            return Err(RepositoryError::NotQueryable(attribute.to_owned()));
        }
        let mut out = Vec::new();
        for record in &self.records {
            match record.queryable_matches(attribute, value) {
                Some(true) => out.push(record.clone()),
                Some(false) => {}
                None => return Err(RepositoryError::UnknownAttribute(attribute.to_owned())),
            }
        }
        Ok(out)
    }

    fn save(&mut self, record: &R) -> Result<(), RepositoryError> {
        let target = record.record_ref();
        let slot = self
            .records
            .iter_mut()
            .find(|r| r.record_ref() == target)
            .ok_or(RepositoryError::NotFound(target))?;
        *slot = record.clone();
        Ok(())
    }
}

//! Repository backed by a JSON array on disk.
//!
//! The whole file is loaded on open; `save` updates the working set and
//! [`JsonFileRepository::flush`] writes it back through a sibling temp file
//! and a rename, so a crash never leaves a half-written file behind.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use super::{InMemoryRepository, RecordRepository, RepositoryError};
use crate::record::Record;

/// Records persisted as a pretty-printed JSON array.
#[derive(Debug)]
pub struct JsonFileRepository<R> {
    path: PathBuf,
    inner: InMemoryRepository<R>,
    dirty: bool,
}

impl<R> JsonFileRepository<R>
where
    R: Record + Clone + Serialize + DeserializeOwned + 'static,
{
    /// Load every record from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Io`] if the file cannot be read and
    /// [`RepositoryError::Serde`] if it is not a JSON array of records.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RepositoryError> {
        let path = path.as_ref().to_path_buf();
        let text = fs::read_to_string(&path)?;
        let records: Vec<R> = serde_json::from_str(&text)?;
        debug!(path = %path.display(), count = records.len(), "loaded records");
        Ok(Self {
            path,
            inner: InMemoryRepository::from_records(records),
            dirty: false,
        })
    }

    /// Create (or overwrite) `path` with `records`.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Io`] or [`RepositoryError::Serde`] if writing fails.
    pub fn create(path: impl AsRef<Path>, records: Vec<R>) -> Result<Self, RepositoryError> {
        let mut repo = Self {
            path: path.as_ref().to_path_buf(),
            inner: InMemoryRepository::from_records(records),
            dirty: true,
        };
        repo.flush()?;
        Ok(repo)
    }

    /// Borrow the working set.
    pub fn records(&self) -> &[R] {
        self.inner.records()
    }

    /// Returns `true` if there are saved changes not yet flushed.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Write saved changes back to disk. A no-op when nothing changed.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Io`] or [`RepositoryError::Serde`] if writing fails;
    /// the original file is left untouched in that case.
    pub fn flush(&mut self) -> Result<(), RepositoryError> {
        if !self.dirty {
            return Ok(());
        }
        let json = serde_json::to_vec_pretty(self.inner.records())?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        self.dirty = false;
        debug!(path = %self.path.display(), count = self.inner.len(), "flushed records");
        Ok(())
    }
}

impl<R> RecordRepository<R> for JsonFileRepository<R>
where
    R: Record + Clone + Serialize + DeserializeOwned + 'static,
{
    fn all(&self) -> Result<Vec<R>, RepositoryError> {
        self.inner.all()
    }

    fn filter_by(&self, attribute: &str, value: &str) -> Result<Vec<R>, RepositoryError> {
        self.inner.filter_by(attribute, value)
    }

    fn save(&mut self, record: &R) -> Result<(), RepositoryError> {
        self.inner.save(record)?;
        self.dirty = true;
        Ok(())
    }
}

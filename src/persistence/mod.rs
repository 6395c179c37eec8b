//! # Persistence
//!
//! The mapping table survives restarts as one opaque blob. This module owns the
//! storage seam ([`BlobStorage`]) and the binary layout ([`codec`]); the engine
//! decides when to save and how to recover from a bad blob.
//!
//! ## Error Handling Strategy
//! Storage failures surface as [`StorageError`] and leave the in-memory table
//! untouched. A blob that is present but unreadable is a codec concern and is
//! reported as a validation failure instead.

pub mod codec;

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Raw non-volatile storage for the mapping blob
pub trait BlobStorage: Send + Sync {
    /// Returns `None` when nothing has been saved yet
    fn read_blob(&self) -> Result<Option<Vec<u8>>, StorageError>;

    fn write_blob(&self, blob: &[u8]) -> Result<(), StorageError>;
}

/// Blob kept in a single file
///
/// Writes go to a sibling `.tmp` file first and are renamed into place, so an
/// interrupted save leaves the previous blob intact.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: io::Error) -> StorageError {
        StorageError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl BlobStorage for FileStorage {
    fn read_blob(&self) -> Result<Option<Vec<u8>>, StorageError> {
        match fs::read(&self.path) {
            Ok(bytes) => {
                debug!("Read {} bytes from {}", bytes.len(), self.path.display());
                Ok(Some(bytes))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.io_error(e)),
        }
    }

    fn write_blob(&self, blob: &[u8]) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
            }
        }

        let tmp_path = self.path.with_extension("tmp");
        let mut file = fs::File::create(&tmp_path).map_err(|e| self.io_error(e))?;
        file.write_all(blob).map_err(|e| self.io_error(e))?;
        file.sync_all().map_err(|e| self.io_error(e))?;
        fs::rename(&tmp_path, &self.path).map_err(|e| self.io_error(e))?;

        debug!("Wrote {} bytes to {}", blob.len(), self.path.display());
        Ok(())
    }
}

/// Blob kept in memory, for tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryStorage {
    blob: Mutex<Option<Vec<u8>>>,
    unavailable: bool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_blob(blob: Vec<u8>) -> Self {
        Self {
            blob: Mutex::new(Some(blob)),
            unavailable: false,
        }
    }

    /// Storage whose every read and write fails
    pub fn unavailable() -> Self {
        Self {
            blob: Mutex::new(None),
            unavailable: true,
        }
    }

    pub fn blob(&self) -> Option<Vec<u8>> {
        match self.blob.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn set_blob(&self, blob: Vec<u8>) {
        match self.blob.lock() {
            Ok(mut guard) => *guard = Some(blob),
            Err(poisoned) => *poisoned.into_inner() = Some(blob),
        }
    }
}

impl BlobStorage for MemoryStorage {
    fn read_blob(&self) -> Result<Option<Vec<u8>>, StorageError> {
        if self.unavailable {
            return Err(StorageError::Unavailable("memory storage disabled".into()));
        }
        Ok(self.blob())
    }

    fn write_blob(&self, blob: &[u8]) -> Result<(), StorageError> {
        if self.unavailable {
            return Err(StorageError::Unavailable("memory storage disabled".into()));
        }
        self.set_blob(blob.to_vec());
        Ok(())
    }
}

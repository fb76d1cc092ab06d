//! Storage error types.
//!
//! [`StorageError`] covers every failure the part store and object store can
//! report. I/O variants keep the underlying [`io::Error`] as their source and
//! name the action and path involved so a log line is enough to diagnose the
//! failure.
//!
//! "Object not found" on lookup and "object absent" on delete are not errors
//! and have no variant here.

use std::io;
use std::path::{Path, PathBuf};

/// Storage error type.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A file or directory could not be created, written, renamed or removed.
    #[error("cannot {action} {}: {source}", path.display())]
    Write {
        /// What was being attempted, e.g. `"create upload directory"`.
        action: &'static str,
        /// The path the action targeted.
        path: PathBuf,
        /// The underlying I/O error.
        source: io::Error,
    },

    /// An existing staged part could not be opened or read.
    #[error("cannot {action} {}: {source}", path.display())]
    Read {
        /// What was being attempted, e.g. `"read part file"`.
        action: &'static str,
        /// The path the action targeted.
        path: PathBuf,
        /// The underlying I/O error.
        source: io::Error,
    },

    /// A merge was requested for an upload with no readable staging directory.
    #[error("upload {upload_id} not found: {source}")]
    UploadNotFound {
        /// The upload identifier.
        upload_id: String,
        /// The error returned while listing the staging directory.
        source: io::Error,
    },

    /// A staging directory entry does not name a valid part.
    #[error("upload {upload_id} contains an invalid part entry: {entry:?}")]
    CorruptUpload {
        /// The upload identifier.
        upload_id: String,
        /// The offending directory entry name.
        entry: String,
    },
}

impl StorageError {
    pub(crate) fn write(action: &'static str, path: impl AsRef<Path>, source: io::Error) -> Self {
        Self::Write {
            action,
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub(crate) fn read(action: &'static str, path: impl AsRef<Path>, source: io::Error) -> Self {
        Self::Read {
            action,
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Whether this error means the upload does not exist.
    #[must_use]
    pub fn is_upload_not_found(&self) -> bool {
        matches!(self, Self::UploadNotFound { .. })
    }
}

/// Convenience result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

//! Staging files and atomic publish.
//!
//! Every write in this crate goes through a [`StagedFile`]: bytes land in a
//! uniquely named file under the scratch directory and only become visible
//! under their final name through a single `rename`. The scratch directory
//! shares a filesystem with the objects and parts subtrees, so the rename is
//! atomic for concurrent readers.
//!
//! A [`StagedFile`] that is dropped before [`StagedFile::publish`] removes its
//! backing file. This covers error paths and cancelled request futures alike.

use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tracing::trace;

use crate::error::{StorageError, StorageResult};

/// A file being written in the scratch directory.
#[derive(Debug)]
pub(crate) struct StagedFile {
    /// Owns the on-disk name; deletes it on drop unless persisted.
    temp: NamedTempFile,
    /// Async handle sharing the same open file description.
    file: File,
}

impl StagedFile {
    /// Create an empty staging file in `scratch_dir`, creating the directory
    /// if needed.
    pub(crate) async fn create(scratch_dir: &Path, prefix: &str) -> StorageResult<Self> {
        ensure_dir(scratch_dir, "create scratch directory").await?;

        let scratch = scratch_dir.to_path_buf();
        let prefix = prefix.to_owned();
        let (temp, handle) = blocking(scratch_dir, "create staging file in", move || {
            let mut builder = tempfile::Builder::new();
            builder.prefix(&prefix);
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                builder.permissions(std::fs::Permissions::from_mode(0o644));
            }

            let temp = builder
                .tempfile_in(&scratch)
                .map_err(|e| StorageError::write("create staging file in", &scratch, e))?;
            let handle = temp
                .as_file()
                .try_clone()
                .map_err(|e| StorageError::write("open staging file", temp.path(), e))?;
            Ok((temp, handle))
        })
        .await?;

        trace!(path = %temp.path().display(), "created staging file");
        Ok(Self {
            temp,
            file: File::from_std(handle),
        })
    }

    /// Path of the staging file.
    pub(crate) fn path(&self) -> &Path {
        self.temp.path()
    }

    /// Async writer for the staging file.
    pub(crate) fn writer(&mut self) -> &mut File {
        &mut self.file
    }

    /// Copy `source` to the end of the staging file until it is exhausted.
    ///
    /// A failure on either side means the payload could not be fully written
    /// and is reported as [`StorageError::Write`].
    pub(crate) async fn fill_from<R>(&mut self, source: &mut R) -> StorageResult<u64>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let path = self.temp.path().to_path_buf();
        tokio::io::copy(source, &mut self.file)
            .await
            .map_err(|e| StorageError::write("write staging file", path, e))
    }

    /// Flush the staged bytes to disk and atomically rename the file to
    /// `dest`, creating `dest`'s parent directories first.
    ///
    /// On failure the staging file is removed and `dest` is untouched.
    pub(crate) async fn publish(self, dest: &Path) -> StorageResult<()> {
        let Self { temp, mut file } = self;

        file.flush()
            .await
            .map_err(|e| StorageError::write("flush staging file", temp.path(), e))?;
        file.sync_all()
            .await
            .map_err(|e| StorageError::write("sync staging file", temp.path(), e))?;
        drop(file);

        create_parent_dir(dest).await?;

        let staged_path = temp.path().to_path_buf();
        let target = dest.to_path_buf();
        // The returned `PersistError` still owns the temp file and deletes it
        // when dropped.
        blocking(dest, "publish staging file to", move || {
            temp.persist(&target)
                .map(drop)
                .map_err(|e| StorageError::write("publish staging file to", &target, e.error))
        })
        .await?;

        trace!(from = %staged_path.display(), to = %dest.display(), "published staging file");
        Ok(())
    }
}

/// Create `dir` and all of its ancestors.
pub(crate) async fn ensure_dir(dir: &Path, action: &'static str) -> StorageResult<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| StorageError::write(action, dir, e))
}

/// Create the parent directory of `file`.
pub(crate) async fn create_parent_dir(file: &Path) -> StorageResult<()> {
    match file.parent() {
        Some(parent) => ensure_dir(parent, "create parent directory").await,
        None => Ok(()),
    }
}

/// Whether an I/O error means the entry (or one of its ancestors) is absent.
pub(crate) fn is_absent(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::NotFound | std::io::ErrorKind::NotADirectory
    )
}

/// Run a blocking filesystem call on the blocking pool.
async fn blocking<T, F>(path: &Path, action: &'static str, f: F) -> StorageResult<T>
where
    F: FnOnce() -> StorageResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StorageError::write(action, path, std::io::Error::other(e)))?
}

/// Join a `/`-separated relative name onto `root`, one segment at a time.
///
/// Empty and `.` segments are skipped, so `a//b` and `dir/` name the same
/// entries as `a/b` and `dir`. Callers reject `..` before getting here.
pub(crate) fn join_relative(root: &Path, name: &str) -> PathBuf {
    name.split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .fold(root.to_path_buf(), |path, segment| path.join(segment))
}

//! Durable, atomically visible storage of finished objects.
//!
//! Objects live at `<objects>/<bucket>/<key>`, with the key used verbatim as
//! a relative path. Both write paths stage bytes in the scratch directory and
//! publish with a rename, so a reader opening an object sees either the
//! complete old payload or the complete new one.
//!
//! Writers to the same `(bucket, key)` are not serialized; the last publish
//! wins.

use std::path::PathBuf;

use tokio::io::AsyncRead;
use tracing::{debug, warn};

use crate::config::FakeS3Config;
use crate::error::{StorageError, StorageResult};
use crate::part_store::{MergeReport, PartStore};
use crate::staging::{self, StagedFile};

/// Filesystem store for finished objects.
///
/// # Examples
///
/// ```
/// use fakes3_core::ObjectStore;
///
/// # tokio_test::block_on(async {
/// let root = tempfile::tempdir().unwrap();
/// let store = ObjectStore::new(root.path().join("objects"), root.path().join("tmp"));
///
/// store.put_object("bucket", "dir/hello.txt", &mut &b"hello"[..]).await.unwrap();
/// let path = store.get_object_path("bucket", "dir/hello.txt").await.unwrap();
/// assert_eq!(std::fs::read(path).unwrap(), b"hello");
///
/// store.delete_object("bucket", "dir/hello.txt").await.unwrap();
/// assert!(store.get_object_path("bucket", "dir/hello.txt").await.is_none());
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct ObjectStore {
    /// Root holding one directory per bucket.
    objects_dir: PathBuf,
    /// Scratch directory for objects being written or assembled.
    tmp_dir: PathBuf,
}

impl ObjectStore {
    /// Create an object store rooted at `objects_dir`, staging writes in
    /// `tmp_dir`. Both must live on the same filesystem.
    #[must_use]
    pub fn new(objects_dir: impl Into<PathBuf>, tmp_dir: impl Into<PathBuf>) -> Self {
        Self {
            objects_dir: objects_dir.into(),
            tmp_dir: tmp_dir.into(),
        }
    }

    /// Create an object store using the layout derived from `config`.
    #[must_use]
    pub fn from_config(config: &FakeS3Config) -> Self {
        Self::new(config.objects_dir(), config.tmp_dir())
    }

    /// Create the objects root and scratch directories.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Write`] if either directory cannot be created.
    pub async fn init(&self) -> StorageResult<()> {
        staging::ensure_dir(&self.objects_dir, "create objects directory").await?;
        staging::ensure_dir(&self.tmp_dir, "create scratch directory").await
    }

    /// Filesystem location of `(bucket, key)`, whether or not it exists.
    #[must_use]
    pub fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
        staging::join_relative(&self.objects_dir.join(bucket), key)
    }

    /// Store the full contents of `source` as `(bucket, key)`, replacing any
    /// existing object.
    ///
    /// Returns the number of bytes stored.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Write`] on any I/O failure. The previous
    /// object, if any, is then left untouched.
    pub async fn put_object<R>(&self, bucket: &str, key: &str, source: &mut R) -> StorageResult<u64>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let mut staged = StagedFile::create(&self.tmp_dir, ".object-").await?;
        let size = staged.fill_from(source).await?;
        let object_path = self.object_path(bucket, key);
        staged.publish(&object_path).await?;

        debug!(bucket, key, size, "stored object");
        Ok(size)
    }

    /// Assemble every staged part of `upload_id` into `(bucket, key)`.
    ///
    /// The parts are concatenated into a private file in the scratch
    /// directory and only then renamed over the object's path.
    ///
    /// # Errors
    ///
    /// - Any error from [`PartStore::merge_parts`], unchanged. The scratch
    ///   file is removed and the object is untouched.
    /// - [`StorageError::Write`] if the scratch file cannot be created or the
    ///   final rename fails.
    pub async fn merge_parts(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_store: &PartStore,
    ) -> StorageResult<MergeReport> {
        let mut staged = StagedFile::create(&self.tmp_dir, ".merge-").await?;
        debug!(
            bucket,
            key,
            upload_id,
            staging = %staged.path().display(),
            "assembling multipart object"
        );

        // Dropping `staged` on the error path removes the scratch file.
        let report = part_store.merge_parts(upload_id, staged.writer()).await?;
        if let Some(e) = &report.cleanup_error {
            warn!(
                upload_id,
                path = %part_store.upload_dir(upload_id).display(),
                error = %e,
                "failed to remove upload staging directory"
            );
        }

        let object_path = self.object_path(bucket, key);
        staged.publish(&object_path).await?;

        debug!(
            bucket,
            key,
            upload_id,
            size = report.size,
            parts = report.part_numbers.len(),
            path = %object_path.display(),
            "merged object"
        );
        Ok(report)
    }

    /// Path of `(bucket, key)` if an object exists there.
    ///
    /// Returns `None` when nothing exists at the path or the path is a
    /// directory.
    pub async fn get_object_path(&self, bucket: &str, key: &str) -> Option<PathBuf> {
        let path = self.object_path(bucket, key);
        match tokio::fs::metadata(&path).await {
            Ok(metadata) if !metadata.is_dir() => Some(path),
            _ => None,
        }
    }

    /// Delete `(bucket, key)`.
    ///
    /// Deleting an absent object succeeds. A directory at the object's path
    /// is not an object and is left in place.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Write`] if an existing object cannot be
    /// removed.
    pub async fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<()> {
        let path = self.object_path(bucket, key);
        match tokio::fs::metadata(&path).await {
            Ok(metadata) if metadata.is_dir() => return Ok(()),
            Ok(_) => {}
            Err(e) if staging::is_absent(&e) => return Ok(()),
            Err(e) => return Err(StorageError::write("inspect object", path, e)),
        }

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(bucket, key, "deleted object");
                Ok(())
            }
            // Lost a race with another delete.
            Err(e) if staging::is_absent(&e) => Ok(()),
            Err(e) => Err(StorageError::write("delete object", path, e)),
        }
    }
}

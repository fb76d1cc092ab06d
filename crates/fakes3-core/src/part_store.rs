//! Durable staging of multipart-upload parts and their ordered assembly.
//!
//! Each upload owns one directory under the parts root; each part is one file
//! named `part-<n>` inside it. The directory listing is the only index: a
//! part exists exactly when its file does.
//!
//! # Concurrency
//!
//! No locks are taken. Two [`PartStore::store_part`] calls for the same
//! `(upload_id, part_number)` race and the last rename to land wins. A
//! [`PartStore::merge_parts`] call sees the parts whose rename completed
//! before the directory was listed; callers must only merge after every part
//! upload they expect has returned.

use std::io;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::config::FakeS3Config;
use crate::error::{StorageError, StorageResult};
use crate::staging::{self, StagedFile};

/// File name prefix of a stored part.
const PART_PREFIX: &str = "part-";

/// Buffer size used when streaming parts into a merge sink.
const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Outcome of a successful merge.
#[derive(Debug)]
pub struct MergeReport {
    /// Part numbers that were concatenated, in output order.
    pub part_numbers: Vec<NonZeroU32>,
    /// Total bytes written to the sink.
    pub size: u64,
    /// Set when the upload's staging directory could not be removed after the
    /// merge. The merge itself still succeeded.
    pub cleanup_error: Option<io::Error>,
}

/// Filesystem store for in-progress multipart uploads.
///
/// # Examples
///
/// ```
/// use std::num::NonZeroU32;
///
/// use fakes3_core::PartStore;
///
/// # tokio_test::block_on(async {
/// let root = tempfile::tempdir().unwrap();
/// let store = PartStore::new(root.path().join("parts"), root.path().join("tmp"));
///
/// let two = NonZeroU32::new(2).unwrap();
/// let one = NonZeroU32::new(1).unwrap();
/// store.store_part("u1", two, &mut &b"world"[..]).await.unwrap();
/// store.store_part("u1", one, &mut &b"hello "[..]).await.unwrap();
///
/// let mut merged = Vec::new();
/// store.merge_parts("u1", &mut merged).await.unwrap();
/// assert_eq!(merged, b"hello world");
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct PartStore {
    /// Root holding one directory per upload.
    parts_dir: PathBuf,
    /// Scratch directory for parts still being received.
    tmp_dir: PathBuf,
}

impl PartStore {
    /// Create a part store rooted at `parts_dir`, staging incoming parts in
    /// `tmp_dir`. Both must live on the same filesystem.
    #[must_use]
    pub fn new(parts_dir: impl Into<PathBuf>, tmp_dir: impl Into<PathBuf>) -> Self {
        Self {
            parts_dir: parts_dir.into(),
            tmp_dir: tmp_dir.into(),
        }
    }

    /// Create a part store using the layout derived from `config`.
    #[must_use]
    pub fn from_config(config: &FakeS3Config) -> Self {
        Self::new(config.parts_dir(), config.tmp_dir())
    }

    /// Create the parts root and scratch directories.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Write`] if either directory cannot be created.
    pub async fn init(&self) -> StorageResult<()> {
        staging::ensure_dir(&self.parts_dir, "create parts directory").await?;
        staging::ensure_dir(&self.tmp_dir, "create scratch directory").await
    }

    /// Staging directory of an upload.
    #[must_use]
    pub fn upload_dir(&self, upload_id: &str) -> PathBuf {
        self.parts_dir.join(upload_id)
    }

    fn part_path(&self, upload_id: &str, part_number: NonZeroU32) -> PathBuf {
        self.upload_dir(upload_id)
            .join(format!("{PART_PREFIX}{part_number}"))
    }

    /// Read `source` to completion and persist it as part `part_number` of
    /// `upload_id`, replacing any earlier payload for that part number.
    ///
    /// Returns the number of bytes stored.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Write`] if the upload directory cannot be
    /// created or the payload cannot be fully written. The part is then
    /// absent (or keeps its previous payload); a partial payload never shows
    /// up under the part's name.
    pub async fn store_part<R>(
        &self,
        upload_id: &str,
        part_number: NonZeroU32,
        source: &mut R,
    ) -> StorageResult<u64>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let upload_dir = self.upload_dir(upload_id);
        staging::ensure_dir(&upload_dir, "create upload directory").await?;

        let mut staged = StagedFile::create(&self.tmp_dir, ".part-").await?;
        let size = staged.fill_from(source).await?;
        let part_path = self.part_path(upload_id, part_number);
        staged.publish(&part_path).await?;

        debug!(upload_id, part_number = part_number.get(), size, "stored part");
        Ok(size)
    }

    /// List the parts currently staged for `upload_id`, ascending by part
    /// number.
    ///
    /// # Errors
    ///
    /// - [`StorageError::UploadNotFound`] if the staging directory is absent
    ///   or cannot be listed.
    /// - [`StorageError::CorruptUpload`] if an entry is not named
    ///   `part-<n>` for a positive `n` in canonical decimal form.
    pub async fn list_parts(&self, upload_id: &str) -> StorageResult<Vec<NonZeroU32>> {
        Ok(self
            .staged_parts(upload_id)
            .await?
            .into_iter()
            .map(|(number, _)| number)
            .collect())
    }

    /// Concatenate every staged part of `upload_id` into `sink`, ascending by
    /// part number, then remove the upload's staging directory.
    ///
    /// An upload whose directory exists but holds no parts produces an empty
    /// output. Gaps in numbering are preserved as-is.
    ///
    /// # Errors
    ///
    /// - [`StorageError::UploadNotFound`] / [`StorageError::CorruptUpload`]
    ///   as for [`list_parts`](Self::list_parts).
    /// - [`StorageError::Read`] if a part cannot be opened or read.
    /// - [`StorageError::Write`] if the sink rejects a write.
    ///
    /// On error the sink may already hold a prefix of the output; discarding
    /// it is up to the caller. The staging directory is left in place.
    pub async fn merge_parts<W>(&self, upload_id: &str, sink: &mut W) -> StorageResult<MergeReport>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let upload_dir = self.upload_dir(upload_id);
        let parts = self.staged_parts(upload_id).await?;

        let mut buf = vec![0_u8; COPY_BUFFER_SIZE];
        let mut size = 0_u64;
        for (_, path) in &parts {
            let mut part = File::open(path)
                .await
                .map_err(|e| StorageError::read("open part file", path, e))?;
            size += copy_part(&mut part, sink, &mut buf, path).await?;
        }
        sink.flush()
            .await
            .map_err(|e| StorageError::write("flush merged output of", &upload_dir, e))?;

        let cleanup_error = tokio::fs::remove_dir_all(&upload_dir).await.err();

        debug!(upload_id, parts = parts.len(), size, "merged parts");
        Ok(MergeReport {
            part_numbers: parts.into_iter().map(|(number, _)| number).collect(),
            size,
            cleanup_error,
        })
    }

    /// Discard every staged part of `upload_id`.
    ///
    /// Returns `false` if the upload had no staging directory, which is not an
    /// error.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Write`] if an existing staging directory cannot
    /// be removed.
    pub async fn abort_upload(&self, upload_id: &str) -> StorageResult<bool> {
        let upload_dir = self.upload_dir(upload_id);
        match tokio::fs::remove_dir_all(&upload_dir).await {
            Ok(()) => {
                debug!(upload_id, "aborted upload");
                Ok(true)
            }
            Err(e) if staging::is_absent(&e) => Ok(false),
            Err(e) => Err(StorageError::write("remove upload directory", upload_dir, e)),
        }
    }

    /// Enumerate the upload directory into `(part_number, path)` pairs sorted
    /// by part number.
    async fn staged_parts(&self, upload_id: &str) -> StorageResult<Vec<(NonZeroU32, PathBuf)>> {
        let not_found = |source| StorageError::UploadNotFound {
            upload_id: upload_id.to_owned(),
            source,
        };

        let mut entries = tokio::fs::read_dir(self.upload_dir(upload_id))
            .await
            .map_err(not_found)?;

        let mut parts = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(not_found)? {
            let name = entry.file_name();
            let number = name
                .to_str()
                .and_then(parse_part_name)
                .ok_or_else(|| StorageError::CorruptUpload {
                    upload_id: upload_id.to_owned(),
                    entry: name.to_string_lossy().into_owned(),
                })?;
            parts.push((number, entry.path()));
        }

        parts.sort_unstable_by_key(|(number, _)| *number);
        Ok(parts)
    }
}

/// Parse a `part-<n>` file name. Only the canonical spelling produced by
/// [`PartStore::store_part`] is accepted, so two entries can never claim the
/// same part number.
fn parse_part_name(name: &str) -> Option<NonZeroU32> {
    let digits = name.strip_prefix(PART_PREFIX)?;
    if digits.is_empty() || digits.starts_with('0') || !digits.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }
    digits.parse().ok()
}

/// Stream one part into the sink, keeping read and write failures apart.
async fn copy_part<W>(
    part: &mut File,
    sink: &mut W,
    buf: &mut [u8],
    path: &Path,
) -> StorageResult<u64>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut copied = 0_u64;
    loop {
        let n = part
            .read(buf)
            .await
            .map_err(|e| StorageError::read("read part file", path, e))?;
        if n == 0 {
            return Ok(copied);
        }
        sink.write_all(&buf[..n])
            .await
            .map_err(|e| StorageError::write("append to merged output", path, e))?;
        copied += n as u64;
    }
}

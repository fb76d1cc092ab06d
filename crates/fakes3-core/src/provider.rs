//! The fakes3 storage provider.
//!
//! [`FakeS3`] bundles the configuration with the part store and object store
//! built from it, so request handlers can share a single value.

use std::sync::Arc;

use tracing::info;

use crate::config::FakeS3Config;
use crate::error::StorageResult;
use crate::object_store::ObjectStore;
use crate::part_store::PartStore;

/// Shared storage state for a fakes3 server.
///
/// All fields are `Arc`-wrapped for cheap cloning across handler tasks.
///
/// # Examples
///
/// ```
/// use fakes3_core::FakeS3;
/// use fakes3_core::config::FakeS3Config;
///
/// let provider = FakeS3::new(FakeS3Config::default());
/// assert!(provider.objects().object_path("b", "k").ends_with("objects/b/k"));
/// ```
#[derive(Debug, Clone)]
pub struct FakeS3 {
    /// Provider configuration.
    config: Arc<FakeS3Config>,
    /// Multipart upload staging.
    parts: Arc<PartStore>,
    /// Finished objects.
    objects: Arc<ObjectStore>,
}

impl FakeS3 {
    /// Create a provider whose stores live under `config.data_dir`.
    #[must_use]
    pub fn new(config: FakeS3Config) -> Self {
        Self {
            parts: Arc::new(PartStore::from_config(&config)),
            objects: Arc::new(ObjectStore::from_config(&config)),
            config: Arc::new(config),
        }
    }

    /// Create the on-disk layout.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the data subdirectories cannot be created.
    pub async fn init(&self) -> StorageResult<()> {
        self.parts.init().await?;
        self.objects.init().await?;
        info!(data_dir = %self.config.data_dir.display(), "initialized data directory");
        Ok(())
    }

    /// Returns a reference to the provider configuration.
    #[must_use]
    pub fn config(&self) -> &FakeS3Config {
        &self.config
    }

    /// Returns a reference to the part store.
    #[must_use]
    pub fn parts(&self) -> &PartStore {
        &self.parts
    }

    /// Returns a reference to the object store.
    #[must_use]
    pub fn objects(&self) -> &ObjectStore {
        &self.objects
    }
}

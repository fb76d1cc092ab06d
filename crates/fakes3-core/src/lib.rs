//! Filesystem storage engine for fakes3, a local S3 emulator.
//!
//! Two stores share one data directory:
//!
//! - [`PartStore`] keeps the parts of in-progress multipart uploads under
//!   `parts/<upload-id>/part-<n>` and concatenates them in part-number order.
//! - [`ObjectStore`] keeps finished objects under `objects/<bucket>/<key>`.
//!
//! Every write is staged under `tmp/` and published with a rename, so an
//! object or part is never observed half-written.
//!
//! # Architecture
//!
//! ```text
//! HTTP handler
//!      |
//!      v
//!   FakeS3 (config + stores)
//!      |
//!      +--> PartStore   --+
//!      |                  |  merge_parts streams parts
//!      +--> ObjectStore <-+  into a staged object
//!                |
//!                v
//!        tmp/ --rename--> objects/
//! ```

pub mod config;
pub mod error;
pub mod object_store;
pub mod part_store;
pub mod provider;
mod staging;

pub use config::FakeS3Config;
pub use error::{StorageError, StorageResult};
pub use object_store::ObjectStore;
pub use part_store::{MergeReport, PartStore};
pub use provider::FakeS3;

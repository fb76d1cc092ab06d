//! fakes3 configuration.
//!
//! Provides [`FakeS3Config`] for configuring the store layout and the server
//! that fronts it. Values are loaded from environment variables.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

/// Subdirectory of the data directory holding finished objects.
const OBJECTS_SUBDIR: &str = "objects";
/// Subdirectory of the data directory holding staged multipart parts.
const PARTS_SUBDIR: &str = "parts";
/// Subdirectory of the data directory used as scratch for in-flight writes.
const TMP_SUBDIR: &str = "tmp";

/// fakes3 configuration.
///
/// The data directory is the only piece of state the stores need; it is held
/// here and handed to [`PartStore`](crate::PartStore) and
/// [`ObjectStore`](crate::ObjectStore) at construction time.
///
/// # Examples
///
/// ```
/// use fakes3_core::config::FakeS3Config;
///
/// let config = FakeS3Config::default();
/// assert_eq!(config.gateway_listen, "0.0.0.0:8000");
/// assert!(config.objects_dir().ends_with("objects"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct FakeS3Config {
    /// Bind address for the HTTP server (e.g. `"0.0.0.0:8000"`).
    #[builder(default = String::from("0.0.0.0:8000"))]
    pub gateway_listen: String,

    /// Root directory holding the objects, parts and scratch subtrees.
    #[builder(default = PathBuf::from("/data/fakes3"))]
    pub data_dir: PathBuf,

    /// Address prepended to object locations in responses. When empty the
    /// address is derived from the request `Host` header.
    #[builder(default)]
    pub advertised_addr: String,

    /// Log level filter string (e.g. `"info"`, `"debug"`).
    #[builder(default = String::from("debug"))]
    pub log_level: String,

    /// Log destination: `stdout`, `stderr`, or a file path.
    #[builder(default = String::from("stdout"))]
    pub log_output: String,

    /// Seconds to wait for in-flight requests when shutting down.
    #[builder(default = 30)]
    pub shutdown_timeout_secs: u64,
}

impl Default for FakeS3Config {
    fn default() -> Self {
        Self {
            gateway_listen: String::from("0.0.0.0:8000"),
            data_dir: PathBuf::from("/data/fakes3"),
            advertised_addr: String::new(),
            log_level: String::from("debug"),
            log_output: String::from("stdout"),
            shutdown_timeout_secs: 30,
        }
    }
}

impl FakeS3Config {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `GATEWAY_LISTEN` | `0.0.0.0:8000` |
    /// | `DATA_DIR` | `/data/fakes3` |
    /// | `ADVERTISED_ADDR` | *(empty)* |
    /// | `LOG_LEVEL` | `debug` |
    /// | `LOG_OUTPUT` | `stdout` |
    /// | `SHUTDOWN_TIMEOUT_SECS` | `30` |
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("GATEWAY_LISTEN") {
            config.gateway_listen = v;
        }
        if let Ok(v) = std::env::var("DATA_DIR") {
            config.data_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("ADVERTISED_ADDR") {
            config.advertised_addr = v;
        }
        if let Ok(v) = std::env::var("LOG_LEVEL") {
            config.log_level = v;
        }
        if let Ok(v) = std::env::var("LOG_OUTPUT") {
            config.log_output = v;
        }
        if let Ok(v) = std::env::var("SHUTDOWN_TIMEOUT_SECS") {
            if let Ok(n) = v.parse::<u64>() {
                config.shutdown_timeout_secs = n;
            }
        }

        config
    }

    /// Directory holding finished objects, addressed by `bucket/key`.
    #[must_use]
    pub fn objects_dir(&self) -> PathBuf {
        self.data_dir.join(OBJECTS_SUBDIR)
    }

    /// Directory holding one staging subdirectory per multipart upload.
    #[must_use]
    pub fn parts_dir(&self) -> PathBuf {
        self.data_dir.join(PARTS_SUBDIR)
    }

    /// Scratch directory for in-flight writes. Lives on the same filesystem
    /// as the other two subtrees so that publishing is a plain rename.
    #[must_use]
    pub fn tmp_dir(&self) -> PathBuf {
        self.data_dir.join(TMP_SUBDIR)
    }
}

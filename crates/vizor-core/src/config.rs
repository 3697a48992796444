//! Centralized static configuration for Vizor.
//!
//! Per-call settings live in [`Configuration`](crate::Configuration); the
//! constants here are the tunables that never change at runtime.

use std::time::Duration;

/// Network-related configuration.
pub struct NetworkConfig;

impl NetworkConfig {
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
    pub const DOWNLOAD_TEMP_SUFFIX: &'static str = ".part";
    pub const USER_AGENT: &'static str = "Vizor/0.3";
}

/// Shared directory and path configurations.
pub struct PathsConfig;

impl PathsConfig {
    /// Environment variable overriding the base directory.
    pub const HOME_ENV: &'static str = "VIZOR_HOME";
    pub const HOME_DIR_NAME: &'static str = ".vizor";
    pub const CACHE_DIR_NAME: &'static str = "cache";
    pub const MODELS_DIR_NAME: &'static str = "models";
    /// Extension of persisted cache entries (gzip-compressed JSON).
    pub const CACHE_ENTRY_EXTENSION: &'static str = "json.gz";
}

/// Model and backend defaults.
pub struct ModelConfig;

impl ModelConfig {
    pub const DEFAULT_MODEL: &'static str = "faster_rcnn_inception_v2_coco_2018_01_28";
    /// Kind selected when a configuration does not name a backend.
    pub const BUILTIN_BACKEND: &'static str = "onnx";
    /// Archive extensions the artifact fetcher knows how to unpack.
    pub const ARCHIVE_EXTENSIONS: &'static [&'static str] = &[".tar.gz", ".tgz"];
}

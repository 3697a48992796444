//! Platform abstraction layer.
//!
//! Everything that depends on the user's environment (home directory,
//! environment overrides, temp directory) is resolved here.

pub mod paths;

pub use paths::{base_dir, default_cache_root, default_models_dir};

//! Base directory resolution for cache and model storage.
//!
//! Lookup order:
//! 1. `$VIZOR_HOME`
//! 2. `~/.vizor`
//! 3. `<tmp>/.vizor` when the preferred directory is not writable

use crate::config::PathsConfig;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Resolve the base directory holding the cache and installed models.
pub fn base_dir() -> PathBuf {
    let preferred = std::env::var_os(PathsConfig::HOME_ENV)
        .filter(|value| !value.is_empty())
        .map(|value| expand_home(Path::new(&value)))
        .or_else(|| dirs::home_dir().map(|home| home.join(PathsConfig::HOME_DIR_NAME)));

    match preferred {
        Some(dir) if is_writable_dir(&dir) => dir,
        Some(dir) => {
            let fallback = std::env::temp_dir().join(PathsConfig::HOME_DIR_NAME);
            warn!(
                "{} is not writable, falling back to {}",
                dir.display(),
                fallback.display()
            );
            fallback
        }
        None => std::env::temp_dir().join(PathsConfig::HOME_DIR_NAME),
    }
}

/// Default cache root (`<base>/cache`).
pub fn default_cache_root() -> PathBuf {
    base_dir().join(PathsConfig::CACHE_DIR_NAME)
}

/// Default directory for installed model files (`<base>/models`).
pub fn default_models_dir() -> PathBuf {
    base_dir().join(PathsConfig::MODELS_DIR_NAME)
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}

/// Check that `dir` exists (creating it if needed) and accepts new files.
pub fn is_writable_dir(dir: &Path) -> bool {
    if let Err(e) = std::fs::create_dir_all(dir) {
        debug!("Cannot create {}: {}", dir.display(), e);
        return false;
    }
    tempfile::tempfile_in(dir).is_ok()
}

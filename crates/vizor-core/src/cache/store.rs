//! Filesystem-backed cache store.

use super::key::CacheKey;
use crate::config::PathsConfig;
use crate::configuration::Configuration;
use crate::error::{Result, VizorError};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// On-disk envelope: exactly one named payload.
#[derive(Deserialize)]
struct Entry {
    data: Value,
}

/// Cache store bound to one namespace.
///
/// `get` and `put` never fail. A disabled store always misses and never
/// writes; I/O and decoding problems are logged and treated the same way.
/// Async callers use [`load`](Self::load) and [`store`](Self::store), which
/// do the file and (de)compression work on the blocking pool.
#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: Option<PathBuf>,
}

impl CacheStore {
    /// Store for the cache settings of `config`.
    pub fn new(config: &Configuration) -> Self {
        if !config.cache_enabled() {
            return Self::disabled();
        }
        Self::at(config.cache_root().join(config.cache_namespace()))
    }

    /// Store rooted at an explicit namespace directory.
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
        }
    }

    pub fn disabled() -> Self {
        Self { dir: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.dir.is_some()
    }

    /// Path of the entry for `key`, if caching is enabled.
    pub fn entry_path(&self, key: &CacheKey) -> Option<PathBuf> {
        self.dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.{}", key, PathsConfig::CACHE_ENTRY_EXTENSION)))
    }

    /// Look up `key`. Missing directories and files are plain misses.
    pub fn get(&self, key: &CacheKey) -> Option<Value> {
        let path = self.entry_path(key)?;
        if !path.is_file() {
            debug!("Cache miss for {}", key);
            return None;
        }
        match read_entry(&path) {
            Ok(value) => {
                debug!("Cache hit for {}", key);
                Some(value)
            }
            Err(e) => {
                warn!("Ignoring unreadable cache entry {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Store `payload` under `key`, replacing any previous entry.
    pub fn put(&self, key: &CacheKey, payload: &Value) {
        let (Some(dir), Some(path)) = (self.dir.as_ref(), self.entry_path(key)) else {
            return;
        };
        match write_entry(dir, &path, payload) {
            Ok(()) => debug!("Cached {} at {}", key, path.display()),
            Err(e) => warn!("Failed to write cache entry {}: {}", path.display(), e),
        }
    }

    /// [`get`](Self::get) off the async runtime, converting the payload with
    /// `decode` in the same blocking task. `decode` returning `None` is a
    /// miss.
    pub async fn load<T, F>(&self, key: &CacheKey, decode: F) -> Option<T>
    where
        T: Send + 'static,
        F: FnOnce(Value) -> Option<T> + Send + 'static,
    {
        if !self.is_enabled() {
            return None;
        }
        let store = self.clone();
        let key = key.clone();
        tokio::task::spawn_blocking(move || store.get(&key).and_then(decode))
            .await
            .unwrap_or_else(|e| {
                warn!("Cache lookup task failed: {}", e);
                None
            })
    }

    /// [`put`](Self::put) off the async runtime. `payload` is only built
    /// when caching is enabled, on the blocking pool.
    pub async fn store<F>(&self, key: &CacheKey, payload: F)
    where
        F: FnOnce() -> Value + Send + 'static,
    {
        if !self.is_enabled() {
            return;
        }
        let store = self.clone();
        let key = key.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || store.put(&key, &payload())).await {
            warn!("Cache write task failed: {}", e);
        }
    }
}

fn read_entry(path: &Path) -> Result<Value> {
    let file = File::open(path).map_err(|e| VizorError::io_with_path(e, path))?;
    let entry: Entry = serde_json::from_reader(GzDecoder::new(BufReader::new(file)))?;
    Ok(entry.data)
}

fn write_entry(dir: &Path, path: &Path, payload: &Value) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| VizorError::io_with_path(e, dir))?;

    // Write beside the target and rename over it so readers never see a
    // partially written entry.
    let tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| VizorError::io_with_path(e, dir))?;
    {
        let mut encoder = GzEncoder::new(tmp.as_file(), Compression::default());
        serde_json::to_writer(&mut encoder, &EntryRef { data: payload })?;
        encoder.finish()?.flush()?;
    }
    tmp.persist(path)
        .map_err(|e| VizorError::io_with_path(e.error, path))?;
    Ok(())
}

#[derive(Serialize)]
struct EntryRef<'a> {
    data: &'a Value,
}

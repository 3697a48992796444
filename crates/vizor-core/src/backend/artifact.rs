//! Download and installation of remote model archives.
//!
//! A model given as `https://host/path/<name>.tar.gz` is installed as
//! `<model_path>/<name>`. The installed member is the one whose file name is
//! `<name>`; failing that, the first whose file name contains `<name>`, and
//! failing that, the first whose path does. Once the file exists the
//! network is never touched again for it, unless a pinned SHA-256 no longer
//! matches.

use crate::config::ModelConfig;
use crate::configuration::Configuration;
use crate::network::{extract_domain, DownloadManager, HttpClient};
use crate::{Result, VizorError};
use flate2::read::GzDecoder;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

/// Chunk size used while hashing installed artifacts.
const HASH_CHUNK_SIZE: usize = 1024 * 1024;

/// Whether a model identifier refers to a remote artifact.
pub(crate) fn is_remote_model(model: &str) -> bool {
    model.starts_with("http://") || model.starts_with("https://")
}

/// Local artifact name for an archive URL: the final path segment minus its
/// archive extension.
///
/// Fails for anything that is not a `.tar.gz`/`.tgz` archive.
pub fn artifact_name(url: &str) -> Result<String> {
    let fetch_error = |message: &str| VizorError::ArtifactFetch {
        url: url.to_string(),
        message: message.to_string(),
    };

    let parsed = url::Url::parse(url).map_err(|e| fetch_error(&e.to_string()))?;
    let segment = parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or_default();

    let lower = segment.to_ascii_lowercase();
    let name = ModelConfig::ARCHIVE_EXTENSIONS
        .iter()
        .find(|ext| lower.ends_with(*ext))
        .map(|ext| &segment[..segment.len() - ext.len()])
        .ok_or_else(|| {
            fetch_error(&format!(
                "unsupported archive format, expected one of {}",
                ModelConfig::ARCHIVE_EXTENSIONS.join(", ")
            ))
        })?;

    if name.is_empty() || name.chars().all(|c| c == '.') {
        return Err(fetch_error("archive name is empty"));
    }
    Ok(name.to_string())
}

/// Where the artifact behind `url` is installed for `config`.
///
/// Pure path arithmetic: nothing is read or downloaded.
pub fn installed_path(url: &str, config: &Configuration) -> Result<PathBuf> {
    Ok(config.model_path().join(artifact_name(url)?))
}

/// Compute the lowercase hex SHA-256 of a file.
pub fn compute_sha256(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let mut file = File::open(path).map_err(|e| VizorError::io_with_path(e, path))?;

    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; HASH_CHUNK_SIZE];
    loop {
        let bytes_read = file
            .read(&mut buffer)
            .map_err(|e| VizorError::io_with_path(e, path))?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Fetches and installs model archives.
///
/// Concurrent fetches of the same installed path are serialized, so each
/// artifact is downloaded at most once per fetcher.
pub struct ArtifactFetcher {
    http: HttpClient,
    install_locks: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
}

impl ArtifactFetcher {
    pub fn new(http: HttpClient) -> Self {
        Self {
            http,
            install_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Install the artifact behind `url` under `config.model_path()` and
    /// return its local path.
    pub async fn fetch(&self, url: &str, config: &Configuration) -> Result<PathBuf> {
        let name = artifact_name(url)?;
        let models_dir = config.model_path();
        let installed = installed_path(url, config)?;
        let expected = config.model_sha256();

        if self.is_installed(&installed, expected, url).await? {
            debug!("Artifact {} already installed", installed.display());
            return Ok(installed);
        }

        let lock = self.install_lock(&installed);
        let _guard = lock.lock().await;

        // another task may have finished the install while we waited
        if self.is_installed(&installed, expected, url).await? {
            return Ok(installed);
        }

        let fetch_error = |message: String| VizorError::ArtifactFetch {
            url: url.to_string(),
            message,
        };

        tokio::fs::create_dir_all(models_dir)
            .await
            .map_err(|e| fetch_error(e.to_string()))?;
        let archive = models_dir.join(format!("{}.tar.gz", name));

        info!(
            "Downloading model artifact {} from {}",
            name,
            extract_domain(url)
        );
        let downloads = DownloadManager::with_client(self.http.clone(), config.timeout());
        if let Err(e) = downloads.download(url, &archive).await {
            let _ = tokio::fs::remove_file(&archive).await;
            return Err(fetch_error(e.to_string()));
        }

        let extracted = {
            let archive = archive.clone();
            let models_dir = models_dir.to_path_buf();
            let installed = installed.clone();
            let name = name.clone();
            tokio::task::spawn_blocking(move || {
                install_member(&archive, &models_dir, &name, &installed)
            })
            .await
        };

        if let Err(e) = tokio::fs::remove_file(&archive).await {
            warn!("Failed to remove archive {}: {}", archive.display(), e);
        }

        match extracted {
            Ok(Ok(())) => {}
            Ok(Err(message)) => return Err(fetch_error(message)),
            Err(e) => return Err(fetch_error(format!("extraction task failed: {}", e))),
        }

        if let Some(expected) = expected {
            let actual = hash_blocking(&installed, url).await?;
            if actual != expected {
                let _ = tokio::fs::remove_file(&installed).await;
                return Err(fetch_error(format!(
                    "checksum mismatch: expected {}, got {}",
                    expected, actual
                )));
            }
        }

        info!("Installed model artifact at {}", installed.display());
        Ok(installed)
    }

    async fn is_installed(&self, path: &Path, expected: Option<&str>, url: &str) -> Result<bool> {
        if !path.is_file() {
            return Ok(false);
        }
        let Some(expected) = expected else {
            return Ok(true);
        };

        let actual = hash_blocking(path, url).await?;
        if actual == expected {
            Ok(true)
        } else {
            warn!(
                "Installed artifact {} does not match its checksum, downloading again",
                path.display()
            );
            Ok(false)
        }
    }

    fn install_lock(&self, path: &Path) -> Arc<tokio::sync::Mutex<()>> {
        self.install_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(path.to_path_buf())
            .or_default()
            .clone()
    }
}

async fn hash_blocking(path: &Path, url: &str) -> Result<String> {
    let owned = path.to_path_buf();
    tokio::task::spawn_blocking(move || compute_sha256(owned))
        .await
        .map_err(|e| VizorError::ArtifactFetch {
            url: url.to_string(),
            message: format!("hashing task failed: {}", e),
        })?
}

/// How well an archive member matches the artifact name; lower is better.
fn member_rank(member: &Path, name: &str) -> Option<u8> {
    let file_name = member
        .file_name()
        .map(|f| f.to_string_lossy())
        .unwrap_or_default();
    if file_name == name {
        Some(0)
    } else if file_name.contains(name) {
        Some(1)
    } else if member.to_string_lossy().contains(name) {
        Some(2)
    } else {
        None
    }
}

/// Extract the member best matching `name` from `archive` and move it to
/// `installed`. The scratch directory is removed on every exit path.
fn install_member(
    archive: &Path,
    models_dir: &Path,
    name: &str,
    installed: &Path,
) -> std::result::Result<(), String> {
    let scratch = tempfile::Builder::new()
        .prefix(".extract-")
        .tempdir_in(models_dir)
        .map_err(|e| format!("cannot create scratch directory: {}", e))?;

    let file = File::open(archive).map_err(|e| e.to_string())?;
    let mut tar = tar::Archive::new(GzDecoder::new(BufReader::new(file)));
    let entries = tar
        .entries()
        .map_err(|e| format!("not a valid archive: {}", e))?;

    let staged = scratch.path().join(name);
    let mut best: Option<u8> = None;
    for entry in entries {
        let mut entry = entry.map_err(|e| format!("not a valid archive: {}", e))?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let member = entry.path().map_err(|e| e.to_string())?.into_owned();
        let Some(rank) = member_rank(&member, name) else {
            continue;
        };
        if best.is_some_and(|best| rank >= best) {
            continue;
        }

        debug!("Extracting {} from {}", member.display(), archive.display());
        if best.is_some() {
            std::fs::remove_file(&staged).map_err(|e| e.to_string())?;
        }
        entry
            .unpack(&staged)
            .map_err(|e| format!("failed to extract {}: {}", member.display(), e))?;
        best = Some(rank);
        if rank == 0 {
            break;
        }
    }

    if best.is_none() {
        return Err(format!("archive does not contain a file matching {}", name));
    }

    std::fs::rename(&staged, installed)
        .map_err(|e| format!("failed to install {}: {}", installed.display(), e))
}

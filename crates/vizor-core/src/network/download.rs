//! Streaming downloads.
//!
//! Bodies are written chunk by chunk, never buffered whole. Downloads to a
//! named destination go through a `.part` file that is renamed into place
//! on success and removed on any failure.

use crate::config::NetworkConfig;
use crate::network::client::{timed_out, HttpClient};
use crate::{Result, VizorError};
use futures::StreamExt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Download manager for file downloads.
#[derive(Debug, Clone)]
pub struct DownloadManager {
    http: HttpClient,
    /// Bound on the wait for the response headers and for each body chunk.
    timeout: Duration,
}

impl DownloadManager {
    /// Create a download manager on top of a shared client.
    pub fn with_client(http: HttpClient, timeout: Duration) -> Self {
        Self { http, timeout }
    }

    /// Download `url` to `destination`.
    ///
    /// Returns the number of bytes written. On error no file is left at
    /// either the destination or the temporary path.
    pub async fn download(&self, url: &str, destination: &Path) -> Result<u64> {
        if let Some(parent) = destination.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| VizorError::io_with_path(e, parent))?;
            }
        }

        let temp_path = PathBuf::from(format!(
            "{}{}",
            destination.display(),
            NetworkConfig::DOWNLOAD_TEMP_SUFFIX
        ));

        let result = self.download_to_path(url, &temp_path).await;

        match result {
            Ok(bytes) => {
                std::fs::rename(&temp_path, destination).map_err(|e| {
                    let _ = std::fs::remove_file(&temp_path);
                    VizorError::io_with_path(e, destination)
                })?;

                info!("Downloaded {} bytes to {}", bytes, destination.display());
                Ok(bytes)
            }
            Err(e) => {
                let _ = std::fs::remove_file(&temp_path);
                Err(e)
            }
        }
    }

    /// Stream the body of `url` into `writer`.
    ///
    /// A non-success status is an error naming the URL and the status.
    pub async fn download_to<W: Write + Send>(&self, url: &str, writer: &mut W) -> Result<u64> {
        let response = self.http.get(url, self.timeout).await?;
        let status = response.status();

        if !status.is_success() {
            return Err(VizorError::Network {
                message: format!("GET {} returned status {}", url, status),
            });
        }

        let mut bytes_downloaded: u64 = 0;
        let mut stream = response.bytes_stream();

        loop {
            let next = tokio::time::timeout(self.timeout, stream.next())
                .await
                .map_err(|_| timed_out("GET", url, self.timeout))?;

            let Some(chunk) = next else { break };
            let chunk = chunk.map_err(|e| VizorError::Network {
                message: format!("Error reading download stream from {}: {}", url, e),
            })?;

            writer.write_all(&chunk)?;
            bytes_downloaded += chunk.len() as u64;
        }

        writer.flush()?;
        debug!("Streamed {} bytes from {}", bytes_downloaded, url);
        Ok(bytes_downloaded)
    }

    async fn download_to_path(&self, url: &str, temp_path: &Path) -> Result<u64> {
        let mut file =
            std::fs::File::create(temp_path).map_err(|e| VizorError::io_with_path(e, temp_path))?;
        self.download_to(url, &mut file).await
    }
}

//! Thin wrapper around `reqwest` with per-request timeouts.

use crate::config::NetworkConfig;
use crate::{Result, VizorError};
use reqwest::{Client, Response};
use std::time::Duration;
use tracing::debug;

/// HTTP client shared by every network operation of a [`Model`](crate::Model).
///
/// Cloning is cheap; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Create a new HTTP client.
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(NetworkConfig::REQUEST_TIMEOUT)
            .user_agent(NetworkConfig::USER_AGENT)
            .build()
            .map_err(|e| VizorError::Network {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self { client })
    }

    /// Get a reference to the underlying reqwest client.
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Start a GET request and wait for the response headers.
    ///
    /// The body is left unread so callers can stream it; the status is not
    /// checked.
    pub async fn get(&self, url: &str, timeout: Duration) -> Result<Response> {
        debug!("GET {}", url);
        let request = self.client.get(url).send();

        match tokio::time::timeout(timeout, request).await {
            Ok(result) => result.map_err(|e| VizorError::Network {
                message: format!("GET {} failed: {}", url, e),
            }),
            Err(_) => Err(timed_out("GET", url, timeout)),
        }
    }

    /// POST a JSON body. The whole exchange, body included, is bounded by
    /// `timeout`. The status is not checked.
    pub async fn post_json<T: serde::Serialize + ?Sized>(
        &self,
        url: &str,
        body: &T,
        timeout: Duration,
    ) -> Result<Response> {
        debug!("POST {}", url);
        self.client
            .post(url)
            .json(body)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    timed_out("POST", url, timeout)
                } else {
                    VizorError::Network {
                        message: format!("POST {} failed: {}", url, e),
                    }
                }
            })
    }
}

pub(crate) fn timed_out(method: &str, url: &str, timeout: Duration) -> VizorError {
    VizorError::Network {
        message: format!("{} {} timed out after {:?}", method, url, timeout),
    }
}

/// Extract domain from a URL.
pub fn extract_domain(url: &str) -> String {
    url::Url::parse(url)
        .map(|u| u.host_str().unwrap_or("unknown").to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}

//! Per-call configuration.
//!
//! A [`Configuration`] is produced once by [`ConfigurationBuilder::build`],
//! which applies every default and sanitization step. After that the value is
//! read-only: all fields are private and exposed through accessors.

use crate::config::{ModelConfig, NetworkConfig};
use crate::error::{Result, VizorError};
use crate::platform;
use serde::{Deserialize, Serialize, Serializer};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Credentials for object-store sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key: String,
    pub secret_access_key: String,
}

/// Immutable settings for one inference call.
///
/// Serializes as the settings the caller actually made, with the builder's
/// field names. Defaults filled in by [`ConfigurationBuilder::build`] are
/// machine-local (home directory paths, a random namespace) and are left
/// out, so a remote server applies its own.
#[derive(Debug, Clone, PartialEq)]
pub struct Configuration {
    endpoint: Option<String>,
    backend: Option<String>,
    model: String,
    model_path: PathBuf,
    cache: bool,
    cache_path: PathBuf,
    cache_id: String,
    aws_region: Option<String>,
    aws_access_key: Option<String>,
    aws_secret_access_key: Option<String>,
    timeout_secs: u64,
    model_sha256: Option<String>,
    requested: ConfigurationBuilder,
}

impl Serialize for Configuration {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.requested.serialize(serializer)
    }
}

impl Configuration {
    /// Create a builder with nothing set.
    pub fn builder() -> ConfigurationBuilder {
        ConfigurationBuilder::default()
    }

    /// Build a configuration from a JSON object such as a request body.
    ///
    /// Unknown keys (for example `source`) are ignored.
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        Ok(ConfigurationBuilder::from_json(value)?.build())
    }

    /// Remote endpoint, as given.
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    /// Endpoint to delegate to, only when it is an HTTP(S) URL.
    pub fn remote_endpoint(&self) -> Option<&str> {
        self.endpoint
            .as_deref()
            .filter(|e| e.starts_with("http://") || e.starts_with("https://"))
    }

    /// Requested backend kind (`None` selects the built-in backend).
    pub fn backend(&self) -> Option<&str> {
        self.backend.as_deref()
    }

    /// Model identifier: a file name under [`model_path`](Self::model_path)
    /// or a remote archive URL.
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    pub fn cache_enabled(&self) -> bool {
        self.cache
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_path
    }

    /// Sanitized cache namespace (`[A-Za-z0-9._-]+`).
    pub fn cache_namespace(&self) -> &str {
        &self.cache_id
    }

    pub fn aws_region(&self) -> Option<&str> {
        self.aws_region.as_deref()
    }

    /// Explicit object-store credentials.
    ///
    /// `None` means ambient credentials should be used. Both the access key
    /// and the secret must be present for explicit credentials.
    pub fn credentials(&self) -> Option<Credentials> {
        match (&self.aws_access_key, &self.aws_secret_access_key) {
            (Some(access_key), Some(secret)) if !access_key.is_empty() => Some(Credentials {
                access_key: access_key.clone(),
                secret_access_key: secret.clone(),
            }),
            _ => None,
        }
    }

    /// Transport timeout applied to every network call.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Expected SHA-256 (hex) of the installed model artifact, if pinned.
    pub fn model_sha256(&self) -> Option<&str> {
        self.model_sha256.as_deref()
    }
}

impl Default for Configuration {
    fn default() -> Self {
        ConfigurationBuilder::default().build()
    }
}

/// Builder for [`Configuration`].
///
/// Deserializable from request JSON; every field is optional. Serializes
/// only the fields that were set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigurationBuilder {
    #[serde(skip_serializing_if = "Option::is_none")]
    endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    backend: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    model_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cache: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cache_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cache_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    aws_region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    aws_access_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    aws_secret_access_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timeout_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    model_sha256: Option<String>,
}

impl ConfigurationBuilder {
    /// Parse builder fields out of a JSON object.
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        if !value.is_object() {
            return Err(VizorError::invalid_argument(
                "configuration must be a JSON object",
            ));
        }
        Self::deserialize(value).map_err(|e| {
            VizorError::invalid_argument(format!("invalid configuration: {}", e))
        })
    }

    pub fn endpoint(mut self, endpoint: Option<impl Into<String>>) -> Self {
        self.endpoint = endpoint.map(Into::into);
        self
    }

    pub fn backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = Some(backend.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.model_path = Some(path.into());
        self
    }

    pub fn cache(mut self, enabled: bool) -> Self {
        self.cache = Some(enabled);
        self
    }

    pub fn cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = Some(path.into());
        self
    }

    pub fn cache_id(mut self, id: impl Into<String>) -> Self {
        self.cache_id = Some(id.into());
        self
    }

    pub fn aws_region(mut self, region: impl Into<String>) -> Self {
        self.aws_region = Some(region.into());
        self
    }

    pub fn aws_credentials(
        mut self,
        access_key: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Self {
        self.aws_access_key = Some(access_key.into());
        self.aws_secret_access_key = Some(secret_access_key.into());
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn model_sha256(mut self, sha256: impl Into<String>) -> Self {
        self.model_sha256 = Some(sha256.into());
        self
    }

    /// Apply defaults and sanitization, producing the final configuration.
    pub fn build(self) -> Configuration {
        let requested = self.clone();
        let model = self
            .model
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| ModelConfig::DEFAULT_MODEL.to_string());

        let cache_id = self
            .cache_id
            .as_deref()
            .and_then(sanitize_namespace)
            .unwrap_or_else(random_namespace);

        let backend = self.backend.filter(|b| !b.trim().is_empty());
        let endpoint = self.endpoint.filter(|e| !e.trim().is_empty());

        Configuration {
            endpoint,
            backend,
            model,
            model_path: self
                .model_path
                .unwrap_or_else(platform::default_models_dir),
            cache: self.cache.unwrap_or(false),
            cache_path: self
                .cache_path
                .unwrap_or_else(platform::default_cache_root),
            cache_id,
            aws_region: self.aws_region,
            aws_access_key: self.aws_access_key,
            aws_secret_access_key: self.aws_secret_access_key,
            timeout_secs: self
                .timeout_secs
                .filter(|secs| *secs > 0)
                .unwrap_or(NetworkConfig::REQUEST_TIMEOUT.as_secs()),
            model_sha256: self.model_sha256.map(|h| h.trim().to_lowercase()),
            requested,
        }
    }
}

/// Strip every character outside `[A-Za-z0-9._-]`.
///
/// Returns `None` when nothing usable is left. A dots-only result would
/// address the parent directory and is rejected as well.
pub fn sanitize_namespace(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();

    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        None
    } else {
        Some(cleaned)
    }
}

fn random_namespace() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

//! Object-store fetching.

use crate::configuration::Configuration;
use async_trait::async_trait;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::{ClientOptions, ObjectStore};
use thiserror::Error;
use tracing::debug;

/// Distinguishable object-store failures.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("access denied: {0}")]
    AuthFailed(String),

    #[error("transport error: {0}")]
    Transport(String),
}

/// Fetches object bytes from a bucket.
#[async_trait]
pub trait ObjectFetcher: Send + Sync {
    async fn fetch(
        &self,
        bucket: &str,
        key: &str,
        config: &Configuration,
    ) -> Result<Vec<u8>, FetchError>;
}

/// S3 fetcher backed by `object_store`.
///
/// Uses the configured access key and secret when both are present, and the
/// ambient AWS environment otherwise.
#[derive(Debug, Default, Clone, Copy)]
pub struct S3Fetcher;

#[async_trait]
impl ObjectFetcher for S3Fetcher {
    async fn fetch(
        &self,
        bucket: &str,
        key: &str,
        config: &Configuration,
    ) -> Result<Vec<u8>, FetchError> {
        let mut builder = AmazonS3Builder::from_env()
            .with_bucket_name(bucket)
            .with_client_options(ClientOptions::new().with_timeout(config.timeout()));

        if let Some(credentials) = config.credentials() {
            builder = builder
                .with_access_key_id(credentials.access_key)
                .with_secret_access_key(credentials.secret_access_key);
        }
        if let Some(region) = config.aws_region() {
            builder = builder.with_region(region);
        }

        let store = builder
            .build()
            .map_err(|e| FetchError::AuthFailed(e.to_string()))?;

        debug!("Fetching s3://{}/{}", bucket, key);
        let object = store
            .get(&ObjectPath::from(key))
            .await
            .map_err(classify)?;
        let bytes = object.bytes().await.map_err(classify)?;
        Ok(bytes.to_vec())
    }
}

fn classify(err: object_store::Error) -> FetchError {
    match err {
        object_store::Error::NotFound { path, .. } => FetchError::NotFound(path),
        err @ (object_store::Error::PermissionDenied { .. }
        | object_store::Error::Unauthenticated { .. }) => FetchError::AuthFailed(err.to_string()),
        err => FetchError::Transport(err.to_string()),
    }
}

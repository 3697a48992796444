//! The inference facade.
//!
//! [`Model::infer`] either delegates to a remote endpoint or runs the local
//! pipeline:
//!
//! ```text
//! cache check ─hit──────────────────────────────────────────────► return
//!      └─miss─► resolve source ─► backend ─► normalize ─► cache store ─► return
//! ```

use crate::backend::{ArtifactFetcher, BackendRegistry};
use crate::cache::{CacheKey, CacheStore, Purpose};
use crate::configuration::Configuration;
use crate::detection::Predictions;
use crate::network::HttpClient;
use crate::source::{Source, SourceResolver};
use crate::{Result, VizorError};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Long-lived service object owning the backend registry and the HTTP
/// client. Clones share both.
#[derive(Clone)]
pub struct Model {
    registry: Arc<BackendRegistry>,
    resolver: SourceResolver,
    http: HttpClient,
}

impl Model {
    /// Create a model with the default registry and resolver.
    pub fn new() -> Result<Self> {
        let http = HttpClient::new()?;
        let registry = BackendRegistry::new(ArtifactFetcher::new(http.clone()));
        Ok(Self::with_parts(
            Arc::new(registry),
            SourceResolver::new(http.clone()),
            http,
        ))
    }

    /// Assemble a model from explicit parts.
    pub fn with_parts(
        registry: Arc<BackendRegistry>,
        resolver: SourceResolver,
        http: HttpClient,
    ) -> Self {
        Self {
            registry,
            resolver,
            http,
        }
    }

    pub fn registry(&self) -> &Arc<BackendRegistry> {
        &self.registry
    }

    /// Run inference on a JSON source field (`null` is rejected).
    pub async fn infer_value(&self, source: &Value, config: &Configuration) -> Result<Predictions> {
        let source = Source::from_value(source)?;
        self.infer(&source, config).await
    }

    /// Run inference on `source`.
    pub async fn infer(&self, source: &Source, config: &Configuration) -> Result<Predictions> {
        match config.remote_endpoint() {
            Some(endpoint) => self.infer_remote(endpoint, source, config).await,
            None => self.infer_local(source, config).await,
        }
    }

    async fn infer_local(&self, source: &Source, config: &Configuration) -> Result<Predictions> {
        info!("Running inference on {} source...", source.kind());

        let cache = CacheStore::new(config);
        let key = CacheKey::new(&source.identity(), Purpose::Inference);

        let cached = cache
            .load(&key, |value| match serde_json::from_value::<Predictions>(value) {
                Ok(predictions) => Some(predictions),
                Err(e) => {
                    warn!("Ignoring malformed cached predictions: {}", e);
                    None
                }
            })
            .await;
        if let Some(predictions) = cached {
            info!("Inference found in cache");
            return Ok(predictions);
        }

        let backend = self.registry.register(config.backend(), config).await?;
        let image = self.resolver.resolve(source, config, &cache).await?;
        debug!("Resolved image with shape {:?}", image.shape());

        let raw = tokio::task::spawn_blocking(move || backend.infer(&image))
            .await
            .map_err(|e| VizorError::Inference {
                message: format!("inference task failed: {}", e),
            })?
            .map_err(|e| VizorError::Inference {
                message: format!("{:#}", e),
            })?;

        let predictions = Predictions::from_raw(&raw);
        info!("Found {} detections", predictions.len());

        let payload = serde_json::to_value(&predictions)?;
        cache.store(&key, move || payload).await;
        Ok(predictions)
    }

    async fn infer_remote(
        &self,
        endpoint: &str,
        source: &Source,
        config: &Configuration,
    ) -> Result<Predictions> {
        info!("Delegating inference to {}", endpoint);

        let mut payload = match serde_json::to_value(config)? {
            Value::Object(fields) => fields,
            _ => serde_json::Map::new(),
        };
        payload.insert("source".to_string(), source.to_wire());

        let response = self
            .http
            .post_json(endpoint, &payload, config.timeout())
            .await?;
        let status = response.status();
        let body = response.text().await.map_err(|e| VizorError::Network {
            message: format!("Failed to read response from {}: {}", endpoint, e),
        })?;

        match status.as_u16() {
            200 => serde_json::from_str(&body).map_err(|e| VizorError::RemoteInference {
                reason: format!("invalid response from {}: {}", endpoint, e),
            }),
            400 | 500 => Err(VizorError::RemoteInference {
                reason: remote_reason(&body),
            }),
            _ => Err(VizorError::RemoteInference { reason: body }),
        }
    }
}

/// The `reason` field of an error body, or the raw body when it has none.
fn remote_reason(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| value.get("reason").and_then(Value::as_str).map(String::from))
        .unwrap_or_else(|| body.to_string())
}

//! Memoized backend construction.

use super::artifact::{installed_path, is_remote_model, ArtifactFetcher};
use super::{BackendFactory, BackendSpec, DetectionBackend};
use crate::config::ModelConfig;
use crate::configuration::Configuration;
use crate::{Result, VizorError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::OnceCell;
use tracing::{debug, info};

type Slot = Arc<OnceCell<Arc<dyn DetectionBackend>>>;

/// Table of backend factories plus the instances built from them.
///
/// Each key is constructed at most once, even when several callers ask
/// for it at the same time: the first caller builds it while the others
/// wait on the same slot. A failed construction leaves the slot empty so
/// a later call may try again. Instances are never evicted.
pub struct BackendRegistry {
    factories: RwLock<HashMap<String, BackendFactory>>,
    instances: Mutex<HashMap<String, Slot>>,
    artifacts: ArtifactFetcher,
}

impl BackendRegistry {
    /// Registry with the built-in factory installed when the `onnx` feature
    /// is enabled.
    pub fn new(artifacts: ArtifactFetcher) -> Self {
        let registry = Self {
            factories: RwLock::new(HashMap::new()),
            instances: Mutex::new(HashMap::new()),
            artifacts,
        };

        #[cfg(feature = "onnx")]
        registry.register_factory(ModelConfig::BUILTIN_BACKEND, super::onnx::factory());

        registry
    }

    /// Register (or replace) the factory for `kind`.
    ///
    /// Kinds other than the built-in one are looked up by their exact
    /// string, the way a fully qualified type reference would be.
    pub fn register_factory(&self, kind: impl Into<String>, factory: BackendFactory) {
        let kind = kind.into();
        debug!("Registered backend factory {}", kind);
        self.factories
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(kind, factory);
    }

    pub fn artifacts(&self) -> &ArtifactFetcher {
        &self.artifacts
    }

    /// Get the backend for `kind` and `config`, building it on first use.
    ///
    /// `None` or an empty kind selects the built-in backend, keyed by
    /// `(kind, model_path, model)` or by the installed artifact path when
    /// the model is a remote archive. Any other kind is keyed by its literal
    /// name. A remote archive is fetched only while its backend is first
    /// built; a memoized backend is returned without touching the file.
    pub async fn register(
        &self,
        kind: Option<&str>,
        config: &Configuration,
    ) -> Result<Arc<dyn DetectionBackend>> {
        let requested = kind.map(str::trim).filter(|k| !k.is_empty());
        let builtin = requested
            .map(|k| k.eq_ignore_ascii_case(ModelConfig::BUILTIN_BACKEND))
            .unwrap_or(true);

        let remote = builtin && is_remote_model(config.model());
        let (kind, key, model_file) = if builtin {
            let kind = ModelConfig::BUILTIN_BACKEND.to_string();
            if remote {
                let installed = installed_path(config.model(), config)?;
                let key = format!("{}-{}", kind, installed.display());
                (kind, key, installed)
            } else {
                let key = format!(
                    "{}-{}-{}",
                    kind,
                    config.model_path().display(),
                    config.model()
                );
                (kind, key, config.model_path().join(config.model()))
            }
        } else {
            let kind = requested.unwrap_or_default().to_string();
            (kind.clone(), kind, config.model_path().join(config.model()))
        };

        let slot = self.slot(&key);
        let backend = slot
            .get_or_try_init(|| async {
                let factory = self.factory(&kind)?;
                let model_file = if remote {
                    self.artifacts.fetch(config.model(), config).await?
                } else {
                    model_file
                };
                let spec = BackendSpec {
                    kind: kind.clone(),
                    configuration: config.clone(),
                    model_file,
                };
                info!("Creating {} backend for {}", kind, key);
                build(factory, spec).await
            })
            .await?;

        Ok(backend.clone())
    }

    /// Number of constructed backends.
    pub fn len(&self) -> usize {
        self.instances
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|slot| slot.initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, key: &str) -> Slot {
        self.instances
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.to_string())
            .or_default()
            .clone()
    }

    fn factory(&self, kind: &str) -> Result<BackendFactory> {
        self.factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(kind)
            .cloned()
            .ok_or_else(|| VizorError::BackendUnavailable {
                kind: kind.to_string(),
                message: if kind == ModelConfig::BUILTIN_BACKEND {
                    "no implementation available; enable the `onnx` feature or register a factory"
                        .to_string()
                } else {
                    "no backend registered under this name".to_string()
                },
            })
    }
}

async fn build(factory: BackendFactory, spec: BackendSpec) -> Result<Arc<dyn DetectionBackend>> {
    let kind = spec.kind.clone();
    let unavailable = |message: String| VizorError::BackendUnavailable {
        kind: kind.clone(),
        message,
    };

    tokio::task::spawn_blocking(move || factory(&spec))
        .await
        .map_err(|e| unavailable(format!("construction task failed: {}", e)))?
        .map_err(|e| unavailable(format!("{:#}", e)))
}

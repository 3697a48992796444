//! Detection backends and their registry.
//!
//! A backend is an opaque capability: it takes an `(height, width, 3)` image
//! and returns raw detections. Backends are built by factories registered
//! under a kind name, and the [`BackendRegistry`] memoizes one instance per
//! key for the lifetime of the process.

mod artifact;
#[cfg(feature = "onnx")]
pub mod onnx;
mod registry;

pub use artifact::{artifact_name, compute_sha256, ArtifactFetcher};
pub use registry::BackendRegistry;

use crate::configuration::Configuration;
use ndarray::Array3;
use std::path::PathBuf;
use std::sync::Arc;

/// Raw backend output, in the backend's own conventions.
///
/// Boxes are `[ymin, xmin, ymax, xmax]`, normalized to `0..1`. Class
/// indices are one-based with `0` reserved for background.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawDetections {
    pub detection_classes: Vec<i64>,
    pub detection_boxes: Vec<[f32; 4]>,
    pub detection_scores: Vec<f32>,
    pub num_detections: usize,
}

/// An object-detection model ready to run.
pub trait DetectionBackend: Send + Sync {
    fn infer(&self, image: &Array3<u8>) -> anyhow::Result<RawDetections>;
}

/// Everything a factory needs to build a backend.
#[derive(Debug, Clone)]
pub struct BackendSpec {
    /// Kind name the backend was requested under.
    pub kind: String,
    pub configuration: Configuration,
    /// Local model file: `<model_path>/<model>`, or the installed artifact
    /// when the model is a remote archive.
    pub model_file: PathBuf,
}

/// Constructor for a backend kind. Runs on a blocking thread.
pub type BackendFactory =
    Arc<dyn Fn(&BackendSpec) -> anyhow::Result<Arc<dyn DetectionBackend>> + Send + Sync>;

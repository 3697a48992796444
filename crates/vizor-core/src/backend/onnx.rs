//! ONNX Runtime adapter for object-detection-API style models.
//!
//! The graph takes a `uint8` batch named `image_tensor` shaped
//! `[1, height, width, 3]` and produces `detection_boxes`,
//! `detection_scores`, `detection_classes` and `num_detections`.

use super::{BackendFactory, BackendSpec, DetectionBackend, RawDetections};
use anyhow::Context;
use ndarray::{Array3, Axis};
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use std::path::Path;
use std::sync::{Arc, Mutex};

pub struct OnnxBackend {
    session: Mutex<Session>,
}

impl OnnxBackend {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        // Initialize ORT environment (idempotent)
        let _ = ort::init().commit();

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .commit_from_file(path)
            .with_context(|| format!("failed to load model {}", path.display()))?;

        tracing::info!("Model loaded from {}", path.display());
        Ok(Self {
            session: Mutex::new(session),
        })
    }
}

impl DetectionBackend for OnnxBackend {
    fn infer(&self, image: &Array3<u8>) -> anyhow::Result<RawDetections> {
        let batch = image.view().insert_axis(Axis(0)).into_dyn();

        let mut session = self
            .session
            .lock()
            .map_err(|_| anyhow::anyhow!("session lock poisoned"))?;
        let outputs = session.run(ort::inputs![
            "image_tensor" => TensorRef::from_array_view(batch)?
        ])?;

        let num = outputs["num_detections"].try_extract_array::<f32>()?;
        let boxes = outputs["detection_boxes"].try_extract_array::<f32>()?;
        let scores = outputs["detection_scores"].try_extract_array::<f32>()?;
        let classes = outputs["detection_classes"].try_extract_array::<f32>()?;

        let num_detections = num.iter().next().copied().unwrap_or(0.0).max(0.0) as usize;
        let available = scores.len().min(classes.len()).min(boxes.len() / 4);
        let count = num_detections.min(available);

        let boxes: Vec<f32> = boxes.iter().copied().collect();
        Ok(RawDetections {
            detection_classes: classes.iter().take(count).map(|c| *c as i64).collect(),
            detection_boxes: boxes
                .chunks_exact(4)
                .take(count)
                .map(|b| [b[0], b[1], b[2], b[3]])
                .collect(),
            detection_scores: scores.iter().take(count).copied().collect(),
            num_detections: count,
        })
    }
}

/// Factory registered as the built-in backend.
pub fn factory() -> BackendFactory {
    Arc::new(|spec: &BackendSpec| -> anyhow::Result<Arc<dyn DetectionBackend>> {
        Ok(Arc::new(OnnxBackend::load(&spec.model_file)?))
    })
}

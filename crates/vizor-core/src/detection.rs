//! Normalized detection results.

use crate::backend::RawDetections;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One detection. Serialized as `[class_id, score, xmin, ymin, xmax, ymax]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 6]", into = "[f64; 6]")]
pub struct Detection {
    /// Zero-based class index.
    pub class_id: f64,
    pub score: f64,
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

impl From<[f64; 6]> for Detection {
    fn from([class_id, score, xmin, ymin, xmax, ymax]: [f64; 6]) -> Self {
        Self {
            class_id,
            score,
            xmin,
            ymin,
            xmax,
            ymax,
        }
    }
}

impl From<Detection> for [f64; 6] {
    fn from(d: Detection) -> Self {
        [d.class_id, d.score, d.xmin, d.ymin, d.xmax, d.ymax]
    }
}

/// The result of one inference call: `{"predictions": [[...], ...]}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Predictions {
    pub predictions: Vec<Detection>,
}

impl Predictions {
    /// Normalize raw backend output.
    ///
    /// Class indices are shifted down by one; index `0` and below are the
    /// background class and dropped. Boxes are reordered from
    /// `[ymin, xmin, ymax, xmax]`. Backend order is preserved.
    pub fn from_raw(raw: &RawDetections) -> Self {
        let count = raw
            .num_detections
            .min(raw.detection_classes.len())
            .min(raw.detection_boxes.len())
            .min(raw.detection_scores.len());

        let mut predictions = Vec::with_capacity(count);
        for index in 0..count {
            let class = raw.detection_classes[index];
            if class <= 0 {
                debug!("Skipping background detection at index {}", index);
                continue;
            }

            let [ymin, xmin, ymax, xmax] = raw.detection_boxes[index];
            predictions.push(Detection {
                class_id: (class - 1) as f64,
                score: raw.detection_scores[index] as f64,
                xmin: xmin as f64,
                ymin: ymin as f64,
                xmax: xmax as f64,
                ymax: ymax as f64,
            });
        }

        Self { predictions }
    }

    pub fn len(&self) -> usize {
        self.predictions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predictions.is_empty()
    }
}

//! Boundary to the pretrained models. The pipeline only sees these traits;
//! `yolo` provides the implementations backed by `.rten` models.

pub mod yolo;

use image::RgbImage;

use crate::models::{Detection, ProbabilityMask};

pub use yolo::{Letterbox, YoloDetector, YoloParams, YoloSegmenter};

/// Finds the reference object. Implementations return candidates ordered by
/// descending confidence; an empty list means nothing was found.
pub trait ReferenceDetector: Send + Sync {
    fn detect(&self, image: &RgbImage) -> anyhow::Result<Vec<Detection>>;
}

/// Segments the defect. `None` means the model produced no mask.
pub trait DefectSegmenter: Send + Sync {
    fn segment(&self, image: &RgbImage) -> anyhow::Result<Option<ProbabilityMask>>;
}

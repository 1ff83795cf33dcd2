pub mod config;
pub mod error;
pub mod inference;
pub mod measure;
pub mod models;
pub mod pipeline;

pub use config::MeasureConfig;
pub use error::MeasureError;
pub use inference::{DefectSegmenter, ReferenceDetector};
pub use models::{BinaryMask, BoundingBox, Detection, Measurement, MeasurementReport, ProbabilityMask};
pub use pipeline::{Analysis, CrackDetector, DebugConfig};

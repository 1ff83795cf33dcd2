//! The measurement core: calibration, mask post-processing, width
//! measurement and annotation. Nothing in here touches the filesystem or
//! the models.

pub mod annotate;
pub mod calibration;
pub mod mask;
pub mod skeleton;
pub mod width;

pub use annotate::Annotator;
pub use calibration::{COIN_DIAMETER_MM, calibrate, estimate_scale, first_detection};
pub use mask::{MASK_THRESHOLD, MaskInterpolation, postprocess, threshold};
pub use skeleton::skeletonize;
pub use width::{DistanceField, WidthProfile, WidthSample, distance_field, measure_widths};

use log::debug;

use crate::error::MeasureError;
use crate::models::{BoundingBox, Detection};

/// Diameter of the reference coin in millimetres
pub const COIN_DIAMETER_MM: f64 = 18.51;

/// The detection calibration is based on. Detectors report candidates in
/// descending confidence, so this is the most confident one.
pub fn first_detection(detections: &[Detection]) -> Result<&Detection, MeasureError> {
    match detections.first() {
        Some(detection) => {
            if detections.len() > 1 {
                debug!(
                    "{} reference candidates, using the first (score {:.2})",
                    detections.len(),
                    detection.score
                );
            }
            Ok(detection)
        }
        None => Err(MeasureError::Calibration),
    }
}

/// Millimetres per pixel, treating the mean of the box's width and height as
/// the pixel diameter of a reference object `diameter_mm` across.
pub fn estimate_scale(bbox: &BoundingBox, diameter_mm: f64) -> Result<f64, MeasureError> {
    let pixel_diameter = bbox.mean_extent();
    if pixel_diameter <= 0.0 {
        debug!("Degenerate reference box {:?}", bbox);
        return Err(MeasureError::Calibration);
    }

    let scale = diameter_mm / pixel_diameter;
    if !scale.is_finite() || scale <= 0.0 {
        return Err(MeasureError::Calibration);
    }

    Ok(scale)
}

/// Both calibration steps: pick the reference and derive the scale from it
pub fn calibrate(
    detections: &[Detection],
    diameter_mm: f64,
) -> Result<(BoundingBox, f64), MeasureError> {
    let reference = first_detection(detections)?;
    let scale = estimate_scale(&reference.bbox, diameter_mm)?;
    Ok((reference.bbox, scale))
}

use image::{GrayImage, ImageBuffer, Luma};
use imageproc::distance_transform::euclidean_squared_distance_transform;
use log::debug;

use crate::error::MeasureError;
use crate::measure::skeleton::skeletonize;
use crate::models::{BinaryMask, Measurement};

/// Distance from each pixel centre to the nearest background pixel edge
pub type DistanceField = ImageBuffer<Luma<f64>, Vec<f64>>;

/// Width at one skeleton pixel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WidthSample {
    pub x: u32,
    pub y: u32,
    pub width_mm: f64,
}

/// Euclidean distance field of `mask`.
///
/// The transform runs on a frame with a one pixel background border, so the
/// image edge bounds the crack and every value is finite. Values are shifted
/// by half a pixel to measure to the background pixel's edge rather than its
/// centre: a one pixel line gets 0.5, the middle row of a band W pixels thick
/// gets W / 2. Background pixels are 0.
pub fn distance_field(mask: &BinaryMask) -> DistanceField {
    let (width, height) = mask.dimensions();

    // imageproc measures distance to the nearest non-zero pixel, so feed it
    // the background as foreground
    let background = GrayImage::from_fn(width + 2, height + 2, |x, y| {
        let inside = x >= 1 && y >= 1 && x <= width && y <= height;
        if inside && mask.is_set(x - 1, y - 1) {
            Luma([0])
        } else {
            Luma([255])
        }
    });
    let squared = euclidean_squared_distance_transform(&background);

    DistanceField::from_fn(width, height, |x, y| {
        if !mask.is_set(x, y) {
            return Luma([0.0]);
        }
        let edt = squared.get_pixel(x + 1, y + 1)[0].sqrt();
        Luma([(edt - 0.5).max(0.0)])
    })
}

/// Width at every skeleton pixel, in row-major order
pub fn sample_widths(
    skeleton: &BinaryMask,
    distance: &DistanceField,
    scale_mm_per_px: f64,
) -> Vec<WidthSample> {
    let (width, height) = skeleton.dimensions();
    let mut samples = Vec::new();
    for y in 0..height {
        for x in 0..width {
            if skeleton.is_set(x, y) {
                let width_px = 2.0 * distance.get_pixel(x, y)[0];
                samples.push(WidthSample {
                    x,
                    y,
                    width_mm: width_px * scale_mm_per_px,
                });
            }
        }
    }
    samples
}

/// Reduce samples to the maximum (first one on ties) and the mean.
/// The mean is clamped to the maximum to absorb summation rounding.
pub fn summarize(samples: &[WidthSample], scale_mm_per_px: f64) -> Result<Measurement, MeasureError> {
    let mut widest = *samples.first().ok_or(MeasureError::Measurement)?;
    let mut total = 0.0;
    for sample in samples {
        if sample.width_mm > widest.width_mm {
            widest = *sample;
        }
        total += sample.width_mm;
    }

    let mean = total / samples.len() as f64;
    Ok(Measurement {
        max_width_mm: widest.width_mm,
        avg_width_mm: mean.min(widest.width_mm),
        scale_mm_per_px,
        max_point: (widest.x, widest.y),
        samples: samples.len(),
    })
}

/// Skeleton, distance field and the measurement derived from them
#[derive(Debug, Clone)]
pub struct WidthProfile {
    pub skeleton: BinaryMask,
    pub distance: DistanceField,
    pub samples: Vec<WidthSample>,
    pub measurement: Measurement,
}

/// Measure crack width along the centreline of `mask`.
///
/// Fails with [`MeasureError::Measurement`] when the skeleton is empty.
pub fn measure_widths(mask: &BinaryMask, scale_mm_per_px: f64) -> Result<WidthProfile, MeasureError> {
    let skeleton = skeletonize(mask);
    let distance = distance_field(mask);
    let samples = sample_widths(&skeleton, &distance, scale_mm_per_px);
    debug!(
        "Skeleton has {} pixels (mask {})",
        samples.len(),
        mask.count()
    );

    let measurement = summarize(&samples, scale_mm_per_px)?;
    Ok(WidthProfile {
        skeleton,
        distance,
        samples,
        measurement,
    })
}

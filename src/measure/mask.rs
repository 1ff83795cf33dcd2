use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};
use log::debug;

use crate::error::MeasureError;
use crate::models::{BinaryMask, ProbabilityMask};

/// Probability above which a pixel counts as crack
pub const MASK_THRESHOLD: f32 = 0.5;

/// How the model-resolution mask is brought up to image resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MaskInterpolation {
    /// Threshold first, then nearest-neighbour resize. Keeps hard edges.
    #[default]
    Nearest,
    /// Bilinear resize of the probabilities, then threshold
    Linear,
}

/// Binarise a probability grid
pub fn threshold(prob: &ProbabilityMask, threshold: f32) -> BinaryMask {
    let gray = GrayImage::from_fn(prob.width(), prob.height(), |x, y| {
        if prob.get_pixel(x, y)[0] > threshold {
            Luma([BinaryMask::ON])
        } else {
            Luma([0])
        }
    });
    BinaryMask::from_gray(gray)
}

/// Nearest-neighbour resize of a binary mask; never introduces new values
pub fn resize(mask: &BinaryMask, width: u32, height: u32) -> BinaryMask {
    if mask.dimensions() == (width, height) {
        return mask.clone();
    }
    let resized = imageops::resize(mask.as_image(), width, height, FilterType::Nearest);
    BinaryMask::from_gray(resized)
}

/// Turn the segmenter's output into a binary mask at the image's dimensions.
///
/// Fails with [`MeasureError::Segmentation`] when there is no mask at all or
/// when no pixel survives thresholding.
pub fn postprocess(
    prob: Option<&ProbabilityMask>,
    width: u32,
    height: u32,
    interpolation: MaskInterpolation,
) -> Result<BinaryMask, MeasureError> {
    let prob = prob.ok_or(MeasureError::Segmentation)?;
    if prob.width() == 0 || prob.height() == 0 {
        return Err(MeasureError::Segmentation);
    }

    let mask = match interpolation {
        MaskInterpolation::Nearest => resize(&threshold(prob, MASK_THRESHOLD), width, height),
        MaskInterpolation::Linear => {
            let upscaled = if prob.dimensions() == (width, height) {
                prob.clone()
            } else {
                imageops::resize(prob, width, height, FilterType::Triangle)
            };
            threshold(&upscaled, MASK_THRESHOLD)
        }
    };

    let foreground = mask.count();
    debug!(
        "Mask {}x{} -> {}x{}, {} foreground pixels",
        prob.width(),
        prob.height(),
        width,
        height,
        foreground
    );

    if foreground == 0 {
        return Err(MeasureError::Segmentation);
    }

    Ok(mask)
}

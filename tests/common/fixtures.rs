use crackwidth::{
    BinaryMask, BoundingBox, CrackDetector, DefectSegmenter, Detection, MeasureConfig,
    ProbabilityMask, ReferenceDetector,
};
use image::{ImageBuffer, Luma, Rgb, RgbImage};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::NamedTempFile;

/// Detector that always reports the same boxes
pub struct FixedDetector {
    pub boxes: Vec<BoundingBox>,
    pub calls: AtomicUsize,
}

impl FixedDetector {
    pub fn new(boxes: Vec<BoundingBox>) -> Self {
        Self {
            boxes,
            calls: AtomicUsize::new(0),
        }
    }
}

impl ReferenceDetector for FixedDetector {
    fn detect(&self, _image: &RgbImage) -> anyhow::Result<Vec<Detection>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .boxes
            .iter()
            .enumerate()
            .map(|(i, bbox)| Detection {
                bbox: *bbox,
                score: 0.9 - i as f32 * 0.1,
            })
            .collect())
    }
}

/// Segmenter that always returns the same probability grid (or none)
pub struct FixedSegmenter {
    pub mask: Option<ProbabilityMask>,
    pub calls: AtomicUsize,
}

impl FixedSegmenter {
    pub fn new(mask: Option<ProbabilityMask>) -> Self {
        Self {
            mask,
            calls: AtomicUsize::new(0),
        }
    }
}

impl DefectSegmenter for FixedSegmenter {
    fn segment(&self, _image: &RgbImage) -> anyhow::Result<Option<ProbabilityMask>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.mask.clone())
    }
}

/// Segmenter whose model call fails
pub struct BrokenSegmenter;

impl DefectSegmenter for BrokenSegmenter {
    fn segment(&self, _image: &RgbImage) -> anyhow::Result<Option<ProbabilityMask>> {
        anyhow::bail!("tensor shape mismatch")
    }
}

/// Coin box from the calibration scenario: 50x60 px, mean 55 px
pub const COIN_BOX: BoundingBox = BoundingBox {
    x_min: 100,
    y_min: 100,
    x_max: 150,
    y_max: 160,
};

/// Plain grey 200x200 test image
pub fn grey_image() -> RgbImage {
    ImageBuffer::from_fn(200, 200, |_, _| Rgb([128u8, 128u8, 128u8]))
}

/// Probability grid with a horizontal band of `thickness` rows at `row`,
/// spanning columns `x0..x1`
pub fn band_probabilities(
    width: u32,
    height: u32,
    row: u32,
    thickness: u32,
    x0: u32,
    x1: u32,
) -> ProbabilityMask {
    ImageBuffer::from_fn(width, height, |x, y| {
        if y >= row && y < row + thickness && x >= x0 && x < x1 {
            Luma([0.95f32])
        } else {
            Luma([0.05f32])
        }
    })
}

/// Binary mask with a horizontal band
pub fn band_mask(width: u32, height: u32, row: u32, thickness: u32, x0: u32, x1: u32) -> BinaryMask {
    let mut mask = BinaryMask::new(width, height);
    for y in row..row + thickness {
        for x in x0..x1 {
            mask.set(x, y, true);
        }
    }
    mask
}

/// Detector over fixed fakes, returned with the fakes so call counts can be checked
pub fn make_detector(
    boxes: Vec<BoundingBox>,
    mask: Option<ProbabilityMask>,
) -> (CrackDetector, Arc<FixedDetector>, Arc<FixedSegmenter>) {
    let detector = Arc::new(FixedDetector::new(boxes));
    let segmenter = Arc::new(FixedSegmenter::new(mask));
    let crack_detector = CrackDetector::new(detector.clone(), segmenter.clone(), MeasureConfig::new())
        .expect("Failed to build detector");
    (crack_detector, detector, segmenter)
}

/// Writes `image` to a temporary PNG that is removed when dropped
pub fn write_temp_image(image: &RgbImage) -> NamedTempFile {
    let file = tempfile::Builder::new()
        .suffix(".png")
        .tempfile()
        .expect("Failed to create temp image file");
    image
        .save_with_format(file.path(), image::ImageFormat::Png)
        .expect("Failed to save test image");
    file
}

use image::{GrayImage, ImageBuffer, Luma};
use serde::Serialize;

/// Per-pixel crack probability at the segmenter's native resolution
pub type ProbabilityMask = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Axis-aligned box in pixel coordinates of the original image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub x_min: u32,
    pub y_min: u32,
    pub x_max: u32,
    pub y_max: u32,
}

impl BoundingBox {
    pub fn new(x_min: u32, y_min: u32, x_max: u32, y_max: u32) -> Self {
        Self { x_min, y_min, x_max, y_max }
    }

    pub fn width(&self) -> u32 {
        self.x_max.saturating_sub(self.x_min)
    }

    pub fn height(&self) -> u32 {
        self.y_max.saturating_sub(self.y_min)
    }

    /// Mean of width and height, taken as the diameter of a round object
    pub fn mean_extent(&self) -> f64 {
        (self.width() as f64 + self.height() as f64) / 2.0
    }
}

/// One detector candidate
#[derive(Debug, Clone)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub score: f32,
}

/// Binary crack mask. Pixels are stored as 0 or 255 so the buffer can be fed
/// straight into imageproc and saved for inspection; `value` reports {0,1}.
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryMask(GrayImage);

impl BinaryMask {
    pub const ON: u8 = 255;

    pub fn new(width: u32, height: u32) -> Self {
        Self(GrayImage::new(width, height))
    }

    /// Wrap an existing grayscale image, treating any non-zero pixel as set
    pub fn from_gray(mut gray: GrayImage) -> Self {
        for pixel in gray.pixels_mut() {
            if pixel[0] != 0 {
                pixel[0] = Self::ON;
            }
        }
        Self(gray)
    }

    pub fn width(&self) -> u32 {
        self.0.width()
    }

    pub fn height(&self) -> u32 {
        self.0.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.0.dimensions()
    }

    pub fn is_set(&self, x: u32, y: u32) -> bool {
        self.0.get_pixel(x, y)[0] != 0
    }

    pub fn value(&self, x: u32, y: u32) -> u8 {
        u8::from(self.is_set(x, y))
    }

    pub fn set(&mut self, x: u32, y: u32, on: bool) {
        self.0.put_pixel(x, y, Luma([if on { Self::ON } else { 0 }]));
    }

    /// Number of foreground pixels
    pub fn count(&self) -> usize {
        self.0.pixels().filter(|p| p[0] != 0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.0.pixels().all(|p| p[0] == 0)
    }

    pub fn as_image(&self) -> &GrayImage {
        &self.0
    }
}

/// Terminal numeric result of one measurement
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub max_width_mm: f64,
    pub avg_width_mm: f64,
    pub scale_mm_per_px: f64,
    /// (x, y) of the widest skeleton pixel
    pub max_point: (u32, u32),
    /// Number of skeleton pixels the widths were sampled at
    pub samples: usize,
}

/// Serialisable response for one processed image
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum MeasurementReport {
    Success {
        success: bool,
        max_width: f64,
        avg_width: f64,
        scale: f64,
        max_point: (u32, u32),
        original: String,
        annotated: String,
    },
    Failure {
        success: bool,
        error: String,
    },
}

impl MeasurementReport {
    /// Widths are rounded to 2 decimals and the scale to 4, only here
    pub fn success(measurement: &Measurement, original: String, annotated: String) -> Self {
        MeasurementReport::Success {
            success: true,
            max_width: round_to(measurement.max_width_mm, 2),
            avg_width: round_to(measurement.avg_width_mm, 2),
            scale: round_to(measurement.scale_mm_per_px, 4),
            max_point: measurement.max_point,
            original,
            annotated,
        }
    }

    pub fn failure(error: impl ToString) -> Self {
        MeasurementReport::Failure {
            success: false,
            error: error.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, MeasurementReport::Success { .. })
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

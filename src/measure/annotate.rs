use ab_glyph::{FontArc, PxScale};
use anyhow::Context;
use image::{Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_hollow_circle_mut, draw_hollow_rect_mut, draw_text_mut, text_size,
};
use imageproc::rect::Rect;
use log::debug;
use std::path::Path;

use crate::models::{BinaryMask, BoundingBox, Measurement};

const CRACK_RED: Rgb<u8> = Rgb([255, 0, 0]);
const MARKER_GREEN: Rgb<u8> = Rgb([0, 255, 0]);
const RING_WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const REFERENCE_YELLOW: Rgb<u8> = Rgb([255, 255, 0]);

const MARKER_RADIUS: i32 = 10;
const RING_RADIUS: i32 = 15;
const LINE_THICKNESS: i32 = 2;
const LABEL_OFFSET: i32 = 20;
const LABEL_SCALE: f32 = 24.0;

/// DejaVu Sans, bundled so labels render on any host
const DEFAULT_FONT: &[u8] = include_bytes!("../../fonts/DejaVuSans.ttf");

/// Draws measurement results onto a copy of the source image
pub struct Annotator {
    font: FontArc,
    overlay_alpha: f32,
}

impl Annotator {
    /// Annotator using the bundled label font
    pub fn new(overlay_alpha: f32) -> anyhow::Result<Self> {
        let font = FontArc::try_from_slice(DEFAULT_FONT).context("Failed to load bundled font")?;
        Ok(Self {
            font,
            overlay_alpha: overlay_alpha.clamp(0.0, 1.0),
        })
    }

    /// Replace the label font with the TrueType/OpenType file at `path`
    pub fn with_font(mut self, path: &Path) -> anyhow::Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read font {}", path.display()))?;
        self.font = FontArc::try_from_vec(bytes)
            .map_err(|e| anyhow::anyhow!("Invalid font {}: {}", path.display(), e))?;
        debug!("Loaded label font {}", path.display());
        Ok(self)
    }

    pub fn annotate(
        &self,
        image: &RgbImage,
        mask: &BinaryMask,
        reference: &BoundingBox,
        measurement: &Measurement,
    ) -> RgbImage {
        let mut canvas = image.clone();
        self.overlay_mask(&mut canvas, mask);

        let (width, height) = canvas.dimensions();
        let (x, y) = clamp_point(measurement.max_point, width, height);
        draw_filled_circle_mut(&mut canvas, (x, y), MARKER_RADIUS, MARKER_GREEN);
        for t in 0..LINE_THICKNESS {
            draw_hollow_circle_mut(&mut canvas, (x, y), RING_RADIUS - t, RING_WHITE);
        }

        let label = format!("MAX: {:.2}mm", measurement.max_width_mm);
        let scale = PxScale::from(LABEL_SCALE);
        let (text_w, text_h) = text_size(scale, &self.font, &label);
        let (label_x, label_y) = label_origin((x, y), (text_w, text_h), width);
        draw_text_mut(&mut canvas, MARKER_GREEN, label_x, label_y, scale, &self.font, &label);

        draw_reference_box(&mut canvas, reference);
        canvas
    }

    /// Blend the crack red into every masked pixel
    fn overlay_mask(&self, canvas: &mut RgbImage, mask: &BinaryMask) {
        let alpha = self.overlay_alpha;
        for (x, y, pixel) in canvas.enumerate_pixels_mut() {
            if x < mask.width() && y < mask.height() && mask.is_set(x, y) {
                for c in 0..3 {
                    let blended = (1.0 - alpha) * pixel[c] as f32 + alpha * CRACK_RED[c] as f32;
                    pixel[c] = blended.round().clamp(0.0, 255.0) as u8;
                }
            }
        }
    }
}

/// Keep the marker inside the image
fn clamp_point(point: (u32, u32), width: u32, height: u32) -> (i32, i32) {
    let x = point.0.min(width.saturating_sub(1));
    let y = point.1.min(height.saturating_sub(1));
    (x as i32, y as i32)
}

/// Right of the marker, or left of it when the label would run off the edge.
/// Vertically centred on the marker.
fn label_origin(point: (i32, i32), text: (u32, u32), image_width: u32) -> (i32, i32) {
    let (x, y) = point;
    let (text_w, text_h) = (text.0 as i32, text.1 as i32);

    let right = x + LABEL_OFFSET;
    let label_x = if right + text_w > image_width as i32 {
        (x - LABEL_OFFSET - text_w).max(0)
    } else {
        right
    };
    (label_x, (y - text_h / 2).max(0))
}

/// Outline covering both corners, thickening inwards
fn draw_reference_box(canvas: &mut RgbImage, bbox: &BoundingBox) {
    for t in 0..LINE_THICKNESS {
        let w = bbox.width() as i64 + 1 - 2 * t as i64;
        let h = bbox.height() as i64 + 1 - 2 * t as i64;
        if w <= 0 || h <= 0 {
            break;
        }
        let rect = Rect::at(bbox.x_min as i32 + t, bbox.y_min as i32 + t).of_size(w as u32, h as u32);
        draw_hollow_rect_mut(canvas, rect, REFERENCE_YELLOW);
    }
}

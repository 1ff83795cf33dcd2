use anyhow::{Context, Result, anyhow};
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use log::debug;
use rten::Model;
use rten_tensor::prelude::*;
use rten_tensor::{NdTensor, NdTensorView};
use std::path::Path;

use crate::inference::{DefectSegmenter, ReferenceDetector};
use crate::models::{BoundingBox, Detection, ProbabilityMask};

/// Number of mask coefficients per box in YOLO segmentation heads
pub const MASK_COEFFICIENTS: usize = 32;

const PAD_VALUE: u8 = 114;

/// Detection parameters shared by both model kinds
#[derive(Debug, Clone, Copy)]
pub struct YoloParams {
    /// Square model input size
    pub input_size: u32,
    pub confidence: f32,
    pub iou_threshold: f32,
}

impl Default for YoloParams {
    fn default() -> Self {
        Self {
            input_size: 640,
            confidence: 0.25,
            iou_threshold: 0.45,
        }
    }
}

/// Aspect-preserving fit of the source image into the square model input
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub size: u32,
    pub scale: f32,
    pub width: u32,
    pub height: u32,
    pub pad_x: u32,
    pub pad_y: u32,
}

impl Letterbox {
    pub fn fit(src_width: u32, src_height: u32, size: u32) -> Self {
        let scale = (size as f32 / src_width.max(1) as f32).min(size as f32 / src_height.max(1) as f32);
        let width = ((src_width as f32 * scale).round() as u32).clamp(1, size);
        let height = ((src_height as f32 * scale).round() as u32).clamp(1, size);
        Self {
            size,
            scale,
            width,
            height,
            pad_x: (size - width) / 2,
            pad_y: (size - height) / 2,
        }
    }

    /// Model input coordinates back to source image coordinates
    pub fn to_source(&self, x: f32, y: f32) -> (f32, f32) {
        (
            (x - self.pad_x as f32) / self.scale,
            (y - self.pad_y as f32) / self.scale,
        )
    }

    /// Resize and pad `image`, returning a normalised NCHW tensor
    pub fn apply(&self, image: &RgbImage) -> NdTensor<f32, 4> {
        let resized = imageops::resize(image, self.width, self.height, FilterType::Triangle);
        let mut canvas = RgbImage::from_pixel(self.size, self.size, Rgb([PAD_VALUE; 3]));
        imageops::overlay(&mut canvas, &resized, self.pad_x.into(), self.pad_y.into());

        let plane = (self.size * self.size) as usize;
        let mut data = vec![0f32; 3 * plane];
        for (x, y, pixel) in canvas.enumerate_pixels() {
            let idx = (y * self.size + x) as usize;
            for c in 0..3 {
                data[c * plane + idx] = pixel[c] as f32 / 255.0;
            }
        }
        NdTensor::from_data([1, 3, self.size as usize, self.size as usize], data)
    }
}

/// Candidate box in model input coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    /// Best class score
    pub score: f32,
    /// Column of the prediction tensor this box came from
    pub anchor: usize,
}

impl RawBox {
    fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }
}

pub fn iou(a: &RawBox, b: &RawBox) -> f32 {
    let x1 = a.x1.max(b.x1);
    let y1 = a.y1.max(b.y1);
    let x2 = a.x2.min(b.x2);
    let y2 = a.y2.min(b.y2);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = a.area() + b.area() - intersection;
    if union > 0.0 { intersection / union } else { 0.0 }
}

/// Greedy non-maximum suppression. Output is sorted by descending score.
pub fn non_maximum_suppression(mut boxes: Vec<RawBox>, iou_threshold: f32) -> Vec<RawBox> {
    boxes.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut kept: Vec<RawBox> = Vec::new();
    for candidate in boxes {
        if kept.iter().all(|k| iou(k, &candidate) <= iou_threshold) {
            kept.push(candidate);
        }
    }
    kept
}

/// Decode a `[1, 4 + classes + mask_coefficients, anchors]` prediction tensor
/// into boxes above `confidence`. The first four rows are centre x, centre y,
/// width and height.
pub fn decode_boxes(
    preds: NdTensorView<f32, 3>,
    mask_coefficients: usize,
    confidence: f32,
) -> Result<Vec<RawBox>> {
    let channels = preds.size(1);
    let anchors = preds.size(2);
    if channels <= 4 + mask_coefficients {
        anyhow::bail!(
            "Prediction tensor has {} channels, expected more than {}",
            channels,
            4 + mask_coefficients
        );
    }
    let classes = channels - 4 - mask_coefficients;

    let mut boxes = Vec::new();
    for n in 0..anchors {
        let score = (0..classes)
            .map(|c| preds[[0, 4 + c, n]])
            .fold(f32::MIN, f32::max);
        if score <= confidence {
            continue;
        }

        let (cx, cy) = (preds[[0, 0, n]], preds[[0, 1, n]]);
        let (w, h) = (preds[[0, 2, n]], preds[[0, 3, n]]);
        boxes.push(RawBox {
            x1: cx - w / 2.0,
            y1: cy - h / 2.0,
            x2: cx + w / 2.0,
            y2: cy + h / 2.0,
            score,
            anchor: n,
        });
    }
    Ok(boxes)
}

/// Map a model-space box to integer source image coordinates, truncating
pub fn to_source_box(raw: &RawBox, letterbox: &Letterbox, src_width: u32, src_height: u32) -> BoundingBox {
    let (x1, y1) = letterbox.to_source(raw.x1, raw.y1);
    let (x2, y2) = letterbox.to_source(raw.x2, raw.y2);
    let clamp_x = |v: f32| v.clamp(0.0, src_width as f32) as u32;
    let clamp_y = |v: f32| v.clamp(0.0, src_height as f32) as u32;
    BoundingBox::new(clamp_x(x1), clamp_y(y1), clamp_x(x2), clamp_y(y2))
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Probability mask of one box: its coefficients against the prototypes,
/// sigmoid, zero outside the box. Only the part of the prototype grid that
/// covers image content (not letterbox padding) is returned, so resizing it
/// to the source dimensions lines it up with the image.
pub fn decode_mask(
    preds: NdTensorView<f32, 3>,
    protos: NdTensorView<f32, 4>,
    raw: &RawBox,
    letterbox: &Letterbox,
) -> Result<ProbabilityMask> {
    let coefficients = protos.size(1);
    let (proto_h, proto_w) = (protos.size(2), protos.size(3));
    let first_coefficient = preds
        .size(1)
        .checked_sub(coefficients)
        .ok_or_else(|| anyhow!("Prototype count {} exceeds prediction channels", coefficients))?;

    let coeffs: Vec<f32> = (0..coefficients)
        .map(|k| preds[[0, first_coefficient + k, raw.anchor]])
        .collect();

    let rx = proto_w as f32 / letterbox.size as f32;
    let ry = proto_h as f32 / letterbox.size as f32;
    let x0 = (letterbox.pad_x as f32 * rx).floor() as usize;
    let y0 = (letterbox.pad_y as f32 * ry).floor() as usize;
    let x1 = (((letterbox.pad_x + letterbox.width) as f32 * rx).ceil() as usize).clamp(x0 + 1, proto_w);
    let y1 = (((letterbox.pad_y + letterbox.height) as f32 * ry).ceil() as usize).clamp(y0 + 1, proto_h);

    let mask = ProbabilityMask::from_fn((x1 - x0) as u32, (y1 - y0) as u32, |x, y| {
        let px = x0 + x as usize;
        let py = y0 + y as usize;
        // Centre of the prototype cell in model input coordinates
        let lx = (px as f32 + 0.5) / rx;
        let ly = (py as f32 + 0.5) / ry;
        if lx < raw.x1 || lx >= raw.x2 || ly < raw.y1 || ly >= raw.y2 {
            return image::Luma([0.0]);
        }
        let logit: f32 = coeffs
            .iter()
            .enumerate()
            .map(|(k, c)| c * protos[[0, k, py, px]])
            .sum();
        image::Luma([sigmoid(logit)])
    });

    Ok(mask)
}

fn load_model(path: &Path) -> Result<Model> {
    Model::load_file(path).with_context(|| format!("Failed to load model {}", path.display()))
}

/// Run `model` on one letterboxed image and return its outputs in declaration order
fn run_outputs<const A: usize, const B: usize>(
    model: &Model,
    input: NdTensor<f32, 4>,
) -> Result<(NdTensor<f32, A>, Option<NdTensor<f32, B>>)> {
    let input_id = *model
        .input_ids()
        .first()
        .ok_or_else(|| anyhow!("Model has no inputs"))?;

    let mut outputs = model.run(vec![(input_id, input.view().into())], model.output_ids(), None)?;
    if outputs.is_empty() {
        anyhow::bail!("Model produced no outputs");
    }

    let first: NdTensor<f32, A> = outputs
        .remove(0)
        .try_into()
        .map_err(|_| anyhow!("Model output 0 is not a rank {} float tensor", A))?;

    let second = if outputs.is_empty() {
        None
    } else {
        let tensor: NdTensor<f32, B> = outputs
            .remove(0)
            .try_into()
            .map_err(|_| anyhow!("Model output 1 is not a rank {} float tensor", B))?;
        Some(tensor)
    };

    Ok((first, second))
}

/// Reference-object detector running a YOLO detection model
pub struct YoloDetector {
    model: Model,
    params: YoloParams,
}

impl YoloDetector {
    pub fn new(model: Model, params: YoloParams) -> Self {
        Self { model, params }
    }

    pub fn load(path: &Path, params: YoloParams) -> Result<Self> {
        Ok(Self::new(load_model(path)?, params))
    }
}

impl ReferenceDetector for YoloDetector {
    fn detect(&self, image: &RgbImage) -> Result<Vec<Detection>> {
        let (width, height) = image.dimensions();
        let letterbox = Letterbox::fit(width, height, self.params.input_size);

        let (preds, _) = run_outputs::<3, 4>(&self.model, letterbox.apply(image))?;
        let raw = decode_boxes(preds.view(), 0, self.params.confidence)?;
        let kept = non_maximum_suppression(raw, self.params.iou_threshold);
        debug!("Reference detector: {} boxes after NMS", kept.len());

        Ok(kept
            .iter()
            .map(|b| Detection {
                bbox: to_source_box(b, &letterbox, width, height),
                score: b.score,
            })
            .collect())
    }
}

/// Defect segmenter running a YOLO segmentation model
pub struct YoloSegmenter {
    model: Model,
    params: YoloParams,
}

impl YoloSegmenter {
    pub fn new(model: Model, params: YoloParams) -> Self {
        Self { model, params }
    }

    pub fn load(path: &Path, params: YoloParams) -> Result<Self> {
        Ok(Self::new(load_model(path)?, params))
    }
}

impl DefectSegmenter for YoloSegmenter {
    fn segment(&self, image: &RgbImage) -> Result<Option<ProbabilityMask>> {
        let (width, height) = image.dimensions();
        let letterbox = Letterbox::fit(width, height, self.params.input_size);

        let (preds, protos) = run_outputs::<3, 4>(&self.model, letterbox.apply(image))?;
        let protos = protos.ok_or_else(|| anyhow!("Segmentation model has no prototype output"))?;

        let raw = decode_boxes(preds.view(), protos.size(1), self.params.confidence)?;
        let kept = non_maximum_suppression(raw, self.params.iou_threshold);
        debug!("Defect segmenter: {} instances after NMS", kept.len());

        match kept.first() {
            Some(best) => Ok(Some(decode_mask(preds.view(), protos.view(), best, &letterbox)?)),
            None => Ok(None),
        }
    }
}

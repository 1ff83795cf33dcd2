use image::{DynamicImage, GrayImage, ImageReader, Luma, RgbImage};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::MeasureConfig;
use crate::error::MeasureError;
use crate::inference::{DefectSegmenter, ReferenceDetector, YoloDetector, YoloSegmenter};
use crate::measure::{self, Annotator, WidthProfile};
use crate::models::{BinaryMask, BoundingBox, Measurement};

/// Debug configuration for pipeline execution
#[derive(Clone, Debug)]
pub struct DebugConfig {
    /// Root directory for debug outputs
    pub output_dir: PathBuf,
}

impl DebugConfig {
    /// Save one stage image as `NN_stage_name/01.png`
    fn save(&self, index: usize, stage: &str, image: &DynamicImage) -> anyhow::Result<()> {
        let step_dir_name = format!("{:02}_{}", index, stage.to_lowercase().replace(' ', "_"));
        let step_dir = self.output_dir.join(&step_dir_name);
        std::fs::create_dir_all(&step_dir)?;

        image
            .save(step_dir.join("01.png"))
            .map_err(|e| anyhow::anyhow!("Failed to save debug image: {}", e))?;
        debug!("Debug: saved {}/01.png", step_dir_name);
        Ok(())
    }
}

/// Everything one successful measurement produced
#[derive(Debug, Clone)]
pub struct Analysis {
    pub reference: BoundingBox,
    pub mask: BinaryMask,
    pub profile: WidthProfile,
}

impl Analysis {
    pub fn measurement(&self) -> &Measurement {
        &self.profile.measurement
    }
}

/// The crack measurement service.
///
/// Holds both models for the life of the process. Models are only read, so
/// one instance can serve any number of images, from any number of threads.
pub struct CrackDetector {
    detector: Arc<dyn ReferenceDetector>,
    segmenter: Arc<dyn DefectSegmenter>,
    annotator: Annotator,
    config: MeasureConfig,
    debug: Option<DebugConfig>,
}

impl CrackDetector {
    pub fn new(
        detector: Arc<dyn ReferenceDetector>,
        segmenter: Arc<dyn DefectSegmenter>,
        config: MeasureConfig,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            detector,
            segmenter,
            annotator: Annotator::new(config.overlay_alpha)?,
            config,
            debug: None,
        })
    }

    /// Load both `.rten` models and the label font described by `config`
    pub fn from_config(config: MeasureConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let (coin_path, crack_path) = config.resolve_model_paths()?;

        info!("Loading reference model {}", coin_path.display());
        let detector = YoloDetector::load(&coin_path, config.detector)?;
        info!("Loading crack model {}", crack_path.display());
        let segmenter = YoloSegmenter::load(&crack_path, config.segmenter)?;

        let font_path = config.font_path.clone();
        let service = Self::new(Arc::new(detector), Arc::new(segmenter), config)?;
        match font_path {
            Some(path) => service.with_font(&path),
            None => Ok(service),
        }
    }

    /// Replace the bundled label font; see [`Annotator::with_font`]
    pub fn with_font(mut self, path: &Path) -> anyhow::Result<Self> {
        self.annotator = self.annotator.with_font(path)?;
        Ok(self)
    }

    /// Enable debug mode with output directory.
    /// The directory must be empty or non-existent.
    pub fn with_debug(mut self, output_dir: PathBuf) -> anyhow::Result<Self> {
        if output_dir.exists() {
            let entries = std::fs::read_dir(&output_dir)?;
            if entries.count() > 0 {
                return Err(anyhow::anyhow!(
                    "Debug directory is not empty: {}",
                    output_dir.display()
                ));
            }
        } else {
            std::fs::create_dir_all(&output_dir)?;
        }

        self.debug = Some(DebugConfig { output_dir });
        Ok(self)
    }

    fn save_debug(&self, index: usize, stage: &str, image: impl FnOnce() -> DynamicImage) {
        if let Some(debug_config) = &self.debug {
            if let Err(e) = debug_config.save(index, stage, &image()) {
                warn!("{:#}", e);
            }
        }
    }

    /// Calibrate, segment and measure. Stops at the first failing stage.
    pub fn measure(&self, image: &RgbImage) -> Result<Analysis, MeasureError> {
        let (width, height) = image.dimensions();
        self.save_debug(0, "input", || DynamicImage::ImageRgb8(image.clone()));

        // Step 1: reference object and scale
        let detections = self.detector.detect(image).map_err(MeasureError::inference)?;
        debug!("Reference detector returned {} candidates", detections.len());
        let (reference, scale) =
            measure::calibrate(&detections, self.config.reference_diameter_mm)?;
        debug!("Reference box {:?}, scale {:.4} mm/px", reference, scale);

        // Step 2: crack mask at image resolution
        let prob = self.segmenter.segment(image).map_err(MeasureError::inference)?;
        let mask = measure::postprocess(prob.as_ref(), width, height, self.config.interpolation)?;
        self.save_debug(1, "mask", || DynamicImage::ImageLuma8(mask.as_image().clone()));

        // Step 3: widths along the centreline
        let profile = measure::measure_widths(&mask, scale)?;
        self.save_debug(2, "skeleton", || {
            DynamicImage::ImageLuma8(profile.skeleton.as_image().clone())
        });
        self.save_debug(3, "distance", || {
            DynamicImage::ImageLuma8(normalize_distance(&profile.distance))
        });

        let m = &profile.measurement;
        info!(
            "Max width {:.2} mm at ({}, {}), average {:.2} mm over {} samples",
            m.max_width_mm, m.max_point.0, m.max_point.1, m.avg_width_mm, m.samples
        );

        Ok(Analysis {
            reference,
            mask,
            profile,
        })
    }

    /// Draw the analysis onto a copy of `image`
    pub fn annotate(&self, image: &RgbImage, analysis: &Analysis) -> RgbImage {
        let annotated = self.annotator.annotate(
            image,
            &analysis.mask,
            &analysis.reference,
            analysis.measurement(),
        );
        self.save_debug(4, "annotated", || DynamicImage::ImageRgb8(annotated.clone()));
        annotated
    }

    /// Read `input`, measure it and write the annotated result to `output`.
    /// Nothing is written unless the measurement succeeds.
    pub fn process_image(&self, input: &Path, output: &Path) -> Result<Measurement, MeasureError> {
        let image = read_image(input)?;
        let analysis = self.measure(&image)?;
        let annotated = self.annotate(&image, &analysis);

        annotated
            .save(output)
            .map_err(|e| MeasureError::ImageWrite(e.to_string()))?;
        info!("Annotated image written to {}", output.display());

        Ok(analysis.profile.measurement)
    }
}

/// Decode any supported image file to RGB
pub fn read_image(path: &Path) -> Result<RgbImage, MeasureError> {
    let reader = ImageReader::open(path)
        .and_then(|r| r.with_guessed_format())
        .map_err(|e| {
            debug!("Cannot open {}: {}", path.display(), e);
            MeasureError::ImageRead
        })?;
    let image = reader.decode().map_err(|e| {
        debug!("Cannot decode {}: {}", path.display(), e);
        MeasureError::ImageRead
    })?;
    Ok(image.to_rgb8())
}

/// `result_<name>` next to the input
pub fn default_output_path(input: &Path) -> PathBuf {
    let name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image.png".to_string());
    input.with_file_name(format!("result_{}", name))
}

/// Scale a distance field to 0..=255 for viewing
fn normalize_distance(field: &measure::DistanceField) -> GrayImage {
    let max = field.pixels().map(|p| p[0]).fold(0.0, f64::max);
    GrayImage::from_fn(field.width(), field.height(), |x, y| {
        if max <= 0.0 {
            Luma([0])
        } else {
            Luma([(field.get_pixel(x, y)[0] / max * 255.0).round() as u8])
        }
    })
}

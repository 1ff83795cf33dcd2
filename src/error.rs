use thiserror::Error;

/// Terminal failures of the measurement pipeline.
///
/// Every stage either produces its value or one of these; nothing partial
/// (a scale without a width, say) ever leaves the pipeline.
#[derive(Debug, Error)]
pub enum MeasureError {
    #[error("Error: Could not read image.")]
    ImageRead,

    /// No usable reference object: zero detections, or a degenerate box
    #[error("Reference coin not found.")]
    Calibration,

    /// Segmenter returned no mask, or nothing survived thresholding
    #[error("No cracks detected.")]
    Segmentation,

    /// Mask was non-empty but thinned to nothing
    #[error("Measurement failed.")]
    Measurement,

    #[error("Could not write annotated image: {0}")]
    ImageWrite(String),

    #[error("Inference failed: {0}")]
    Inference(String),
}

impl MeasureError {
    pub(crate) fn inference(err: anyhow::Error) -> Self {
        MeasureError::Inference(format!("{:#}", err))
    }
}

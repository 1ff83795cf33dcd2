use std::path::{Path, PathBuf};

use crate::inference::YoloParams;
use crate::measure::{COIN_DIAMETER_MM, MaskInterpolation};

/// Overrides the directory the models are looked up in
pub const MODEL_DIR_ENV: &str = "CRACKWIDTH_MODEL_DIR";

pub const COIN_MODEL_FILE: &str = "coin.rten";
pub const CRACK_MODEL_FILE: &str = "crack.rten";

/// Everything that shapes a measurement run
#[derive(Debug, Clone)]
pub struct MeasureConfig {
    /// Physical diameter of the reference object
    pub reference_diameter_mm: f64,
    pub interpolation: MaskInterpolation,
    /// Opacity of the red crack overlay
    pub overlay_alpha: f32,
    /// Label font; the bundled DejaVu Sans when unset
    pub font_path: Option<PathBuf>,
    pub coin_model: Option<PathBuf>,
    pub crack_model: Option<PathBuf>,
    pub detector: YoloParams,
    pub segmenter: YoloParams,
}

impl MeasureConfig {
    pub fn new() -> Self {
        Self {
            reference_diameter_mm: COIN_DIAMETER_MM,
            interpolation: MaskInterpolation::Nearest,
            overlay_alpha: 0.4,
            font_path: None,
            coin_model: None,
            crack_model: None,
            detector: YoloParams::default(),
            segmenter: YoloParams::default(),
        }
    }

    pub fn with_reference_diameter(mut self, diameter_mm: f64) -> Self {
        self.reference_diameter_mm = diameter_mm;
        self
    }

    pub fn with_interpolation(mut self, interpolation: MaskInterpolation) -> Self {
        self.interpolation = interpolation;
        self
    }

    pub fn with_overlay_alpha(mut self, alpha: f32) -> Self {
        self.overlay_alpha = alpha;
        self
    }

    pub fn with_font(mut self, path: Option<PathBuf>) -> Self {
        self.font_path = path;
        self
    }

    pub fn with_models(mut self, coin: Option<PathBuf>, crack: Option<PathBuf>) -> Self {
        self.coin_model = coin;
        self.crack_model = crack;
        self
    }

    /// Reject values that would make every measurement meaningless
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(self.reference_diameter_mm.is_finite() && self.reference_diameter_mm > 0.0) {
            anyhow::bail!(
                "Reference diameter must be a positive number of millimetres, got {}",
                self.reference_diameter_mm
            );
        }
        if !(0.0..=1.0).contains(&self.overlay_alpha) {
            anyhow::bail!("Overlay alpha must be within 0..=1, got {}", self.overlay_alpha);
        }
        Ok(())
    }

    /// Paths of the coin and crack models.
    ///
    /// Explicit paths win; otherwise both files are expected in
    /// `$CRACKWIDTH_MODEL_DIR`, falling back to `~/.cache/crackwidth`.
    pub fn resolve_model_paths(&self) -> anyhow::Result<(PathBuf, PathBuf)> {
        let model_dir = default_model_dir();
        let coin = self
            .coin_model
            .clone()
            .or_else(|| model_dir.as_ref().map(|d| d.join(COIN_MODEL_FILE)));
        let crack = self
            .crack_model
            .clone()
            .or_else(|| model_dir.as_ref().map(|d| d.join(CRACK_MODEL_FILE)));

        match (coin, crack) {
            (Some(coin), Some(crack)) if coin.exists() && crack.exists() => Ok((coin, crack)),
            (coin, crack) => {
                let describe = |p: &Option<PathBuf>| {
                    p.as_deref()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| "<unset>".to_string())
                };
                anyhow::bail!(
                    "Models not found. Pass --coin-model/--crack-model or set {}.\n\
                     Expected locations:\n  - {}\n  - {}",
                    MODEL_DIR_ENV,
                    describe(&coin),
                    describe(&crack)
                )
            }
        }
    }
}

impl Default for MeasureConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn default_model_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(MODEL_DIR_ENV) {
        return Some(PathBuf::from(dir));
    }
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .ok()
        .map(|home| Path::new(&home).join(".cache/crackwidth"))
}

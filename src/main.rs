use clap::Parser;
use log::error;
use std::path::PathBuf;
use tracing_subscriber::filter::LevelFilter;

use crackwidth::measure::MaskInterpolation;
use crackwidth::pipeline::default_output_path;
use crackwidth::{CrackDetector, MeasureConfig, MeasurementReport};

#[derive(Parser)]
#[command(name = "crackwidth")]
#[command(about = "Measure crack width against a reference coin")]
struct Cli {
    /// Images to measure
    #[arg(value_name = "IMAGE", required = true)]
    images: Vec<PathBuf>,

    /// Annotated output path (single image only; default: result_<name> next to the input)
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Write annotated images into this directory instead
    #[arg(long, value_name = "DIR")]
    out_dir: Option<PathBuf>,

    /// Reference coin detection model (.rten)
    #[arg(long, value_name = "PATH")]
    coin_model: Option<PathBuf>,

    /// Crack segmentation model (.rten)
    #[arg(long, value_name = "PATH")]
    crack_model: Option<PathBuf>,

    /// Diameter of the reference coin in millimetres
    #[arg(long, value_name = "MM", default_value_t = crackwidth::measure::COIN_DIAMETER_MM)]
    reference_diameter: f64,

    /// How the mask is scaled up to image resolution
    #[arg(long, value_enum, default_value = "nearest")]
    interpolation: InterpolationArg,

    /// Opacity of the red crack overlay
    #[arg(long, value_name = "ALPHA", default_value_t = 0.4)]
    overlay_alpha: f32,

    /// Font for the width label (default: bundled DejaVu Sans)
    #[arg(long, value_name = "PATH")]
    font: Option<PathBuf>,

    /// Print one JSON object per image instead of text
    #[arg(long)]
    json: bool,

    /// Save debug outputs to directory (must be empty)
    #[arg(long, value_name = "DIR")]
    debug_out: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum InterpolationArg {
    Nearest,
    Linear,
}

impl From<InterpolationArg> for MaskInterpolation {
    fn from(arg: InterpolationArg) -> Self {
        match arg {
            InterpolationArg::Nearest => MaskInterpolation::Nearest,
            InterpolationArg::Linear => MaskInterpolation::Linear,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if args.verbose { LevelFilter::DEBUG } else { LevelFilter::INFO })
        .with_writer(std::io::stderr)
        .init();

    if args.output.is_some() && args.images.len() > 1 {
        anyhow::bail!("--output can only be used with a single image; use --out-dir");
    }
    if args.debug_out.is_some() && args.images.len() > 1 {
        anyhow::bail!("--debug-out can only be used with a single image");
    }

    let config = MeasureConfig::new()
        .with_reference_diameter(args.reference_diameter)
        .with_interpolation(args.interpolation.into())
        .with_overlay_alpha(args.overlay_alpha)
        .with_font(args.font.clone())
        .with_models(args.coin_model.clone(), args.crack_model.clone());

    // Models are loaded once and reused for every image
    let mut detector = CrackDetector::from_config(config)?;
    if let Some(debug_dir) = args.debug_out.clone() {
        detector = detector.with_debug(debug_dir)?;
    }

    if let Some(dir) = &args.out_dir {
        std::fs::create_dir_all(dir)?;
    }

    let mut failures = 0;
    for input in &args.images {
        let output = match (&args.output, &args.out_dir) {
            (Some(path), _) => path.clone(),
            (None, Some(dir)) => dir.join(
                default_output_path(input)
                    .file_name()
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("result.png")),
            ),
            (None, None) => default_output_path(input),
        };

        let report = match detector.process_image(input, &output) {
            Ok(measurement) => MeasurementReport::success(
                &measurement,
                input.display().to_string(),
                output.display().to_string(),
            ),
            Err(e) => {
                error!("{}: {}", input.display(), e);
                failures += 1;
                MeasurementReport::failure(e)
            }
        };

        if args.json {
            println!("{}", serde_json::to_string(&report)?);
        } else {
            print_report(input, &report);
        }
    }

    if failures > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn print_report(input: &std::path::Path, report: &MeasurementReport) {
    println!("\n=== {} ===", input.display());
    match report {
        MeasurementReport::Success {
            max_width,
            avg_width,
            scale,
            max_point,
            annotated,
            ..
        } => {
            println!("Max width:     {:.2} mm at ({}, {})", max_width, max_point.0, max_point.1);
            println!("Average width: {:.2} mm", avg_width);
            println!("Scale:         {:.4} mm/px", scale);
            println!("Annotated:     {}", annotated);
        }
        MeasurementReport::Failure { error, .. } => {
            println!("Failed: {}", error);
        }
    }
}

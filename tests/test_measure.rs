//! Tests for the measurement core.
//!
//! Tests cover:
//! - Scale calibration from the reference box
//! - Mask thresholding and resizing
//! - Skeleton and distance-field properties
//! - Width statistics and the failure paths of each stage

mod common;

use crackwidth::measure::{
    self, COIN_DIAMETER_MM, MASK_THRESHOLD, MaskInterpolation, distance_field, skeletonize,
};
use crackwidth::{BinaryMask, BoundingBox, Detection, MeasureError};
use image::{ImageBuffer, Luma};

use common::*;

#[test]
fn test_scale_from_coin_box() {
    let scale = measure::estimate_scale(&COIN_BOX, COIN_DIAMETER_MM).unwrap();

    // 50 x 60 box -> mean 55 px
    assert!((scale - 18.51 / 55.0).abs() < 1e-12);
    assert!((scale - 0.3365).abs() < 1e-4);
}

#[test]
fn test_scale_is_positive_and_finite_for_valid_boxes() {
    for (w, h) in [(1, 1), (1, 0), (3, 500), (640, 480), (4000, 1)] {
        let bbox = BoundingBox::new(10, 20, 10 + w, 20 + h);
        let scale = measure::estimate_scale(&bbox, COIN_DIAMETER_MM).unwrap();
        assert!(scale.is_finite() && scale > 0.0, "box {}x{} gave {}", w, h, scale);
    }
}

#[test]
fn test_degenerate_box_fails_calibration() {
    let bbox = BoundingBox::new(42, 42, 42, 42);
    let result = measure::estimate_scale(&bbox, COIN_DIAMETER_MM);
    assert!(matches!(result, Err(MeasureError::Calibration)));
}

#[test]
fn test_no_detections_fails_calibration() {
    let result = measure::calibrate(&[], COIN_DIAMETER_MM);
    assert!(matches!(result, Err(MeasureError::Calibration)));
    assert_eq!(
        MeasureError::Calibration.to_string(),
        "Reference coin not found."
    );
}

#[test]
fn test_calibration_uses_first_detection() {
    let detections = vec![
        Detection { bbox: COIN_BOX, score: 0.8 },
        Detection { bbox: BoundingBox::new(0, 0, 10, 10), score: 0.7 },
    ];
    let (reference, scale) = measure::calibrate(&detections, COIN_DIAMETER_MM).unwrap();
    assert_eq!(reference, COIN_BOX);
    assert!((scale - 18.51 / 55.0).abs() < 1e-12);
}

#[test]
fn test_thresholding_binary_grid_is_identity() {
    let prob = ImageBuffer::from_fn(17, 9, |x, y| Luma([if (x * 3 + y) % 4 == 0 { 1.0f32 } else { 0.0 }]));
    let mask = measure::threshold(&prob, MASK_THRESHOLD);

    assert_eq!(mask.dimensions(), (17, 9));
    for (x, y, p) in prob.enumerate_pixels() {
        assert_eq!(mask.value(x, y), p[0] as u8, "pixel ({}, {})", x, y);
    }
}

#[test]
fn test_missing_mask_fails_segmentation() {
    let result = measure::postprocess(None, 100, 100, MaskInterpolation::Nearest);
    assert!(matches!(result, Err(MeasureError::Segmentation)));
}

#[test]
fn test_low_probabilities_fail_segmentation() {
    let prob = ImageBuffer::from_pixel(32, 32, Luma([0.49f32]));
    for interpolation in [MaskInterpolation::Nearest, MaskInterpolation::Linear] {
        let result = measure::postprocess(Some(&prob), 128, 128, interpolation);
        assert!(matches!(result, Err(MeasureError::Segmentation)));
    }
}

#[test]
fn test_mask_is_resized_to_image_dimensions() -> anyhow::Result<()> {
    // 1. Quarter resolution band, 2 rows thick
    let prob = band_probabilities(50, 40, 10, 2, 5, 45);

    // 2. Nearest neighbour: band scales by exactly 4
    let mask = measure::postprocess(Some(&prob), 200, 160, MaskInterpolation::Nearest)?;
    assert_eq!(mask.dimensions(), (200, 160));
    assert_eq!(mask.count(), 8 * 160);
    assert!(mask.is_set(100, 40));
    assert!(!mask.is_set(100, 39));

    // 3. Linear: still strictly binary, band lands in the same place
    let linear = measure::postprocess(Some(&prob), 200, 160, MaskInterpolation::Linear)?;
    assert_eq!(linear.dimensions(), (200, 160));
    assert!(linear.is_set(100, 44));
    assert!(linear.as_image().pixels().all(|p| p[0] == 0 || p[0] == BinaryMask::ON));

    Ok(())
}

#[test]
fn test_empty_mask_fails_measurement() {
    let mask = BinaryMask::new(64, 64);
    let result = measure::measure_widths(&mask, 0.25);
    assert!(matches!(result, Err(MeasureError::Measurement)));
}

#[test]
fn test_small_blob_still_measures() -> anyhow::Result<()> {
    // 2x2 block keeps a single centreline pixel
    let mask = band_mask(10, 10, 4, 2, 4, 6);
    let profile = measure::measure_widths(&mask, 0.25)?;
    assert_eq!(profile.measurement.samples, 1);
    assert!((profile.measurement.max_width_mm - 0.25).abs() < 1e-12);
    Ok(())
}

#[test]
fn test_two_pixel_diagonal_crack_is_measured_along_its_length() -> anyhow::Result<()> {
    // 1. 48 steps of (i, i) and (i + 1, i)
    let mut mask = BinaryMask::new(60, 60);
    for i in 5..53 {
        mask.set(i, i, true);
        mask.set(i + 1, i, true);
    }

    // 2. Roughly one sample per diagonal step, all inside the crack
    let profile = measure::measure_widths(&mask, 1.0)?;
    assert!(profile.samples.len() >= 46, "only {} samples", profile.samples.len());
    assert_eq!(profile.samples.len(), profile.measurement.samples);
    for sample in &profile.samples {
        assert!(mask.is_set(sample.x, sample.y));
        assert!((sample.width_mm - 1.0).abs() < 1e-9);
    }

    // 3. Centreline stays connected: consecutive rows touch
    for pair in profile.samples.windows(2) {
        assert!(pair[1].y <= pair[0].y + 1);
        assert!(pair[1].x.abs_diff(pair[0].x) <= 1 || pair[1].y == pair[0].y);
    }

    Ok(())
}

#[test]
fn test_uniform_band_average_never_exceeds_max() -> anyhow::Result<()> {
    let mask = band_mask(200, 200, 100, 5, 20, 180);
    let profile = measure::measure_widths(&mask, COIN_DIAMETER_MM / 55.0)?;

    let m = &profile.measurement;
    assert!(m.avg_width_mm <= m.max_width_mm, "avg {} > max {}", m.avg_width_mm, m.max_width_mm);
    Ok(())
}

#[test]
fn test_thin_line_measures_one_pixel() -> anyhow::Result<()> {
    // 1. 100 px long, 1 px wide
    let mask = band_mask(120, 20, 10, 1, 10, 110);
    let scale = 18.51 / 55.0;

    // 2. The line is its own skeleton, half a pixel from the background
    let skeleton = skeletonize(&mask);
    assert_eq!(skeleton, mask);
    let field = distance_field(&mask);
    for x in 10..110 {
        assert!((field.get_pixel(x, 10)[0] - 0.5).abs() < 1e-9);
    }

    // 3. Width is one pixel in millimetres everywhere
    let profile = measure::measure_widths(&mask, scale)?;
    let m = &profile.measurement;
    assert_eq!(m.samples, 100);
    assert!((m.max_width_mm - scale).abs() < 1e-12);
    assert!((m.avg_width_mm - scale).abs() < 1e-12);
    assert_eq!(m.max_point, (10, 10));

    Ok(())
}

#[test]
fn test_widest_section_is_found() -> anyhow::Result<()> {
    // 3 px thick on the left, 7 px thick on the right, sharing a centre row
    let mut mask = band_mask(120, 40, 20, 3, 10, 60);
    for y in 18..25 {
        for x in 60..110 {
            mask.set(x, y, true);
        }
    }

    let profile = measure::measure_widths(&mask, 0.5)?;
    let m = &profile.measurement;
    assert!((m.max_width_mm - 7.0 * 0.5).abs() < 1e-9);
    assert!(m.max_point.0 >= 60 && m.max_point.0 < 110);
    assert_eq!(m.max_point.1, 21);
    assert!(m.avg_width_mm < m.max_width_mm);
    assert!(m.avg_width_mm > 0.0);

    Ok(())
}

#[test]
fn test_skeleton_is_subset_of_mask() {
    let mut shapes = vec![
        band_mask(80, 30, 5, 9, 3, 77),
        band_mask(30, 30, 0, 30, 0, 30),
    ];

    // Diagonal stroke, 4 px thick
    let mut diagonal = BinaryMask::new(60, 60);
    for i in 0..55u32 {
        for t in 0..4u32 {
            diagonal.set(i, (i + t).min(59), true);
        }
    }
    shapes.push(diagonal);

    // Filled disc
    let mut disc = BinaryMask::new(41, 41);
    for y in 0..41i32 {
        for x in 0..41i32 {
            if (x - 20).pow(2) + (y - 20).pow(2) <= 15 * 15 {
                disc.set(x as u32, y as u32, true);
            }
        }
    }
    shapes.push(disc);

    for mask in &shapes {
        let skeleton = skeletonize(mask);
        let (w, h) = mask.dimensions();
        for y in 0..h {
            for x in 0..w {
                if skeleton.is_set(x, y) {
                    assert!(mask.is_set(x, y), "skeleton pixel ({}, {}) outside mask", x, y);
                }
            }
        }

        let result = measure::measure_widths(mask, 1.0);
        assert!(result.is_ok(), "{}x{} shape failed to measure", w, h);
        if let Ok(profile) = result {
            let m = profile.measurement;
            assert!(m.avg_width_mm <= m.max_width_mm);
            assert!(m.max_width_mm.is_finite());
        }
    }
}

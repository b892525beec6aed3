//! Dominant garment color by density-mode clustering in HSV.
//!
//! Masked background pixels are exactly black, so dropping every sample
//! whose value (brightness) is at or below a small threshold removes the
//! background along with the garment's own near-black pixels. The
//! remaining samples are clustered with mean shift and the center of the
//! most populated cluster is converted back to sRGB.

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::color;
use crate::meanshift::{self, MeanShiftParams};
use crate::types::{PipelineConfig, PipelineError, Rgb, RgbImage};

/// Result of dominant color extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DominantColor {
    /// The dominant color in sRGB.
    pub rgb: Rgb,
    /// The dominant cluster center on the 8-bit HSV scale.
    pub hsv: [u8; 3],
    /// Samples assigned to the dominant cluster.
    pub members: usize,
    /// Samples that survived brightness filtering.
    pub sample_count: usize,
}

/// HSV samples of every pixel brighter than `brightness_threshold`.
#[must_use]
pub fn bright_hsv_samples(image: &RgbImage, brightness_threshold: u8) -> Vec<[u8; 3]> {
    image
        .pixels()
        .map(|p| color::rgb_to_hsv8(Rgb::from(p.0)))
        .filter(|hsv| hsv[2] > brightness_threshold)
        .collect()
}

/// Find the dominant color of a masked image.
///
/// # Errors
///
/// - [`PipelineError::EmptySample`] if no pixel is brighter than the
///   threshold (the mask removed everything).
/// - [`PipelineError::DegenerateBandwidth`] if the remaining samples are
///   not all identical but the estimated bandwidth is still not a
///   positive finite number.
pub fn extract_dominant_color(
    masked: &RgbImage,
    config: &PipelineConfig,
) -> Result<DominantColor, PipelineError> {
    let samples = bright_hsv_samples(masked, config.brightness_threshold);
    let Some(&first) = samples.first() else {
        return Err(PipelineError::EmptySample);
    };

    // A single distinct color is its own (trivially converged) mode.
    if samples.iter().all(|&s| s == first) {
        tracing::debug!(samples = samples.len(), "single distinct sample color");
        return Ok(DominantColor {
            rgb: hsv8_center_to_rgb(first.map(f64::from)).1,
            hsv: first,
            members: samples.len(),
            sample_count: samples.len(),
        });
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let bandwidth = meanshift::estimate_bandwidth(
        &samples,
        config.bandwidth_quantile,
        config.bandwidth_samples,
        &mut rng,
    );
    if !(bandwidth.is_finite() && bandwidth > 0.0) {
        return Err(PipelineError::DegenerateBandwidth(bandwidth));
    }

    let weighted = meanshift::deduplicate(&samples);
    let params = MeanShiftParams {
        bandwidth,
        bin_seeding: config.bin_seeding,
        min_bin_freq: config.min_bin_freq,
        max_iterations: config.mean_shift_max_iterations,
        tolerance: config.convergence_tolerance,
    };
    let clusters = meanshift::mean_shift(&weighted, &params);
    let Some(dominant) = clusters.first() else {
        return Err(PipelineError::DegenerateBandwidth(bandwidth));
    };

    let (hsv, rgb) = hsv8_center_to_rgb(dominant.center);
    tracing::debug!(
        samples = samples.len(),
        unique = weighted.len(),
        bandwidth,
        clusters = clusters.len(),
        members = dominant.members,
        h = hsv[0],
        s = hsv[1],
        v = hsv[2],
        "dominant color"
    );
    Ok(DominantColor {
        rgb,
        hsv,
        members: dominant.members,
        sample_count: samples.len(),
    })
}

/// Round a cluster center onto the 8-bit HSV grid (hue wrapping at 180)
/// and convert it to sRGB.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn hsv8_center_to_rgb(center: [f64; 3]) -> ([u8; 3], Rgb) {
    let hue = center[0].round().rem_euclid(color::HUE_SCALE_MAX);
    let s = center[1].round().clamp(0.0, color::CHANNEL_MAX);
    let v = center[2].round().clamp(0.0, color::CHANNEL_MAX);
    let hsv = [hue as u8, s as u8, v as u8];
    (hsv, color::hsv8_to_rgb([hue, s, v]))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn config() -> PipelineConfig {
        PipelineConfig::default()
    }

    #[test]
    fn fully_black_image_is_empty_sample() {
        let img = RgbImage::new(20, 20);
        let result = extract_dominant_color(&img, &config());
        assert!(matches!(result, Err(PipelineError::EmptySample)));
    }

    #[test]
    fn near_black_pixels_are_filtered() {
        // Value 1 is at the threshold and is dropped along with 0.
        let img = RgbImage::from_fn(10, 10, |x, _| {
            if x % 2 == 0 {
                image::Rgb([1, 0, 0])
            } else {
                image::Rgb([0, 0, 0])
            }
        });
        assert!(bright_hsv_samples(&img, 1).is_empty());
        assert!(matches!(
            extract_dominant_color(&img, &config()),
            Err(PipelineError::EmptySample)
        ));
    }

    #[test]
    fn uniform_color_is_its_own_mode() {
        let img = RgbImage::from_pixel(16, 16, image::Rgb([255, 0, 0]));
        let dominant = extract_dominant_color(&img, &config()).unwrap();
        assert_eq!(dominant.rgb, Rgb::new(255, 0, 0));
        assert_eq!(dominant.hsv, [0, 255, 255]);
        assert_eq!(dominant.members, 256);
    }

    #[test]
    fn larger_region_wins() {
        // Three quarters green, one quarter blue, black border ignored.
        let img = RgbImage::from_fn(40, 40, |x, y| {
            if x < 4 || y < 4 {
                image::Rgb([0, 0, 0])
            } else if x < 31 {
                image::Rgb([20, 160 + (y % 3) as u8, 30])
            } else {
                image::Rgb([30, 40, 200 + (x % 2) as u8])
            }
        });
        let dominant = extract_dominant_color(&img, &config()).unwrap();
        assert!(dominant.rgb.g > 140, "{}", dominant.rgb);
        assert!(dominant.rgb.b < 60, "{}", dominant.rgb);
        assert_eq!(dominant.sample_count, 36 * 36);
    }

    #[test]
    fn extraction_is_deterministic() {
        let img = RgbImage::from_fn(30, 30, |x, y| {
            image::Rgb([(x * 8) as u8, (y * 8) as u8, ((x + y) * 4) as u8])
        });
        let a = extract_dominant_color(&img, &config()).unwrap();
        let b = extract_dominant_color(&img, &config()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn center_hue_wraps_at_180() {
        let (hsv, rgb) = hsv8_center_to_rgb([179.7, 255.0, 255.0]);
        assert_eq!(hsv, [0, 255, 255]);
        assert_eq!(rgb, Rgb::new(255, 0, 0));
    }

    #[test]
    fn center_is_clamped_into_range() {
        let (hsv, _) = hsv8_center_to_rgb([12.4, 300.0, -3.0]);
        assert_eq!(hsv, [12, 255, 0]);
    }
}

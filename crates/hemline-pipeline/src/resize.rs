//! Resampling to the canonical working size.
//!
//! Every image is stretched to exactly `canonical_width` ×
//! `canonical_height`. Aspect ratio is deliberately not preserved so the
//! segmentation prior rectangle lands on the same pixel coordinates for
//! every input.

use std::fmt;

use image::imageops::FilterType;
use serde::{Deserialize, Serialize};

use crate::types::{Dimensions, PipelineError, RgbImage, ensure_non_empty};

/// Interpolation used when resampling.
///
/// Ordered from fastest/lowest-quality to slowest/highest-quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResizeFilter {
    /// Nearest-neighbor: fastest, blocky artifacts.
    Nearest,
    /// Bilinear interpolation: fast, decent quality.
    #[default]
    Triangle,
    /// Bicubic (Catmull-Rom): moderate speed, good quality.
    CatmullRom,
    /// Gaussian: moderate speed, smooth output.
    Gaussian,
    /// Lanczos with 3 lobes: slowest, sharpest.
    Lanczos3,
}

impl ResizeFilter {
    /// Convert to the `image` crate's `FilterType`.
    const fn to_image_filter(self) -> FilterType {
        match self {
            Self::Nearest => FilterType::Nearest,
            Self::Triangle => FilterType::Triangle,
            Self::CatmullRom => FilterType::CatmullRom,
            Self::Gaussian => FilterType::Gaussian,
            Self::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

impl fmt::Display for ResizeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nearest => f.write_str("Nearest"),
            Self::Triangle => f.write_str("Triangle"),
            Self::CatmullRom => f.write_str("CatmullRom"),
            Self::Gaussian => f.write_str("Gaussian"),
            Self::Lanczos3 => f.write_str("Lanczos3"),
        }
    }
}

/// Resample `image` to exactly `target`, ignoring aspect ratio.
///
/// An image that already has the target size is returned as a copy.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidImage`] if `image` or `target` has a
/// zero-length axis.
pub fn resize_to_canonical(
    image: &RgbImage,
    target: Dimensions,
    filter: ResizeFilter,
) -> Result<RgbImage, PipelineError> {
    ensure_non_empty(image, "resize")?;
    if target.is_empty() {
        return Err(PipelineError::InvalidImage(format!(
            "canonical size {}x{} is empty",
            target.width, target.height
        )));
    }

    if Dimensions::of(image) == target {
        return Ok(image.clone());
    }

    tracing::trace!(
        from_width = image.width(),
        from_height = image.height(),
        to_width = target.width,
        to_height = target.height,
        %filter,
        "resizing"
    );
    Ok(image::imageops::resize(
        image,
        target.width,
        target.height,
        filter.to_image_filter(),
    ))
}

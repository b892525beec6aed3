//! Image decoding.
//!
//! Accepts raw image bytes (PNG, JPEG, BMP, WebP) and produces an 8-bit
//! sRGB image. Alpha is discarded; the pipeline has no notion of
//! transparency.

use crate::types::{PipelineError, RgbImage, ensure_non_empty};

/// Decode raw image bytes into an RGB image.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidImage`] if `bytes` is empty or decodes
/// to a zero-sized image.
/// Returns [`PipelineError::ImageDecode`] if the image format is
/// unrecognized or the data is corrupt.
#[must_use = "returns the decoded image"]
pub fn decode_rgb(bytes: &[u8]) -> Result<RgbImage, PipelineError> {
    if bytes.is_empty() {
        return Err(PipelineError::InvalidImage("no image data".to_owned()));
    }

    let img = image::load_from_memory(bytes)?.to_rgb8();
    ensure_non_empty(&img, "decode")?;
    Ok(img)
}

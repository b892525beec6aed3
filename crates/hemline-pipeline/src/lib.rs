//! hemline-pipeline: Pure garment color analysis pipeline (sans-IO).
//!
//! Tags a clothing photograph with one dominant color, the name of the
//! nearest reference palette entry, and that name's color family:
//! contrast enhancement -> canonical resize -> garment segmentation ->
//! dominant-color clustering -> perceptual naming -> family lookup.
//!
//! This crate has **no I/O dependencies**: it operates on in-memory
//! images (or encoded bytes) and returns structured data. Directory
//! walking, file output and parallel batch execution live in the
//! `hemline` binary.
//!
//! Every stage is deterministic. Random choices (k-means++ seeding and
//! the bandwidth subsample) draw from a generator seeded by
//! [`PipelineConfig::seed`].

pub mod color;
pub mod decode;
pub mod dominant;
pub mod enhance;
pub mod gmm;
pub mod graph;
pub mod meanshift;
pub mod naming;
pub mod pipeline;
pub mod resize;
pub mod segment;
pub mod swatch;
pub mod tables;
pub mod types;

pub use naming::{ColorMatch, ColorNamer, FamilyMapper};
pub use pipeline::{Pipeline, StagedResult};
pub use resize::ResizeFilter;
pub use tables::{PaletteEntry, ReferenceTables};
pub use types::{
    AnalysisResult, Dimensions, ErrorKind, ImageFailure, PipelineConfig, PipelineError, Rgb,
    RgbImage,
};

/// Run the full analysis on a decoded image.
///
/// # Pipeline steps
///
/// 1. CLAHE on the L\* channel (chrominance untouched)
/// 2. Resize to the canonical size, ignoring aspect ratio
/// 3. GrabCut segmentation from a margin-inset rectangle; background
///    pixels set to black
/// 4. Mean-shift clustering of bright HSV samples; the most populated
///    cluster's center is the dominant color
/// 5. CIEDE2000 nearest palette entry
/// 6. Family lookup of the matched name
///
/// # Errors
///
/// Returns the first [`PipelineError`] any stage produces; see the
/// stage methods on [`pipeline`] for which stage can fail how.
pub fn analyze(
    image: RgbImage,
    tables: &ReferenceTables,
    config: &PipelineConfig,
) -> Result<AnalysisResult, PipelineError> {
    Ok(Pipeline::new(image, config.clone())
        .enhance()?
        .resize()?
        .segment()?
        .extract_color()?
        .name(tables.namer())?
        .resolve_family(tables.families())?
        .into_result())
}

/// Decode encoded image bytes (PNG, JPEG, BMP, WebP) and analyze them.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidImage`] for empty input,
/// [`PipelineError::ImageDecode`] for undecodable data, or any error of
/// [`analyze`].
pub fn analyze_bytes(
    bytes: &[u8],
    tables: &ReferenceTables,
    config: &PipelineConfig,
) -> Result<AnalysisResult, PipelineError> {
    analyze(decode::decode_rgb(bytes)?, tables, config)
}

/// [`analyze`], tagging a failure with `image_id`.
///
/// # Errors
///
/// Returns an [`ImageFailure`] wrapping the stage error.
pub fn analyze_tagged(
    image_id: &str,
    image: RgbImage,
    tables: &ReferenceTables,
    config: &PipelineConfig,
) -> Result<AnalysisResult, ImageFailure> {
    analyze(image, tables, config).map_err(|error| ImageFailure {
        image_id: image_id.to_owned(),
        error,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn quick_config() -> PipelineConfig {
        PipelineConfig {
            canonical_width: 30,
            canonical_height: 35,
            rect_margin: 0,
            ..PipelineConfig::default()
        }
    }

    fn png_bytes(img: &RgbImage) -> Vec<u8> {
        let mut buf = Vec::new();
        let encoder = image::codecs::png::PngEncoder::new(&mut buf);
        image::ImageEncoder::write_image(
            encoder,
            img.as_raw(),
            img.width(),
            img.height(),
            image::ExtendedColorType::Rgb8,
        )
        .unwrap();
        buf
    }

    #[test]
    fn analyze_bytes_rejects_empty_input() {
        let tables = ReferenceTables::builtin().unwrap();
        let result = analyze_bytes(&[], &tables, &quick_config());
        assert!(matches!(result, Err(PipelineError::InvalidImage(_))));
    }

    #[test]
    fn analyze_bytes_rejects_corrupt_input() {
        let tables = ReferenceTables::builtin().unwrap();
        let result = analyze_bytes(&[0xFF, 0x00], &tables, &quick_config());
        assert!(matches!(result, Err(PipelineError::ImageDecode(_))));
    }

    #[test]
    fn analyze_bytes_matches_analyze() {
        let tables = ReferenceTables::builtin().unwrap();
        let img = RgbImage::from_pixel(30, 35, image::Rgb([20, 120, 40]));
        let from_bytes = analyze_bytes(&png_bytes(&img), &tables, &quick_config()).unwrap();
        let direct = analyze(img, &tables, &quick_config()).unwrap();
        assert_eq!(from_bytes, direct);
    }

    #[test]
    fn tagged_failure_carries_image_id() {
        let tables = ReferenceTables::builtin().unwrap();
        let failure =
            analyze_tagged("shirt-17.jpg", RgbImage::new(0, 3), &tables, &quick_config())
                .unwrap_err();
        assert_eq!(failure.image_id, "shirt-17.jpg");
        assert_eq!(failure.error.kind(), ErrorKind::InvalidImage);
        assert!(failure.to_string().starts_with("shirt-17.jpg: "));
    }
}

//! Incremental pipeline: advance stage-by-stage, inspecting each
//! intermediate result before continuing.
//!
//! Unlike [`crate::analyze`], which runs every stage in one call,
//! [`Pipeline`] lets the caller drive execution one step at a time:
//!
//! ```rust
//! # use hemline_pipeline::{Pipeline, PipelineConfig, PipelineError, ReferenceTables, RgbImage};
//! # fn run(image: RgbImage) -> Result<(), PipelineError> {
//! let tables = ReferenceTables::builtin()?;
//! let resolved = Pipeline::new(image, PipelineConfig::default())
//!     .enhance()?
//!     .resize()?
//!     .segment()?
//!     .extract_color()?
//!     .name(tables.namer())?
//!     .resolve_family(tables.families())?;
//!
//! let marked = resolved.marked_image();
//! let result = resolved.into_result();
//! # Ok(())
//! # }
//! ```
//!
//! Each stage method consumes `self` and returns the next pipeline state
//! wrapped in a `Result`: any failure aborts the image, and there is no
//! way to reach [`FamilyResolved`] (and so an [`AnalysisResult`]) with a
//! field missing.
//!
//! Stages keep only what later stages or inspection need: the original
//! and enhanced images are dropped once the canonical-size image exists.

use crate::dominant::{self, DominantColor};
use crate::enhance::{self, ClaheParams};
use crate::naming::{ColorNamer, FamilyMapper};
use crate::resize;
use crate::segment::{self, GrabCutParams, SegmentationMask};
use crate::swatch;
use crate::types::{AnalysisResult, Dimensions, PipelineConfig, PipelineError, Rgb, RgbImage};

// ───────────────────────── Stage 0: Loaded ───────────────────────────

/// Pipeline state before any processing has occurred.
///
/// Call [`enhance`](Self::enhance) to advance to the next stage.
#[must_use = "pipeline stages are consumed by advancing — call .enhance() to continue"]
pub struct Loaded {
    config: PipelineConfig,
    image: RgbImage,
}

impl Loaded {
    /// The input image.
    #[must_use]
    pub const fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Validate the configuration and equalize local contrast.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if the configuration is
    /// out of range and [`PipelineError::InvalidImage`] if the image is
    /// zero-sized.
    pub fn enhance(self) -> Result<Enhanced, PipelineError> {
        self.config.validate()?;
        let params = ClaheParams {
            clip_limit: self.config.clip_limit,
            tile_columns: self.config.tile_columns,
            tile_rows: self.config.tile_rows,
        };
        let enhanced = enhance::enhance(&self.image, params)?;
        Ok(Enhanced {
            config: self.config,
            enhanced,
        })
    }
}

// ───────────────────────── Stage 1: Enhanced ─────────────────────────

/// Pipeline state after contrast enhancement.
///
/// Call [`resize`](Self::resize) to advance to the next stage.
#[must_use = "pipeline stages are consumed by advancing — call .resize() to continue"]
pub struct Enhanced {
    config: PipelineConfig,
    enhanced: RgbImage,
}

impl Enhanced {
    /// The contrast-enhanced image at its original size.
    #[must_use]
    pub const fn enhanced(&self) -> &RgbImage {
        &self.enhanced
    }

    /// Resample to the canonical working size.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidImage`] if the image or the
    /// canonical size is zero-sized.
    pub fn resize(self) -> Result<Resized, PipelineError> {
        let target = Dimensions {
            width: self.config.canonical_width,
            height: self.config.canonical_height,
        };
        let resized =
            resize::resize_to_canonical(&self.enhanced, target, self.config.resize_filter)?;
        Ok(Resized {
            config: self.config,
            resized,
        })
    }
}

// ───────────────────────── Stage 2: Resized ──────────────────────────

/// Pipeline state after resampling to the canonical size.
///
/// Call [`segment`](Self::segment) to advance to the next stage.
#[must_use = "pipeline stages are consumed by advancing — call .segment() to continue"]
pub struct Resized {
    config: PipelineConfig,
    resized: RgbImage,
}

impl Resized {
    /// The canonical-size image.
    #[must_use]
    pub const fn resized(&self) -> &RgbImage {
        &self.resized
    }

    /// Segment the garment and black out the background.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidImage`] if the image is
    /// zero-sized.
    pub fn segment(self) -> Result<Segmented, PipelineError> {
        let params = GrabCutParams {
            margin: self.config.rect_margin,
            iterations: self.config.segmentation_iterations,
            components: self.config.gmm_components,
            seed: self.config.seed,
        };
        let segmentation = segment::segment(&self.resized, params)?;
        Ok(Segmented {
            config: self.config,
            resized: self.resized,
            mask: segmentation.mask,
            masked: segmentation.masked,
        })
    }
}

// ───────────────────────── Stage 3: Segmented ────────────────────────

/// Pipeline state after segmentation.
///
/// Call [`extract_color`](Self::extract_color) to advance to the next
/// stage.
#[must_use = "pipeline stages are consumed by advancing — call .extract_color() to continue"]
pub struct Segmented {
    config: PipelineConfig,
    resized: RgbImage,
    mask: SegmentationMask,
    masked: RgbImage,
}

impl Segmented {
    /// The segmentation labels.
    #[must_use]
    pub const fn mask(&self) -> &SegmentationMask {
        &self.mask
    }

    /// The canonical-size image with the background set to black.
    #[must_use]
    pub const fn masked(&self) -> &RgbImage {
        &self.masked
    }

    /// Find the dominant color of the segmented garment.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::EmptySample`] if nothing survived
    /// masking and [`PipelineError::DegenerateBandwidth`] if clustering
    /// cannot establish a neighbourhood scale.
    pub fn extract_color(self) -> Result<ColorExtracted, PipelineError> {
        let dominant = dominant::extract_dominant_color(&self.masked, &self.config)?;
        Ok(ColorExtracted {
            config: self.config,
            resized: self.resized,
            mask: self.mask,
            masked: self.masked,
            dominant,
        })
    }
}

// ───────────────────────── Stage 4: ColorExtracted ───────────────────

/// Pipeline state after dominant color extraction.
///
/// Call [`name`](Self::name) to advance to the next stage.
#[must_use = "pipeline stages are consumed by advancing — call .name() to continue"]
pub struct ColorExtracted {
    config: PipelineConfig,
    resized: RgbImage,
    mask: SegmentationMask,
    masked: RgbImage,
    dominant: DominantColor,
}

impl ColorExtracted {
    /// The dominant color and its cluster statistics.
    #[must_use]
    pub const fn dominant(&self) -> &DominantColor {
        &self.dominant
    }

    /// Match the dominant color to its nearest palette name.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::EmptyPalette`] if `namer` has no entries.
    pub fn name(self, namer: &ColorNamer) -> Result<Named, PipelineError> {
        let matched = namer.nearest(self.dominant.rgb)?;
        let color_name = matched.entry.name.clone();
        let distance = matched.distance;
        Ok(Named {
            config: self.config,
            resized: self.resized,
            mask: self.mask,
            masked: self.masked,
            dominant: self.dominant,
            color_name,
            distance,
        })
    }
}

// ───────────────────────── Stage 5: Named ────────────────────────────

/// Pipeline state after color naming.
///
/// Call [`resolve_family`](Self::resolve_family) to advance to the final
/// stage.
#[must_use = "pipeline stages are consumed by advancing — call .resolve_family() to continue"]
pub struct Named {
    config: PipelineConfig,
    resized: RgbImage,
    mask: SegmentationMask,
    masked: RgbImage,
    dominant: DominantColor,
    color_name: String,
    distance: f64,
}

impl Named {
    /// Name of the nearest palette entry.
    #[must_use]
    pub fn color_name(&self) -> &str {
        &self.color_name
    }

    /// CIEDE2000 distance from the dominant color to the named entry.
    #[must_use]
    pub const fn distance(&self) -> f64 {
        self.distance
    }

    /// Look up the family of the matched name.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnknownColorName`] if `families` has no
    /// entry for the matched name.
    pub fn resolve_family(self, families: &FamilyMapper) -> Result<FamilyResolved, PipelineError> {
        let family_name = families.family_of(&self.color_name)?.to_owned();
        tracing::debug!(
            rgb = %self.dominant.rgb,
            name = %self.color_name,
            family = %family_name,
            distance = self.distance,
            "named dominant color"
        );
        Ok(FamilyResolved {
            config: self.config,
            resized: self.resized,
            mask: self.mask,
            masked: self.masked,
            dominant: self.dominant,
            color_name: self.color_name,
            distance: self.distance,
            family_name,
        })
    }
}

// ───────────────────────── Stage 6: FamilyResolved ───────────────────

/// Everything the pipeline produced for one image.
#[derive(Debug, Clone)]
pub struct StagedResult {
    /// The canonical-size enhanced image.
    pub resized: RgbImage,
    /// The segmentation labels.
    pub mask: SegmentationMask,
    /// The canonical-size image with the background blacked out.
    pub masked: RgbImage,
    /// The dominant color and its cluster statistics.
    pub dominant: DominantColor,
    /// Name of the nearest palette entry.
    pub color_name: String,
    /// CIEDE2000 distance to the named entry.
    pub distance: f64,
    /// Family of `color_name`.
    pub family_name: String,
}

/// Pipeline state after family resolution: the final stage.
///
/// Call [`into_result`](Self::into_result) for the [`AnalysisResult`] or
/// [`into_staged`](Self::into_staged) to keep every intermediate.
#[must_use = "call .into_result() to extract the AnalysisResult"]
pub struct FamilyResolved {
    config: PipelineConfig,
    resized: RgbImage,
    mask: SegmentationMask,
    masked: RgbImage,
    dominant: DominantColor,
    color_name: String,
    distance: f64,
    family_name: String,
}

impl FamilyResolved {
    /// The dominant color.
    #[must_use]
    pub const fn dominant_rgb(&self) -> Rgb {
        self.dominant.rgb
    }

    /// Family of the matched name.
    #[must_use]
    pub fn family_name(&self) -> &str {
        &self.family_name
    }

    /// The masked image with a swatch of the dominant color in its
    /// top-left corner.
    #[must_use]
    pub fn marked_image(&self) -> RgbImage {
        swatch::mark(&self.masked, self.dominant.rgb, self.config.swatch_size)
    }

    /// Consume the pipeline and return the final record.
    #[must_use]
    pub fn into_result(self) -> AnalysisResult {
        AnalysisResult {
            dominant_rgb: self.dominant.rgb,
            color_name: self.color_name,
            family_name: self.family_name,
        }
    }

    /// Consume the pipeline and return every retained intermediate.
    #[must_use]
    pub fn into_staged(self) -> StagedResult {
        StagedResult {
            resized: self.resized,
            mask: self.mask,
            masked: self.masked,
            dominant: self.dominant,
            color_name: self.color_name,
            distance: self.distance,
            family_name: self.family_name,
        }
    }
}

// ───────────────────── Pipeline entry point ──────────────────────────

/// Incremental color analysis pipeline.
///
/// Created via [`Pipeline::new`], which stores the image and config
/// without doing any processing. Each stage method consumes the current
/// state and returns the next, making it a compile-time error to skip
/// stages or call them out of order.
pub struct Pipeline;

impl Pipeline {
    /// Create a new pipeline from a decoded image and config.
    ///
    /// No processing is performed; the configuration is validated by
    /// [`Loaded::enhance`].
    #[allow(clippy::new_ret_no_self)]
    pub const fn new(image: RgbImage, config: PipelineConfig) -> Loaded {
        Loaded { config, image }
    }
}

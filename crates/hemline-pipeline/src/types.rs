//! Shared types for the hemline color analysis pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::resize::ResizeFilter;

/// Re-export `RgbImage` so downstream crates can hand decoded images to
/// the pipeline without depending on `image` directly.
pub use image::RgbImage;

/// An 8-bit device sRGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
}

impl Rgb {
    /// Create a new color from its channels.
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Build a color from integer channels, rejecting anything outside
    /// `0..=255`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidColor`] if any channel is out of
    /// range.
    pub fn try_from_channels(r: i64, g: i64, b: i64) -> Result<Self, PipelineError> {
        let channel = |value: i64, label: &str| {
            u8::try_from(value).map_err(|_| {
                PipelineError::InvalidColor(format!("{label} channel {value} is outside 0..=255"))
            })
        };
        Ok(Self::new(channel(r, "red")?, channel(g, "green")?, channel(b, "blue")?))
    }

    /// The channels as an array in `[r, g, b]` order.
    #[must_use]
    pub const fn to_array(self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }
}

impl From<[u8; 3]> for Rgb {
    fn from([r, g, b]: [u8; 3]) -> Self {
        Self::new(r, g, b)
    }
}

impl From<Rgb> for image::Rgb<u8> {
    fn from(color: Rgb) -> Self {
        Self(color.to_array())
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.r, self.g, self.b)
    }
}

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Dimensions of an image buffer.
    #[must_use]
    pub fn of<P: image::Pixel>(image: &image::ImageBuffer<P, Vec<P::Subpixel>>) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
        }
    }

    /// Total number of pixels.
    #[must_use]
    pub const fn pixel_count(self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Returns `true` if either axis is zero.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Configuration for the color analysis pipeline.
///
/// Every field has a default, exposed as a `DEFAULT_*` associated
/// constant so front ends can reuse them.
/// Call [`validate`](Self::validate) before running a batch; the stage
/// functions assume a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// CLAHE clip limit, relative to the mean histogram bin height.
    pub clip_limit: f64,

    /// Number of CLAHE tiles along the horizontal axis.
    pub tile_columns: u32,

    /// Number of CLAHE tiles along the vertical axis.
    pub tile_rows: u32,

    /// Canonical width every image is resampled to.
    pub canonical_width: u32,

    /// Canonical height every image is resampled to.
    pub canonical_height: u32,

    /// Interpolation used by the resizer.
    pub resize_filter: ResizeFilter,

    /// Inset of the segmentation prior rectangle from each border, in
    /// pixels.
    pub rect_margin: u32,

    /// Number of GMM re-estimation / graph-cut rounds.
    pub segmentation_iterations: u32,

    /// Gaussian components per color model (foreground and background).
    pub gmm_components: usize,

    /// Samples whose HSV value (brightness, 0-255) is at or below this
    /// are treated as masked background and discarded.
    pub brightness_threshold: u8,

    /// Quantile of pairwise neighbour distances used as the mean-shift
    /// bandwidth.
    pub bandwidth_quantile: f64,

    /// Size of the random subsample used for bandwidth estimation.
    pub bandwidth_samples: usize,

    /// Seed mean-shift from a bandwidth-sized grid instead of from every
    /// sample.
    pub bin_seeding: bool,

    /// Minimum number of samples a seeding bin needs to become a seed.
    pub min_bin_freq: usize,

    /// Upper bound on mean-shift iterations per seed.
    pub mean_shift_max_iterations: u32,

    /// A seed has converged once its shift is below
    /// `convergence_tolerance * bandwidth`.
    pub convergence_tolerance: f64,

    /// Seed for every random choice (k-means++ and bandwidth subsample).
    pub seed: u64,

    /// Edge length of the dominant-color square drawn on marked images.
    pub swatch_size: u32,
}

impl PipelineConfig {
    /// Default CLAHE clip limit.
    pub const DEFAULT_CLIP_LIMIT: f64 = 0.07;
    /// Default CLAHE tile grid columns.
    pub const DEFAULT_TILE_COLUMNS: u32 = 8;
    /// Default CLAHE tile grid rows.
    pub const DEFAULT_TILE_ROWS: u32 = 8;
    /// Default canonical width.
    pub const DEFAULT_CANONICAL_WIDTH: u32 = 600;
    /// Default canonical height.
    pub const DEFAULT_CANONICAL_HEIGHT: u32 = 700;
    /// Default resize interpolation.
    pub const DEFAULT_RESIZE_FILTER: ResizeFilter = ResizeFilter::Triangle;
    /// Default prior rectangle margin.
    pub const DEFAULT_RECT_MARGIN: u32 = 10;
    /// Default segmentation iteration count.
    pub const DEFAULT_SEGMENTATION_ITERATIONS: u32 = 5;
    /// Default GMM component count.
    pub const DEFAULT_GMM_COMPONENTS: usize = 5;
    /// Default brightness threshold.
    pub const DEFAULT_BRIGHTNESS_THRESHOLD: u8 = 1;
    /// Default bandwidth quantile.
    pub const DEFAULT_BANDWIDTH_QUANTILE: f64 = 0.2;
    /// Default bandwidth subsample size.
    pub const DEFAULT_BANDWIDTH_SAMPLES: usize = 500;
    /// Default minimum seeding bin population.
    pub const DEFAULT_MIN_BIN_FREQ: usize = 1;
    /// Default mean-shift iteration cap.
    pub const DEFAULT_MEAN_SHIFT_MAX_ITERATIONS: u32 = 300;
    /// Default mean-shift convergence tolerance (fraction of bandwidth).
    pub const DEFAULT_CONVERGENCE_TOLERANCE: f64 = 1e-3;
    /// Default random seed.
    pub const DEFAULT_SEED: u64 = 0;
    /// Default swatch edge length.
    pub const DEFAULT_SWATCH_SIZE: u32 = 100;

    /// Check every field against its valid range.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] naming the first field
    /// that is out of range.
    pub fn validate(&self) -> Result<(), PipelineError> {
        fn fail(message: &str) -> Result<(), PipelineError> {
            Err(PipelineError::InvalidConfig(message.to_owned()))
        }

        if !(self.clip_limit.is_finite() && self.clip_limit > 0.0) {
            return fail("clip_limit must be a positive finite number");
        }
        if self.tile_columns == 0 || self.tile_rows == 0 {
            return fail("tile grid must have at least one tile per axis");
        }
        if self.canonical_width == 0 || self.canonical_height == 0 {
            return fail("canonical dimensions must be non-zero");
        }
        if self.gmm_components == 0 {
            return fail("gmm_components must be at least 1");
        }
        if !(self.bandwidth_quantile > 0.0 && self.bandwidth_quantile <= 1.0) {
            return fail("bandwidth_quantile must be in (0, 1]");
        }
        if self.bandwidth_samples == 0 {
            return fail("bandwidth_samples must be at least 1");
        }
        if self.min_bin_freq == 0 {
            return fail("min_bin_freq must be at least 1");
        }
        if self.mean_shift_max_iterations == 0 {
            return fail("mean_shift_max_iterations must be at least 1");
        }
        if !(self.convergence_tolerance.is_finite() && self.convergence_tolerance > 0.0) {
            return fail("convergence_tolerance must be a positive finite number");
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            clip_limit: Self::DEFAULT_CLIP_LIMIT,
            tile_columns: Self::DEFAULT_TILE_COLUMNS,
            tile_rows: Self::DEFAULT_TILE_ROWS,
            canonical_width: Self::DEFAULT_CANONICAL_WIDTH,
            canonical_height: Self::DEFAULT_CANONICAL_HEIGHT,
            resize_filter: Self::DEFAULT_RESIZE_FILTER,
            rect_margin: Self::DEFAULT_RECT_MARGIN,
            segmentation_iterations: Self::DEFAULT_SEGMENTATION_ITERATIONS,
            gmm_components: Self::DEFAULT_GMM_COMPONENTS,
            brightness_threshold: Self::DEFAULT_BRIGHTNESS_THRESHOLD,
            bandwidth_quantile: Self::DEFAULT_BANDWIDTH_QUANTILE,
            bandwidth_samples: Self::DEFAULT_BANDWIDTH_SAMPLES,
            bin_seeding: true,
            min_bin_freq: Self::DEFAULT_MIN_BIN_FREQ,
            mean_shift_max_iterations: Self::DEFAULT_MEAN_SHIFT_MAX_ITERATIONS,
            convergence_tolerance: Self::DEFAULT_CONVERGENCE_TOLERANCE,
            seed: Self::DEFAULT_SEED,
            swatch_size: Self::DEFAULT_SWATCH_SIZE,
        }
    }
}

/// Final output for one image.
///
/// Either every field is populated or the pipeline failed; there is no
/// partial result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// The dominant garment color in device sRGB.
    pub dominant_rgb: Rgb,
    /// Name of the nearest reference palette entry.
    pub color_name: String,
    /// Coarse family label of `color_name`.
    pub family_name: String,
}

/// Errors that can occur during pipeline processing.
///
/// Every variant is terminal for the image being processed: all stages
/// are deterministic, so a retry would reproduce the failure.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Failed to decode the input image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// The image is malformed (zero-sized or otherwise unusable).
    #[error("invalid image: {0}")]
    InvalidImage(String),

    /// No pixel survived masking and brightness filtering.
    #[error("no foreground pixels left after brightness filtering")]
    EmptySample,

    /// Bandwidth estimation could not establish a neighbourhood scale.
    #[error("bandwidth estimation produced a degenerate bandwidth ({0})")]
    DegenerateBandwidth(f64),

    /// The reference palette has no entries.
    #[error("reference palette is empty")]
    EmptyPalette,

    /// A color value cannot be converted.
    #[error("invalid color: {0}")]
    InvalidColor(String),

    /// A palette name has no family entry.
    #[error("color name {0:?} has no family entry")]
    UnknownColorName(String),

    /// The palette and family tables are inconsistent or malformed.
    #[error("invalid reference tables: {0}")]
    InvalidTables(String),

    /// Pipeline configuration is invalid.
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),
}

impl PipelineError {
    /// The fieldless kind of this error, for reports and matching.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::ImageDecode(_) => ErrorKind::ImageDecode,
            Self::InvalidImage(_) => ErrorKind::InvalidImage,
            Self::EmptySample => ErrorKind::EmptySample,
            Self::DegenerateBandwidth(_) => ErrorKind::DegenerateBandwidth,
            Self::EmptyPalette => ErrorKind::EmptyPalette,
            Self::InvalidColor(_) => ErrorKind::InvalidColor,
            Self::UnknownColorName(_) => ErrorKind::UnknownColorName,
            Self::InvalidTables(_) => ErrorKind::InvalidTables,
            Self::InvalidConfig(_) => ErrorKind::InvalidConfig,
        }
    }

    /// Whether this error points at the reference tables or config
    /// rather than at the image.
    ///
    /// A batch driver should stop on these: every following image would
    /// hit the same inconsistency.
    #[must_use]
    pub const fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::EmptyPalette
                | Self::UnknownColorName(_)
                | Self::InvalidTables(_)
                | Self::InvalidConfig(_)
        )
    }
}

/// Serializable, fieldless mirror of [`PipelineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// See [`PipelineError::ImageDecode`].
    ImageDecode,
    /// See [`PipelineError::InvalidImage`].
    InvalidImage,
    /// See [`PipelineError::EmptySample`].
    EmptySample,
    /// See [`PipelineError::DegenerateBandwidth`].
    DegenerateBandwidth,
    /// See [`PipelineError::EmptyPalette`].
    EmptyPalette,
    /// See [`PipelineError::InvalidColor`].
    InvalidColor,
    /// See [`PipelineError::UnknownColorName`].
    UnknownColorName,
    /// See [`PipelineError::InvalidTables`].
    InvalidTables,
    /// See [`PipelineError::InvalidConfig`].
    InvalidConfig,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A pipeline failure tagged with the image it happened on.
#[derive(Debug, thiserror::Error)]
#[error("{image_id}: {error}")]
pub struct ImageFailure {
    /// Caller-supplied identifier of the failed image.
    pub image_id: String,
    /// The originating error.
    #[source]
    pub error: PipelineError,
}

/// Reject zero-sized images.
pub(crate) fn ensure_non_empty(image: &RgbImage, stage: &str) -> Result<(), PipelineError> {
    let dimensions = Dimensions::of(image);
    if dimensions.is_empty() {
        return Err(PipelineError::InvalidImage(format!(
            "{stage} received a {}x{} image",
            dimensions.width, dimensions.height
        )));
    }
    Ok(())
}

//! Garment segmentation: GrabCut-style iterative energy minimization.
//!
//! A margin-inset rectangle seeds the labeling: pixels inside are
//! probable foreground, pixels outside probable background. Each
//! iteration re-estimates a foreground and a background Gaussian mixture
//! color model from the current labeling, then relabels every probable
//! pixel with a graph cut balancing color likelihood (terminal links)
//! against label smoothness between 8-connected neighbours (neighbour
//! links, weighted by color similarity).
//!
//! The binarized mask is finally applied to the image: background pixels
//! become exactly black, foreground pixels pass through unchanged.

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::gmm::{self, Gmm, Sample};
use crate::graph::FlowGraph;
use crate::types::{Dimensions, PipelineError, RgbImage, ensure_non_empty};

/// Smoothness weight of neighbour links.
const GAMMA: f64 = 50.0;

/// Capacity of links that pin definite pixels to their terminal.
const LAMBDA: f64 = 9.0 * GAMMA;

/// Per-pixel segmentation label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MaskLabel {
    /// Definitely background; never relabeled.
    Background,
    /// Definitely foreground; never relabeled.
    Foreground,
    /// Background according to the current model.
    ProbableBackground,
    /// Foreground according to the current model.
    ProbableForeground,
}

impl MaskLabel {
    /// Whether the label binarizes to foreground.
    #[must_use]
    pub const fn is_foreground(self) -> bool {
        matches!(self, Self::Foreground | Self::ProbableForeground)
    }

    /// Whether the graph cut is allowed to change the label.
    #[must_use]
    pub const fn is_probable(self) -> bool {
        matches!(self, Self::ProbableBackground | Self::ProbableForeground)
    }
}

/// An axis-aligned pixel rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    /// Left edge (inclusive).
    pub x: u32,
    /// Top edge (inclusive).
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Rect {
    /// Whether `(x, y)` lies inside the rectangle.
    #[must_use]
    pub const fn contains(self, x: u32, y: u32) -> bool {
        x >= self.x && y >= self.y && x - self.x < self.width && y - self.y < self.height
    }
}

/// The prior rectangle inset by `margin` from every border.
///
/// If the image is too small for the inset (`width <= 2 * margin` or
/// `height <= 2 * margin`), the rectangle is clamped to the full image
/// on that axis instead of collapsing to a non-positive size.
#[must_use]
pub fn prior_rect(dimensions: Dimensions, margin: u32) -> Rect {
    let axis = |len: u32| {
        let inset = margin.saturating_mul(2);
        if len > inset {
            (margin, len - inset)
        } else {
            (0, len)
        }
    };
    let (x, width) = axis(dimensions.width);
    let (y, height) = axis(dimensions.height);
    Rect {
        x,
        y,
        width,
        height,
    }
}

/// A per-pixel label grid with the same dimensions as its image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentationMask {
    dimensions: Dimensions,
    labels: Vec<MaskLabel>,
}

impl SegmentationMask {
    /// Label pixels inside `rect` probable foreground and all others
    /// probable background.
    #[must_use]
    pub fn from_rect(dimensions: Dimensions, rect: Rect) -> Self {
        let mut labels = Vec::with_capacity(dimensions.pixel_count());
        for y in 0..dimensions.height {
            for x in 0..dimensions.width {
                labels.push(if rect.contains(x, y) {
                    MaskLabel::ProbableForeground
                } else {
                    MaskLabel::ProbableBackground
                });
            }
        }
        Self { dimensions, labels }
    }

    /// Mask dimensions.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// Labels in row-major order.
    #[must_use]
    pub fn labels(&self) -> &[MaskLabel] {
        &self.labels
    }

    /// Label at `(x, y)`.
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> Option<MaskLabel> {
        if x >= self.dimensions.width || y >= self.dimensions.height {
            return None;
        }
        self.labels
            .get(y as usize * self.dimensions.width as usize + x as usize)
            .copied()
    }

    /// Number of pixels that binarize to foreground.
    #[must_use]
    pub fn foreground_count(&self) -> usize {
        self.labels.iter().filter(|l| l.is_foreground()).count()
    }
}

/// Parameters for the iterative segmentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrabCutParams {
    /// Prior rectangle inset from each border.
    pub margin: u32,
    /// Model re-estimation / graph-cut rounds.
    pub iterations: u32,
    /// Gaussian components per color model.
    pub components: usize,
    /// Seed for k-means++ initialisation.
    pub seed: u64,
}

/// Output of the segmentation stage.
#[derive(Debug, Clone)]
pub struct Segmentation {
    /// The refined label grid.
    pub mask: SegmentationMask,
    /// The image with every background pixel set to black.
    pub masked: RgbImage,
}

/// Segment the garment from `image` and apply the resulting mask.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidImage`] if `image` has a zero-length
/// axis. An all-background outcome is not an error.
pub fn segment(image: &RgbImage, params: GrabCutParams) -> Result<Segmentation, PipelineError> {
    ensure_non_empty(image, "segment")?;
    let dimensions = Dimensions::of(image);
    let rect = prior_rect(dimensions, params.margin);
    let mask = grabcut(image, SegmentationMask::from_rect(dimensions, rect), params);
    let masked = apply_mask(image, &mask);
    tracing::debug!(
        width = dimensions.width,
        height = dimensions.height,
        rect_x = rect.x,
        rect_y = rect.y,
        rect_width = rect.width,
        rect_height = rect.height,
        foreground = mask.foreground_count(),
        "segmented garment"
    );
    Ok(Segmentation { mask, masked })
}

/// Zero out every pixel whose label binarizes to background.
#[must_use]
pub fn apply_mask(image: &RgbImage, mask: &SegmentationMask) -> RgbImage {
    let mut out = image.clone();
    for (pixel, label) in out.pixels_mut().zip(mask.labels()) {
        if !label.is_foreground() {
            *pixel = image::Rgb([0, 0, 0]);
        }
    }
    out
}

/// Refine `mask` over `params.iterations` rounds.
///
/// When either the foreground or the background set is empty no color
/// model can be estimated for it, and the labeling is returned as it
/// stands.
#[must_use]
pub fn grabcut(
    image: &RgbImage,
    mut mask: SegmentationMask,
    params: GrabCutParams,
) -> SegmentationMask {
    let samples: Vec<Sample> = image
        .pixels()
        .map(|p| [f64::from(p.0[0]), f64::from(p.0[1]), f64::from(p.0[2])])
        .collect();
    let mut rng = StdRng::seed_from_u64(params.seed);
    let components = params.components.max(1);

    let Some((mut fg_model, mut bg_model)) = initial_models(&samples, &mask, components, &mut rng)
    else {
        tracing::debug!("foreground or background empty; skipping graph cut");
        return mask;
    };

    let links = NeighbourLinks::new(image);

    for iteration in 0..params.iterations {
        let Some(models) = relearn_models(&samples, &mask, &fg_model, &bg_model, components)
        else {
            tracing::debug!(iteration, "labeling degenerated to a single side");
            break;
        };
        (fg_model, bg_model) = models;

        let mut graph = FlowGraph::new(samples.len(), links.edge_count());
        for (i, (&sample, &label)) in samples.iter().zip(&mask.labels).enumerate() {
            let (from_source, to_sink) = match label {
                MaskLabel::Background => (0.0, LAMBDA),
                MaskLabel::Foreground => (LAMBDA, 0.0),
                _ => (
                    neg_log(bg_model.likelihood(sample)),
                    neg_log(fg_model.likelihood(sample)),
                ),
            };
            graph.add_terminal_weights(i, from_source, to_sink);
        }
        links.add_to(&mut graph);

        let cut = graph.min_cut();
        for (label, &source_side) in mask.labels.iter_mut().zip(&cut.source_side) {
            if label.is_probable() {
                *label = if source_side {
                    MaskLabel::ProbableForeground
                } else {
                    MaskLabel::ProbableBackground
                };
            }
        }
        tracing::trace!(
            iteration,
            flow = cut.flow,
            foreground = mask.foreground_count(),
            "graph cut"
        );
    }
    mask
}

fn neg_log(likelihood: f64) -> f64 {
    -likelihood.max(f64::MIN_POSITIVE).ln()
}

/// Split samples by binarized label.
fn partition(samples: &[Sample], mask: &SegmentationMask) -> (Vec<Sample>, Vec<Sample>) {
    let mut fg = Vec::new();
    let mut bg = Vec::new();
    for (&sample, label) in samples.iter().zip(mask.labels()) {
        if label.is_foreground() {
            fg.push(sample);
        } else {
            bg.push(sample);
        }
    }
    (fg, bg)
}

fn initial_models(
    samples: &[Sample],
    mask: &SegmentationMask,
    components: usize,
    rng: &mut StdRng,
) -> Option<(Gmm, Gmm)> {
    let (fg, bg) = partition(samples, mask);
    if fg.is_empty() || bg.is_empty() {
        return None;
    }
    let fg_labels = gmm::kmeans(&fg, components, rng);
    let bg_labels = gmm::kmeans(&bg, components, rng);
    Some((
        Gmm::learn(&fg, &fg_labels, components),
        Gmm::learn(&bg, &bg_labels, components),
    ))
}

/// Assign every sample to its most likely component of its current model
/// and re-learn both models from those assignments.
fn relearn_models(
    samples: &[Sample],
    mask: &SegmentationMask,
    fg_model: &Gmm,
    bg_model: &Gmm,
    components: usize,
) -> Option<(Gmm, Gmm)> {
    let (fg, bg) = partition(samples, mask);
    if fg.is_empty() || bg.is_empty() {
        return None;
    }
    let fg_labels: Vec<usize> = fg.iter().map(|&s| fg_model.most_likely_component(s)).collect();
    let bg_labels: Vec<usize> = bg.iter().map(|&s| bg_model.most_likely_component(s)).collect();
    Some((
        Gmm::learn(&fg, &fg_labels, components),
        Gmm::learn(&bg, &bg_labels, components),
    ))
}

/// Precomputed smoothness weights to the left, upper-left, upper and
/// upper-right neighbour of every pixel.
struct NeighbourLinks {
    width: usize,
    height: usize,
    /// `[left, up_left, up, up_right]` per pixel; zero where the
    /// neighbour does not exist.
    weights: Vec<[f64; 4]>,
}

impl NeighbourLinks {
    #[allow(clippy::cast_precision_loss)]
    fn new(image: &RgbImage) -> Self {
        let (w, h) = image.dimensions();
        let width = w as usize;
        let height = h as usize;
        let color = |x: usize, y: usize| {
            let p = image.as_raw();
            let i = 3 * (y * width + x);
            [f64::from(p[i]), f64::from(p[i + 1]), f64::from(p[i + 2])]
        };
        let diff2 = |a: [f64; 3], b: [f64; 3]| {
            (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)
        };

        let mut diffs = vec![[None::<f64>; 4]; width * height];
        let mut total = 0.0;
        let mut count = 0usize;
        for y in 0..height {
            for x in 0..width {
                let c = color(x, y);
                let slot = &mut diffs[y * width + x];
                let neighbours = [
                    (x > 0).then(|| (x - 1, y)),
                    (x > 0 && y > 0).then(|| (x - 1, y - 1)),
                    (y > 0).then(|| (x, y - 1)),
                    (x + 1 < width && y > 0).then(|| (x + 1, y - 1)),
                ];
                for (k, n) in neighbours.into_iter().enumerate() {
                    if let Some((nx, ny)) = n {
                        let d = diff2(c, color(nx, ny));
                        slot[k] = Some(d);
                        total += d;
                        count += 1;
                    }
                }
            }
        }

        let beta = if count == 0 || total <= f64::EPSILON {
            0.0
        } else {
            1.0 / (2.0 * total / count as f64)
        };
        let diagonal = GAMMA / std::f64::consts::SQRT_2;
        let scale = [GAMMA, diagonal, GAMMA, diagonal];

        let weights = diffs
            .into_iter()
            .map(|slot| {
                std::array::from_fn(|k| slot[k].map_or(0.0, |d| scale[k] * (-beta * d).exp()))
            })
            .collect();
        Self {
            width,
            height,
            weights,
        }
    }

    fn edge_count(&self) -> usize {
        4 * self.width * self.height
    }

    fn add_to(&self, graph: &mut FlowGraph) {
        for y in 0..self.height {
            for x in 0..self.width {
                let i = y * self.width + x;
                let [left, up_left, up, up_right] = self.weights[i];
                if x > 0 {
                    graph.add_edge(i, i - 1, left, left);
                }
                if x > 0 && y > 0 {
                    graph.add_edge(i, i - self.width - 1, up_left, up_left);
                }
                if y > 0 {
                    graph.add_edge(i, i - self.width, up, up);
                }
                if x + 1 < self.width && y > 0 {
                    graph.add_edge(i, i - self.width + 1, up_right, up_right);
                }
            }
        }
    }
}

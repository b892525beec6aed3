//! Flat-kernel mean-shift clustering over 3-channel color samples.
//!
//! Samples are deduplicated into [`WeightedSample`]s first: a photograph
//! has far fewer distinct colors than pixels, and every duplicate pulls a
//! window mean by the same amount, so a weighted mean over unique colors
//! is exactly the mean over all pixels.
//!
//! Window queries go through an R-tree so each mean-shift step only
//! visits samples within one bandwidth of the current mode.

use std::collections::BTreeMap;

use rand::Rng;
use rstar::RTree;
use rstar::primitives::GeomWithData;

/// A point in a 3-channel color space.
pub type Point = [f64; 3];

/// A distinct sample with its multiplicity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightedSample {
    /// Sample coordinates.
    pub point: Point,
    /// How many input samples share these coordinates.
    pub weight: usize,
}

/// A converged mode and the samples assigned to it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cluster {
    /// Mode location.
    pub center: Point,
    /// Number of (non-deduplicated) samples closest to this mode.
    pub members: usize,
}

/// Mean-shift parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeanShiftParams {
    /// Flat kernel radius.
    pub bandwidth: f64,
    /// Seed from a bandwidth-sized grid rather than from every sample.
    pub bin_seeding: bool,
    /// Minimum population of a grid cell to become a seed.
    pub min_bin_freq: usize,
    /// Iteration cap per seed.
    pub max_iterations: u32,
    /// Convergence threshold as a fraction of the bandwidth.
    pub tolerance: f64,
}

type Indexed = GeomWithData<Point, usize>;

fn to_point(sample: [u8; 3]) -> Point {
    [
        f64::from(sample[0]),
        f64::from(sample[1]),
        f64::from(sample[2]),
    ]
}

fn distance_2(a: Point, b: Point) -> f64 {
    let d0 = a[0] - b[0];
    let d1 = a[1] - b[1];
    let d2 = a[2] - b[2];
    d2.mul_add(d2, d0.mul_add(d0, d1 * d1))
}

/// Collapse repeated samples into weighted unique points, in ascending
/// coordinate order.
#[must_use]
pub fn deduplicate(samples: &[[u8; 3]]) -> Vec<WeightedSample> {
    let mut counts: BTreeMap<[u8; 3], usize> = BTreeMap::new();
    for &sample in samples {
        *counts.entry(sample).or_default() += 1;
    }
    counts
        .into_iter()
        .map(|(sample, weight)| WeightedSample {
            point: to_point(sample),
            weight,
        })
        .collect()
}

/// Estimate a mean-shift bandwidth from a random subsample.
///
/// Draws `min(sample_size, samples.len())` samples without replacement
/// and returns the mean, over the subsample, of each point's distance to
/// its `k`-th nearest subsample neighbour (the point itself counts as the
/// first), with `k = max(1, floor(n * quantile))`.
///
/// Returns `0.0` for empty input or when every subsampled neighbourhood
/// collapses onto a single color.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn estimate_bandwidth<R: Rng>(
    samples: &[[u8; 3]],
    quantile: f64,
    sample_size: usize,
    rng: &mut R,
) -> f64 {
    let n = sample_size.min(samples.len());
    if n == 0 {
        return 0.0;
    }
    let chosen: Vec<Point> = rand::seq::index::sample(rng, samples.len(), n)
        .into_iter()
        .map(|i| to_point(samples[i]))
        .collect();
    let k = ((n as f64 * quantile) as usize).clamp(1, n);

    let tree = RTree::bulk_load(chosen.clone());
    let total: f64 = chosen
        .iter()
        .map(|p| {
            tree.nearest_neighbor_iter(p)
                .nth(k - 1)
                .map_or(0.0, |q| distance_2(*p, *q).sqrt())
        })
        .sum();
    total / n as f64
}

/// Seeds on a grid with cell size `bandwidth`: the center of every cell
/// holding at least `min_bin_freq` samples.
///
/// When binning does not reduce the number of seeds below the number of
/// samples, the unique sample points themselves are returned.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub fn bin_seeds(samples: &[WeightedSample], bandwidth: f64, min_bin_freq: usize) -> Vec<Point> {
    let mut bins: BTreeMap<[i64; 3], usize> = BTreeMap::new();
    for sample in samples {
        let cell = sample.point.map(|c| (c / bandwidth).round_ties_even() as i64);
        *bins.entry(cell).or_default() += sample.weight;
    }
    let seeds: Vec<Point> = bins
        .into_iter()
        .filter(|&(_, count)| count >= min_bin_freq)
        .map(|(cell, _)| cell.map(|c| c as f64 * bandwidth))
        .collect();

    let total: usize = samples.iter().map(|s| s.weight).sum();
    if seeds.len() == total {
        return samples.iter().map(|s| s.point).collect();
    }
    seeds
}

/// Shift `seed` to the weighted mean of the samples within `bandwidth`
/// until it moves less than `tolerance * bandwidth`.
///
/// Returns the final mode and the window population at the last step,
/// or `None` if the seed's window is empty.
#[allow(clippy::cast_precision_loss)]
fn shift_seed(
    tree: &RTree<Indexed>,
    seed: Point,
    params: &MeanShiftParams,
) -> Option<(Point, usize)> {
    let radius_2 = params.bandwidth * params.bandwidth;
    let stop_2 = (params.tolerance * params.bandwidth).powi(2);
    let mut mean = seed;
    let mut population = 0;

    for _ in 0..params.max_iterations {
        let mut sum = [0.0f64; 3];
        let mut count = 0usize;
        for sample in tree.locate_within_distance(mean, radius_2) {
            let w = sample.data as f64;
            for (s, c) in sum.iter_mut().zip(sample.geom()) {
                *s += w * c;
            }
            count += sample.data;
        }
        if count == 0 {
            break;
        }
        let previous = mean;
        let n = count as f64;
        mean = sum.map(|s| s / n);
        population = count;
        if distance_2(mean, previous) <= stop_2 {
            break;
        }
    }
    (population > 0).then_some((mean, population))
}

/// Run mean shift and return the clusters, most members first.
///
/// Converged modes are ranked by window population; walking that order,
/// each mode suppresses every later mode within one bandwidth. Every
/// sample is then assigned to its nearest surviving mode. Clusters with
/// equal membership keep their population order.
///
/// Returns an empty vector for empty input or a non-positive bandwidth.
#[must_use]
pub fn mean_shift(samples: &[WeightedSample], params: &MeanShiftParams) -> Vec<Cluster> {
    if samples.is_empty() || params.bandwidth.is_nan() || params.bandwidth <= 0.0 {
        return Vec::new();
    }

    let tree = RTree::bulk_load(
        samples
            .iter()
            .map(|s| Indexed::new(s.point, s.weight))
            .collect(),
    );

    let seeds = if params.bin_seeding {
        bin_seeds(samples, params.bandwidth, params.min_bin_freq)
    } else {
        samples.iter().map(|s| s.point).collect()
    };

    let mut modes: Vec<(Point, usize)> = seeds
        .into_iter()
        .filter_map(|seed| shift_seed(&tree, seed, params))
        .collect();
    modes.sort_by(|a, b| {
        b.1.cmp(&a.1).then_with(|| {
            b.0.iter()
                .zip(&a.0)
                .map(|(x, y)| x.total_cmp(y))
                .find(|o| o.is_ne())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
    });

    let radius_2 = params.bandwidth * params.bandwidth;
    let mut survivors: Vec<Point> = Vec::new();
    for (center, _) in modes {
        if survivors.iter().all(|&s| distance_2(s, center) > radius_2) {
            survivors.push(center);
        }
    }
    tracing::trace!(
        bandwidth = params.bandwidth,
        modes = survivors.len(),
        "mean shift converged"
    );

    let mode_tree = RTree::bulk_load(
        survivors
            .iter()
            .enumerate()
            .map(|(i, &center)| Indexed::new(center, i))
            .collect(),
    );
    let mut members = vec![0usize; survivors.len()];
    for sample in samples {
        if let Some(nearest) = mode_tree.nearest_neighbor(&sample.point) {
            members[nearest.data] += sample.weight;
        }
    }

    let mut clusters: Vec<Cluster> = survivors
        .into_iter()
        .zip(members)
        .map(|(center, members)| Cluster { center, members })
        .collect();
    clusters.sort_by(|a, b| b.members.cmp(&a.members));
    clusters
}

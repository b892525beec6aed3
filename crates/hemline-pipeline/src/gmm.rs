//! Gaussian mixture color models for foreground/background segmentation.
//!
//! Each model is a small mixture of full-covariance 3D Gaussians over
//! RGB. Models are (re-)learned from hard component assignments: every
//! sample belongs to exactly one component, and each component's weight,
//! mean and covariance are the sample statistics of its members.
//!
//! Initial assignments come from k-means++ clustering with a fixed
//! iteration budget.

use rand::Rng;

/// A color sample in RGB space.
pub type Sample = [f64; 3];

/// Variance added to each diagonal entry of a singular covariance.
const SINGULAR_VARIANCE: f64 = 0.01;

/// Lloyd iterations run after k-means++ seeding.
pub const KMEANS_ITERATIONS: usize = 10;

#[derive(Debug, Clone, PartialEq)]
struct Component {
    weight: f64,
    mean: Sample,
    inverse: [[f64; 3]; 3],
    det: f64,
}

impl Component {
    /// Unnormalized Gaussian density (the `(2π)^-3/2` factor is shared
    /// by every component of both models and cancels out of the cut).
    fn density(&self, sample: Sample) -> f64 {
        if self.weight <= 0.0 {
            return 0.0;
        }
        let d = [
            sample[0] - self.mean[0],
            sample[1] - self.mean[1],
            sample[2] - self.mean[2],
        ];
        let mut mahalanobis = 0.0;
        for i in 0..3 {
            for j in 0..3 {
                mahalanobis += d[i] * self.inverse[i][j] * d[j];
            }
        }
        (-0.5 * mahalanobis).exp() / self.det.sqrt()
    }
}

/// A Gaussian mixture model over RGB colors.
#[derive(Debug, Clone, PartialEq)]
pub struct Gmm {
    components: Vec<Component>,
}

impl Gmm {
    /// Learn a model from samples and their component assignments.
    ///
    /// `assignments[i]` is the component of `samples[i]` and must be
    /// below `component_count`. Components without members get zero
    /// weight and never contribute to the likelihood.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn learn(samples: &[Sample], assignments: &[usize], component_count: usize) -> Self {
        let mut counts = vec![0usize; component_count];
        let mut sums = vec![[0.0f64; 3]; component_count];
        let mut products = vec![[[0.0f64; 3]; 3]; component_count];

        for (sample, &k) in samples.iter().zip(assignments) {
            counts[k] += 1;
            for i in 0..3 {
                sums[k][i] += sample[i];
                for j in 0..3 {
                    products[k][i][j] += sample[i] * sample[j];
                }
            }
        }

        let total = samples.len().max(1) as f64;
        let components = (0..component_count)
            .map(|k| {
                if counts[k] == 0 {
                    return Component {
                        weight: 0.0,
                        mean: [0.0; 3],
                        inverse: identity(),
                        det: 1.0,
                    };
                }
                let n = counts[k] as f64;
                let mean = [sums[k][0] / n, sums[k][1] / n, sums[k][2] / n];
                let mut cov = [[0.0f64; 3]; 3];
                for i in 0..3 {
                    for j in 0..3 {
                        cov[i][j] = products[k][i][j] / n - mean[i] * mean[j];
                    }
                }
                let mut det = determinant(&cov);
                if det <= f64::EPSILON {
                    for (i, row) in cov.iter_mut().enumerate() {
                        row[i] += SINGULAR_VARIANCE;
                    }
                    det = determinant(&cov);
                }
                Component {
                    weight: n / total,
                    mean,
                    inverse: inverse(&cov, det),
                    det,
                }
            })
            .collect();
        Self { components }
    }

    /// Number of components (including empty ones).
    #[must_use]
    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    /// Mixture likelihood of `sample`.
    #[must_use]
    pub fn likelihood(&self, sample: Sample) -> f64 {
        self.components
            .iter()
            .map(|c| c.weight * c.density(sample))
            .sum()
    }

    /// Index of the component with the highest density at `sample`.
    #[must_use]
    pub fn most_likely_component(&self, sample: Sample) -> usize {
        let mut best = 0;
        let mut best_density = f64::NEG_INFINITY;
        for (k, component) in self.components.iter().enumerate() {
            let density = component.density(sample);
            if component.weight > 0.0 && density > best_density {
                best = k;
                best_density = density;
            }
        }
        best
    }
}

const fn identity() -> [[f64; 3]; 3] {
    [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]
}

fn determinant(m: &[[f64; 3]; 3]) -> f64 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

fn inverse(m: &[[f64; 3]; 3], det: f64) -> [[f64; 3]; 3] {
    let inv_det = 1.0 / det;
    [
        [
            (m[1][1] * m[2][2] - m[1][2] * m[2][1]) * inv_det,
            (m[0][2] * m[2][1] - m[0][1] * m[2][2]) * inv_det,
            (m[0][1] * m[1][2] - m[0][2] * m[1][1]) * inv_det,
        ],
        [
            (m[1][2] * m[2][0] - m[1][0] * m[2][2]) * inv_det,
            (m[0][0] * m[2][2] - m[0][2] * m[2][0]) * inv_det,
            (m[0][2] * m[1][0] - m[0][0] * m[1][2]) * inv_det,
        ],
        [
            (m[1][0] * m[2][1] - m[1][1] * m[2][0]) * inv_det,
            (m[0][1] * m[2][0] - m[0][0] * m[2][1]) * inv_det,
            (m[0][0] * m[1][1] - m[0][1] * m[1][0]) * inv_det,
        ],
    ]
}

fn squared_distance(a: Sample, b: Sample) -> f64 {
    let d0 = a[0] - b[0];
    let d1 = a[1] - b[1];
    let d2 = a[2] - b[2];
    d2.mul_add(d2, d0.mul_add(d0, d1 * d1))
}

fn nearest_center(sample: Sample, centers: &[Sample]) -> (usize, f64) {
    centers
        .iter()
        .enumerate()
        .map(|(k, &c)| (k, squared_distance(sample, c)))
        .fold((0, f64::INFINITY), |best, cur| if cur.1 < best.1 { cur } else { best })
}

/// Cluster `samples` into `k` groups with k-means++ seeding followed by
/// [`KMEANS_ITERATIONS`] Lloyd iterations, returning each sample's
/// cluster index.
///
/// Returns an empty vector for empty input. Duplicate-heavy inputs may
/// leave some clusters empty.
#[allow(clippy::cast_precision_loss)]
pub fn kmeans<R: Rng>(samples: &[Sample], k: usize, rng: &mut R) -> Vec<usize> {
    if samples.is_empty() || k == 0 {
        return Vec::new();
    }

    let mut centers = Vec::with_capacity(k);
    centers.push(samples[rng.random_range(0..samples.len())]);
    let mut distances: Vec<f64> = samples
        .iter()
        .map(|&s| squared_distance(s, centers[0]))
        .collect();
    while centers.len() < k {
        let total: f64 = distances.iter().sum();
        let pick = if total > 0.0 {
            let mut target = rng.random::<f64>() * total;
            let mut chosen = samples.len() - 1;
            for (i, d) in distances.iter().enumerate() {
                target -= d;
                if target <= 0.0 {
                    chosen = i;
                    break;
                }
            }
            chosen
        } else {
            rng.random_range(0..samples.len())
        };
        let center = samples[pick];
        centers.push(center);
        for (d, &s) in distances.iter_mut().zip(samples) {
            *d = d.min(squared_distance(s, center));
        }
    }

    let mut labels = vec![0usize; samples.len()];
    for _ in 0..KMEANS_ITERATIONS {
        let mut changed = false;
        for (label, &s) in labels.iter_mut().zip(samples) {
            let (nearest, _) = nearest_center(s, &centers);
            if *label != nearest {
                *label = nearest;
                changed = true;
            }
        }

        let mut sums = vec![[0.0f64; 3]; k];
        let mut counts = vec![0usize; k];
        for (&label, s) in labels.iter().zip(samples) {
            counts[label] += 1;
            for i in 0..3 {
                sums[label][i] += s[i];
            }
        }
        for ((center, sum), &count) in centers.iter_mut().zip(&sums).zip(&counts) {
            if count > 0 {
                let n = count as f64;
                *center = [sum[0] / n, sum[1] / n, sum[2] / n];
            }
        }

        if !changed {
            break;
        }
    }
    labels
}

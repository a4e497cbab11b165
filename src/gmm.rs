//! Gaussian mixture color model.
//!
//! Each segmentation class (background, foreground) carries a fixed-size
//! mixture of full-covariance Gaussians over RGB. Parameters live in a flat
//! caller-owned buffer between calls; the derived per-component state
//! (inverse covariance, determinant) is cached on the value and refreshed
//! after every learning pass.

use nalgebra::{Matrix3, Vector3};

use crate::error::{Error, Result};

/// Number of mixture components per class.
pub const COMPONENTS: usize = 5;

/// Flat model buffer length: per component one weight, a 3-vector mean and a
/// row-major 3x3 covariance.
pub const MODEL_LEN: usize = COMPONENTS * 13;

/// Diagonal white noise added to a singular covariance before inversion.
const NOISE_VARIANCE: f64 = 0.01;

#[derive(Debug, Clone, Copy)]
struct Component {
    weight: f64,
    mean: Vector3<f64>,
    cov: Matrix3<f64>,
    inv_cov: Matrix3<f64>,
    cov_det: f64,
}

impl Default for Component {
    fn default() -> Self {
        Self {
            weight: 0.0,
            mean: Vector3::zeros(),
            cov: Matrix3::zeros(),
            inv_cov: Matrix3::zeros(),
            cov_det: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Accumulator {
    sum: Vector3<f64>,
    prod: Matrix3<f64>,
    count: usize,
}

impl Default for Accumulator {
    fn default() -> Self {
        Self {
            sum: Vector3::zeros(),
            prod: Matrix3::zeros(),
            count: 0,
        }
    }
}

/// A 5-component full-covariance Gaussian mixture over RGB.
///
/// Densities follow the graph-cut convention: `det(S)^(-1/2) *
/// exp(-(c-m)' S^-1 (c-m) / 2)`, without the `(2*pi)^(-3/2)` factor, so the
/// two class models stay directly comparable.
#[derive(Debug, Clone)]
pub struct Gmm {
    components: [Component; COMPONENTS],
    acc: [Accumulator; COMPONENTS],
    total_count: usize,
}

impl Gmm {
    /// Load a mixture from its flat parameter buffer.
    ///
    /// An empty buffer is zero-filled to [`MODEL_LEN`] (an uninitialized
    /// model with every component inactive); any other length mismatch is an
    /// argument error.
    pub fn from_model(model: &mut Vec<f64>) -> Result<Self> {
        if model.is_empty() {
            model.resize(MODEL_LEN, 0.0);
        } else if model.len() != MODEL_LEN {
            return Err(Error::ModelShape { actual: model.len() });
        }

        let mut gmm = Self {
            components: [Component::default(); COMPONENTS],
            acc: [Accumulator::default(); COMPONENTS],
            total_count: 0,
        };
        let (coefs, rest) = model.split_at(COMPONENTS);
        let (means, covs) = rest.split_at(3 * COMPONENTS);
        for ci in 0..COMPONENTS {
            let c = &mut gmm.components[ci];
            c.weight = coefs[ci];
            c.mean = Vector3::from_row_slice(&means[3 * ci..3 * ci + 3]);
            c.cov = Matrix3::from_row_slice(&covs[9 * ci..9 * ci + 9]);
            if c.weight > 0.0 {
                gmm.refresh_inverse_and_determinant(ci);
            }
        }
        Ok(gmm)
    }

    /// Serialize the mixture back into its flat parameter buffer.
    pub fn write_model(&self, model: &mut Vec<f64>) {
        model.clear();
        model.resize(MODEL_LEN, 0.0);
        let (coefs, rest) = model.split_at_mut(COMPONENTS);
        let (means, covs) = rest.split_at_mut(3 * COMPONENTS);
        for (ci, c) in self.components.iter().enumerate() {
            coefs[ci] = c.weight;
            means[3 * ci..3 * ci + 3].copy_from_slice(c.mean.as_slice());
            for r in 0..3 {
                for col in 0..3 {
                    covs[9 * ci + 3 * r + col] = c.cov[(r, col)];
                }
            }
        }
    }

    /// Mixture likelihood of a color: the weighted sum over all components.
    pub fn evaluate(&self, color: Vector3<f64>) -> f64 {
        (0..COMPONENTS).map(|ci| self.evaluate_component(ci, color)).sum()
    }

    /// The contribution of a single component, `weight * density`; zero for
    /// inactive components.
    pub fn evaluate_component(&self, ci: usize, color: Vector3<f64>) -> f64 {
        self.components[ci].weight * self.density(ci, color)
    }

    /// The component whose raw density is largest for the color.
    ///
    /// The running maximum starts at zero, so ties break toward the smaller
    /// index and a color with zero density under every component maps to
    /// component 0.
    pub fn which_component(&self, color: Vector3<f64>) -> usize {
        let mut k = 0;
        let mut max = 0.0;
        for ci in 0..COMPONENTS {
            let p = self.density(ci, color);
            if p > max {
                k = ci;
                max = p;
            }
        }
        k
    }

    fn density(&self, ci: usize, color: Vector3<f64>) -> f64 {
        let c = &self.components[ci];
        if c.weight <= 0.0 {
            return 0.0;
        }
        assert!(c.cov_det > f64::EPSILON);
        let diff = color - c.mean;
        let mult = diff.dot(&(c.inv_cov * diff));
        1.0 / c.cov_det.sqrt() * (-0.5 * mult).exp()
    }

    /// Reset the per-component sufficient statistics before a learning pass.
    pub fn begin_learning(&mut self) {
        self.acc = [Accumulator::default(); COMPONENTS];
        self.total_count = 0;
    }

    /// Accumulate one color sample into component `ci`.
    pub fn add_sample(&mut self, ci: usize, color: Vector3<f64>) {
        let acc = &mut self.acc[ci];
        acc.sum += color;
        acc.prod += color * color.transpose();
        acc.count += 1;
        self.total_count += 1;
    }

    /// Refit every component from the accumulated statistics.
    ///
    /// Components that received no samples become inactive (zero weight).
    /// A singular sample covariance is regularized by adding white noise to
    /// the diagonal before the inverse and determinant are refreshed.
    pub fn end_learning(&mut self) {
        for ci in 0..COMPONENTS {
            let n = self.acc[ci].count;
            if n == 0 {
                self.components[ci].weight = 0.0;
                continue;
            }
            let inv_n = 1.0 / n as f64;
            let c = &mut self.components[ci];
            c.weight = n as f64 / self.total_count as f64;
            c.mean = self.acc[ci].sum * inv_n;
            c.cov = self.acc[ci].prod * inv_n - c.mean * c.mean.transpose();
            if det3(&c.cov) <= f64::EPSILON {
                for d in 0..3 {
                    c.cov[(d, d)] += NOISE_VARIANCE;
                }
            }
            self.refresh_inverse_and_determinant(ci);
        }
    }

    fn refresh_inverse_and_determinant(&mut self, ci: usize) {
        let c = &mut self.components[ci];
        if c.weight <= 0.0 {
            return;
        }
        let det = det3(&c.cov);
        assert!(det > f64::EPSILON);
        let adj = adjugate3(&c.cov);
        c.cov_det = det;
        c.inv_cov = adj / det;
    }
}

fn det3(m: &Matrix3<f64>) -> f64 {
    m[(0, 0)] * (m[(1, 1)] * m[(2, 2)] - m[(1, 2)] * m[(2, 1)])
        - m[(0, 1)] * (m[(1, 0)] * m[(2, 2)] - m[(1, 2)] * m[(2, 0)])
        + m[(0, 2)] * (m[(1, 0)] * m[(2, 1)] - m[(1, 1)] * m[(2, 0)])
}

fn adjugate3(m: &Matrix3<f64>) -> Matrix3<f64> {
    Matrix3::new(
        m[(1, 1)] * m[(2, 2)] - m[(1, 2)] * m[(2, 1)],
        -(m[(0, 1)] * m[(2, 2)] - m[(0, 2)] * m[(2, 1)]),
        m[(0, 1)] * m[(1, 2)] - m[(0, 2)] * m[(1, 1)],
        -(m[(1, 0)] * m[(2, 2)] - m[(1, 2)] * m[(2, 0)]),
        m[(0, 0)] * m[(2, 2)] - m[(0, 2)] * m[(2, 0)],
        -(m[(0, 0)] * m[(1, 2)] - m[(0, 2)] * m[(1, 0)]),
        m[(1, 0)] * m[(2, 1)] - m[(1, 1)] * m[(2, 0)],
        -(m[(0, 0)] * m[(2, 1)] - m[(0, 1)] * m[(2, 0)]),
        m[(0, 0)] * m[(1, 1)] - m[(0, 1)] * m[(1, 0)],
    )
}

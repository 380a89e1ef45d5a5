//! Multivariate-normal sampling with a semidefinite covariance.

use super::SimulationError;
use faer::{Col, Mat};
use rand::Rng;
use rand_distr::StandardNormal;
use tracing::debug;

/// Lower-triangular `L` with `L Lᵀ ≈ a`, tolerating a singular `a`.
///
/// Pivots at or below `tolerance × max diagonal` are treated as zero and
/// their whole column of `L` is zero. Slightly negative pivots from rounding
/// are treated the same way.
pub fn semidefinite_cholesky(a: &Mat<f64>, tolerance: f64) -> Result<Mat<f64>, SimulationError> {
    let n = a.nrows();
    if a.ncols() != n {
        return Err(SimulationError::DimensionMismatch {
            expected: n,
            got: a.ncols(),
        });
    }
    for j in 0..n {
        for i in 0..n {
            if !a[(i, j)].is_finite() {
                return Err(SimulationError::NonFiniteCovariance);
            }
        }
    }

    let scale = (0..n).map(|j| a[(j, j)].abs()).fold(0.0_f64, f64::max);
    let threshold = tolerance * scale.max(f64::MIN_POSITIVE);

    let mut l = Mat::zeros(n, n);
    let mut n_zero = 0usize;
    for j in 0..n {
        let mut d = a[(j, j)];
        for k in 0..j {
            d -= l[(j, k)] * l[(j, k)];
        }
        if d <= threshold {
            n_zero += 1;
            continue;
        }
        let pivot = d.sqrt();
        l[(j, j)] = pivot;
        for i in (j + 1)..n {
            let mut s = a[(i, j)];
            for k in 0..j {
                s -= l[(i, k)] * l[(j, k)];
            }
            l[(i, j)] = s / pivot;
        }
    }

    if n_zero > 0 {
        debug!(dimension = n, zero_pivots = n_zero, "covariance is singular, sampling in a subspace");
    }
    Ok(l)
}

/// Draws from N(mean, covariance).
#[derive(Debug, Clone)]
pub struct MvnSampler {
    mean: Col<f64>,
    factor: Mat<f64>,
}

impl MvnSampler {
    pub fn new(mean: Col<f64>, covariance: &Mat<f64>, tolerance: f64) -> Result<Self, SimulationError> {
        if covariance.nrows() != mean.nrows() {
            return Err(SimulationError::DimensionMismatch {
                expected: mean.nrows(),
                got: covariance.nrows(),
            });
        }
        let factor = semidefinite_cholesky(covariance, tolerance)?;
        Ok(Self { mean, factor })
    }

    pub fn dimension(&self) -> usize {
        self.mean.nrows()
    }

    pub fn mean(&self) -> &Col<f64> {
        &self.mean
    }

    /// One draw `mean + L z` with `z ~ N(0, I)`.
    pub fn draw<R: Rng>(&self, rng: &mut R) -> Col<f64> {
        let n = self.dimension();
        let z: Vec<f64> = (0..n).map(|_| rng.sample(StandardNormal)).collect();
        Col::from_fn(n, |i| {
            let mut v = self.mean[i];
            for k in 0..=i {
                v += self.factor[(i, k)] * z[k];
            }
            v
        })
    }
}

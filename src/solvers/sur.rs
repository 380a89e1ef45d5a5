//! Seemingly unrelated regressions with a shared design.
//!
//! Every equation uses the same design matrix, so the system estimate is
//! equation-by-equation OLS. What the system adds is the joint robust
//! covariance: the `(a, b)` block is `B⁻¹ (Σᵢ xᵢxᵢᵀ eₐᵢ e_bᵢ) B⁻¹` with
//! `B = X'X`, without a small-sample correction.

use crate::core::{CovarianceType, RegressionResult};
use crate::inference::CoefficientInference;
use crate::solvers::ols::OlsRegressor;
use crate::solvers::traits::{FittedRegressor, RegressionError, Regressor};
use faer::{Col, Mat};
use tracing::debug;

/// System estimator for equations sharing one design matrix.
#[derive(Debug, Clone)]
pub struct SurEstimator {
    rank_tolerance: f64,
}

impl Default for SurEstimator {
    fn default() -> Self {
        Self {
            rank_tolerance: 1e-10,
        }
    }
}

impl SurEstimator {
    pub fn new(rank_tolerance: f64) -> Self {
        Self { rank_tolerance }
    }

    /// Fit every `(name, y)` equation on `x`.
    pub fn fit(&self, x: &Mat<f64>, equations: &[(&str, &Col<f64>)]) -> Result<FittedSur, RegressionError> {
        if equations.is_empty() {
            return Err(RegressionError::NoEquations);
        }

        let ols = OlsRegressor::builder()
            .rank_tolerance(self.rank_tolerance)
            .covariance(CovarianceType::HC0)
            .build();

        let mut fitted = Vec::with_capacity(equations.len());
        for (name, y) in equations {
            let result = ols.fit(x, y)?.into_result();
            debug!(equation = %name, rank = result.rank, r_squared = result.r_squared, "equation fitted");
            fitted.push(SurEquation {
                name: name.to_string(),
                result,
            });
        }

        let p = x.ncols();
        let g = fitted.len();
        let xtx_inv = &fitted[0].result.xtx_inverse;
        let mut joint = Mat::zeros(g * p, g * p);
        for a in 0..g {
            for b in a..g {
                let block = CoefficientInference::sandwich(
                    x,
                    xtx_inv,
                    &fitted[a].result.residuals,
                    &fitted[b].result.residuals,
                );
                for i in 0..p {
                    for j in 0..p {
                        joint[(a * p + i, b * p + j)] = block[(i, j)];
                        joint[(b * p + j, a * p + i)] = block[(i, j)];
                    }
                }
            }
        }

        Ok(FittedSur {
            equations: fitted,
            n_features: p,
            joint_covariance: joint,
        })
    }
}

/// One equation of a fitted system.
#[derive(Debug, Clone)]
pub struct SurEquation {
    pub name: String,
    pub result: RegressionResult,
}

impl FittedRegressor for SurEquation {
    fn predict(&self, x: &Mat<f64>) -> Col<f64> {
        crate::utils::linear_predictor(x, &self.result.coefficients)
    }

    fn result(&self) -> &RegressionResult {
        &self.result
    }
}

/// A fitted system.
#[derive(Debug, Clone)]
pub struct FittedSur {
    equations: Vec<SurEquation>,
    n_features: usize,
    joint_covariance: Mat<f64>,
}

impl FittedSur {
    pub fn equations(&self) -> &[SurEquation] {
        &self.equations
    }

    pub fn equation(&self, index: usize) -> &SurEquation {
        &self.equations[index]
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Stacked coefficient vector, equation by equation.
    pub fn joint_coefficients(&self) -> Col<f64> {
        let p = self.n_features;
        Col::from_fn(self.equations.len() * p, |k| {
            self.equations[k / p].result.coefficients[k % p]
        })
    }

    pub fn joint_covariance(&self) -> &Mat<f64> {
        &self.joint_covariance
    }

    /// Slice equation `index` out of a stacked vector.
    pub fn split(&self, joint: &Col<f64>, index: usize) -> Col<f64> {
        let p = self.n_features;
        Col::from_fn(p, |j| joint[index * p + j])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn system() -> (Mat<f64>, Col<f64>, Col<f64>) {
        let n = 30;
        let x = Mat::from_fn(n, 3, |i, j| match j {
            0 => 1.0,
            1 => i as f64,
            _ => ((i * 7) % 5) as f64,
        });
        let noise = |i: usize, s: usize| (((i * s) % 11) as f64 - 5.0) * 0.01;
        let y1 = Col::from_fn(n, |i| 1.0 + 0.2 * i as f64 - 0.3 * x[(i, 2)] + noise(i, 3));
        let y2 = Col::from_fn(n, |i| -0.5 + 0.05 * i as f64 + 0.1 * x[(i, 2)] + noise(i, 7));
        (x, y1, y2)
    }

    #[test]
    fn test_equations_match_single_ols() {
        let (x, y1, y2) = system();
        let sur = SurEstimator::default()
            .fit(&x, &[("infections", &y1), ("deaths", &y2)])
            .unwrap();
        let single = OlsRegressor::builder().build().fit(&x, &y2).unwrap();

        for j in 0..3 {
            assert_relative_eq!(
                sur.equation(1).result.coefficients[j],
                single.coefficients()[j],
                epsilon = 1e-12
            );
        }
    }

    #[test]
    fn test_joint_covariance_blocks() {
        let (x, y1, y2) = system();
        let sur = SurEstimator::default()
            .fit(&x, &[("infections", &y1), ("deaths", &y2)])
            .unwrap();
        let joint = sur.joint_covariance();
        assert_eq!(joint.nrows(), 6);

        // diagonal blocks equal each equation's HC0 covariance
        let own = &sur.equation(0).result.covariance;
        for i in 0..3 {
            for j in 0..3 {
                assert_relative_eq!(joint[(i, j)], own[(i, j)], max_relative = 1e-12);
            }
        }
        // symmetric overall
        assert!(crate::utils::max_asymmetry(joint) < 1e-12);
    }

    #[test]
    fn test_split_roundtrip() {
        let (x, y1, y2) = system();
        let sur = SurEstimator::default()
            .fit(&x, &[("infections", &y1), ("deaths", &y2)])
            .unwrap();
        let joint = sur.joint_coefficients();
        let deaths = sur.split(&joint, 1);
        for j in 0..3 {
            assert_eq!(deaths[j], sur.equation(1).result.coefficients[j]);
        }
    }

    #[test]
    fn test_empty_system_rejected() {
        let (x, _, _) = system();
        assert!(matches!(
            SurEstimator::default().fit(&x, &[]),
            Err(RegressionError::NoEquations)
        ));
    }
}

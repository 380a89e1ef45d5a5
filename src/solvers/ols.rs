//! Ordinary Least Squares regression solver.

use crate::core::{CovarianceType, RegressionResult};
use crate::inference::CoefficientInference;
use crate::solvers::traits::{FittedRegressor, RegressionError, Regressor};
use crate::utils::linear_predictor;
use faer::{Col, Mat};

/// Ordinary Least Squares regression estimator.
///
/// The design matrix is used as given: include an intercept column when one
/// is wanted. Uses QR decomposition with column pivoting to handle
/// rank-deficient matrices. Aliased (collinear) coefficients are set to 0 and
/// get zero rows and columns in the covariance, so the covariance stays
/// positive semi-definite.
///
/// # Example
///
/// ```rust,ignore
/// use vaccine_value::solvers::{OlsRegressor, Regressor, FittedRegressor};
/// use vaccine_value::core::CovarianceType;
///
/// let fitted = OlsRegressor::builder()
///     .covariance(CovarianceType::HC1)
///     .build()
///     .fit(&x, &y)?;
///
/// println!("R² = {}", fitted.r_squared());
/// ```
#[derive(Debug, Clone)]
pub struct OlsRegressor {
    rank_tolerance: f64,
    covariance: CovarianceType,
}

impl Default for OlsRegressor {
    fn default() -> Self {
        Self {
            rank_tolerance: 1e-10,
            covariance: CovarianceType::HC0,
        }
    }
}

impl OlsRegressor {
    /// Create a builder for configuring the regressor.
    pub fn builder() -> OlsRegressorBuilder {
        OlsRegressorBuilder::default()
    }

    pub fn rank_tolerance(&self) -> f64 {
        self.rank_tolerance
    }

    /// Solve the least squares problem using QR decomposition with column pivoting.
    ///
    /// (X'X)⁻¹ comes from the same R factor, so every column the rank check
    /// keeps also gets a finite covariance.
    pub(crate) fn solve_with_qr(&self, x: &Mat<f64>, y: &Col<f64>) -> Result<QrSolution, RegressionError> {
        let n_features = x.ncols();
        let n_samples = x.nrows();

        let qr = x.col_piv_qr();
        let q = qr.compute_Q();
        let r = qr.R();
        let (forward, inverse) = qr.P().arrays();

        // forward[k] = original column at pivoted position k
        // inverse[j] = pivoted position of original column j
        let columns: Vec<usize> = forward.to_vec();
        let position: Vec<usize> = inverse.to_vec();

        // Determine numerical rank from R diagonal
        let mut rank = 0;
        for i in 0..n_features.min(n_samples) {
            if r[(i, i)].abs() > self.rank_tolerance {
                rank += 1;
            } else {
                break;
            }
        }

        if rank == 0 {
            return Err(RegressionError::SingularMatrix);
        }

        let aliased: Vec<bool> = (0..n_features).map(|j| position[j] >= rank).collect();

        // Solve R * beta_perm = Q' * y for the non-aliased part
        let qty = q.transpose() * y;

        let mut beta_reduced = Col::zeros(rank);
        for i in (0..rank).rev() {
            let mut sum = qty[i];
            for j in (i + 1)..rank {
                sum -= r[(i, j)] * beta_reduced[j];
            }
            beta_reduced[i] = sum / r[(i, i)];
        }

        let coefficients = Col::from_fn(n_features, |j| {
            if aliased[j] {
                0.0
            } else {
                beta_reduced[position[j]]
            }
        });

        let xtx_inverse = CoefficientInference::xtx_inverse(r, &columns, rank, n_features);

        Ok(QrSolution {
            coefficients,
            aliased,
            rank,
            xtx_inverse,
        })
    }
}

/// Output of the pivoted QR solve.
pub(crate) struct QrSolution {
    pub coefficients: Col<f64>,
    pub aliased: Vec<bool>,
    pub rank: usize,
    pub xtx_inverse: Mat<f64>,
}

impl Regressor for OlsRegressor {
    type Fitted = FittedOls;

    fn fit(&self, x: &Mat<f64>, y: &Col<f64>) -> Result<Self::Fitted, RegressionError> {
        let n_samples = x.nrows();

        if x.nrows() != y.nrows() {
            return Err(RegressionError::DimensionMismatch {
                x_rows: x.nrows(),
                y_len: y.nrows(),
            });
        }

        if n_samples < 2 {
            return Err(RegressionError::InsufficientObservations {
                needed: 2,
                got: n_samples,
            });
        }

        if y.iter().any(|v| !v.is_finite()) {
            return Err(RegressionError::NonFinite("response"));
        }
        for j in 0..x.ncols() {
            if (0..n_samples).any(|i| !x[(i, j)].is_finite()) {
                return Err(RegressionError::NonFinite("design matrix"));
            }
        }

        let QrSolution {
            coefficients,
            aliased,
            rank,
            xtx_inverse,
        } = self.solve_with_qr(x, y)?;

        let fitted_values = linear_predictor(x, &coefficients);
        let residuals = Col::from_fn(n_samples, |i| y[i] - fitted_values[i]);

        let covariance =
            CoefficientInference::robust_covariance(x, &xtx_inverse, &residuals, rank, self.covariance);

        let result = compute_statistics(
            y,
            coefficients,
            residuals,
            fitted_values,
            aliased,
            rank,
            self.rank_tolerance,
            xtx_inverse,
            covariance,
            self.covariance,
        );

        Ok(FittedOls { result })
    }
}

/// Compute fit statistics.
#[allow(clippy::too_many_arguments)]
fn compute_statistics(
    y: &Col<f64>,
    coefficients: Col<f64>,
    residuals: Col<f64>,
    fitted_values: Col<f64>,
    aliased: Vec<bool>,
    rank: usize,
    rank_tolerance: f64,
    xtx_inverse: Mat<f64>,
    covariance: Mat<f64>,
    covariance_type: CovarianceType,
) -> RegressionResult {
    let n = y.nrows();

    let y_mean: f64 = y.iter().sum::<f64>() / n as f64;
    let tss: f64 = y.iter().map(|&yi| (yi - y_mean).powi(2)).sum();
    let rss: f64 = residuals.iter().map(|&r| r.powi(2)).sum();

    let r_squared = if tss > 0.0 {
        (1.0 - rss / tss).clamp(0.0, 1.0)
    } else if rss < 1e-10 {
        1.0
    } else {
        0.0
    };

    let df_total = (n - 1) as f64;
    let df_resid = n as f64 - rank as f64;
    let adj_r_squared = if df_resid > 0.0 && df_total > 0.0 {
        1.0 - (1.0 - r_squared) * df_total / df_resid
    } else {
        f64::NAN
    };

    let mse = if df_resid > 0.0 {
        rss / df_resid
    } else {
        f64::NAN
    };

    RegressionResult {
        coefficients,
        residuals,
        fitted_values,
        rank,
        n_observations: n,
        aliased,
        rank_tolerance,
        r_squared,
        adj_r_squared,
        rss,
        mse,
        xtx_inverse,
        covariance,
        covariance_type,
    }
}

/// A fitted OLS regression model.
#[derive(Debug, Clone)]
pub struct FittedOls {
    result: RegressionResult,
}

impl FittedOls {
    pub fn into_result(self) -> RegressionResult {
        self.result
    }
}

impl FittedRegressor for FittedOls {
    fn predict(&self, x: &Mat<f64>) -> Col<f64> {
        linear_predictor(x, &self.result.coefficients)
    }

    fn result(&self) -> &RegressionResult {
        &self.result
    }
}

/// Builder for `OlsRegressor`.
#[derive(Debug, Clone, Default)]
pub struct OlsRegressorBuilder {
    regressor: OlsRegressor,
}

impl OlsRegressorBuilder {
    /// Create a new builder with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the rank tolerance for QR decomposition.
    pub fn rank_tolerance(mut self, tol: f64) -> Self {
        self.regressor.rank_tolerance = tol;
        self
    }

    /// Set the robust covariance estimator.
    pub fn covariance(mut self, kind: CovarianceType) -> Self {
        self.regressor.covariance = kind;
        self
    }

    /// Build the OLS regressor.
    pub fn build(self) -> OlsRegressor {
        self.regressor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn with_intercept(x: &Mat<f64>) -> Mat<f64> {
        Mat::from_fn(x.nrows(), x.ncols() + 1, |i, j| if j == 0 { 1.0 } else { x[(i, j - 1)] })
    }

    #[test]
    fn test_simple_fit() {
        let x = with_intercept(&Mat::from_fn(5, 1, |i, _| i as f64));
        let y = Col::from_fn(5, |i| 2.0 + 3.0 * i as f64);

        let fitted = OlsRegressor::builder().build().fit(&x, &y).unwrap();

        assert_relative_eq!(fitted.coefficients()[0], 2.0, epsilon = 1e-10);
        assert_relative_eq!(fitted.coefficients()[1], 3.0, epsilon = 1e-10);
        assert_relative_eq!(fitted.r_squared(), 1.0, epsilon = 1e-10);
    }

    #[test]
    fn test_predict() {
        let x = with_intercept(&Mat::from_fn(5, 1, |i, _| i as f64));
        let y = Col::from_fn(5, |i| 2.0 + 3.0 * i as f64);
        let fitted = OlsRegressor::builder().build().fit(&x, &y).unwrap();

        let x_new = with_intercept(&Mat::from_fn(2, 1, |i, _| (i + 10) as f64));
        let preds = fitted.predict(&x_new);

        assert_relative_eq!(preds[0], 32.0, epsilon = 1e-9);
        assert_relative_eq!(preds[1], 35.0, epsilon = 1e-9);
    }

    #[test]
    fn test_aliased_column_is_zero_with_zero_covariance() {
        // third column duplicates the second
        let x = Mat::from_fn(8, 3, |i, j| match j {
            0 => 1.0,
            _ => i as f64,
        });
        let y = Col::from_fn(8, |i| 1.0 + 0.5 * i as f64 + if i % 2 == 0 { 0.1 } else { -0.1 });
        let fitted = OlsRegressor::builder().build().fit(&x, &y).unwrap();
        let result = fitted.result();

        assert_eq!(result.rank, 2);
        assert_eq!(result.aliased.iter().filter(|&&a| a).count(), 1);
        let j = result.aliased.iter().position(|&a| a).unwrap();
        assert_eq!(result.coefficients[j], 0.0);
        for k in 0..3 {
            assert_eq!(result.covariance[(j, k)], 0.0);
            assert_eq!(result.covariance[(k, j)], 0.0);
        }
        // slope from the normal equations of y on [1, i]
        let n = 8.0;
        let (sx, sy) = (0..8).fold((0.0, 0.0), |(a, b), i| (a + i as f64, b + y[i]));
        let (sxx, sxy) = (0..8).fold((0.0, 0.0), |(a, b), i| (a + (i * i) as f64, b + i as f64 * y[i]));
        let expected = (n * sxy - sx * sy) / (n * sxx - sx * sx);
        let slope: f64 = (1..3).map(|k| result.coefficients[k]).sum();
        assert_relative_eq!(slope, expected, epsilon = 1e-10);
    }

    /// Columns on unequal scales so that pivoting reorders them.
    fn scaled_design(n: usize) -> Mat<f64> {
        Mat::from_fn(n, 4, |i, j| match j {
            0 => 1.0,
            1 => ((i * 7) % 5) as f64,
            2 => 10.0 * ((i * 3) % 7) as f64,
            _ => 100.0 * i as f64,
        })
    }

    #[test]
    fn test_pivoted_fit_recovers_coefficients() {
        let x = scaled_design(30);
        let beta = [1.0, -2.0, 0.5, 3.0];
        let y = Col::from_fn(30, |i| {
            (0..4).map(|j| x[(i, j)] * beta[j]).sum::<f64>() + 0.01 * (((i * 13) % 7) as f64 - 3.0)
        });

        let fitted = OlsRegressor::default().fit(&x, &y).unwrap();
        for (j, expected) in beta.into_iter().enumerate() {
            assert_relative_eq!(fitted.coefficients()[j], expected, epsilon = 1e-2);
        }

        // residuals are orthogonal to every column of X
        let e = &fitted.result().residuals;
        for j in 0..4 {
            let scale: f64 = (0..30).map(|i| x[(i, j)].abs()).sum();
            let dot: f64 = (0..30).map(|i| x[(i, j)] * e[i]).sum();
            assert!(dot.abs() < 1e-9 * scale, "column {j}: X'e = {dot}");
        }
    }

    #[test]
    fn test_xtx_inverse_inverts_cross_product() {
        let x = scaled_design(20);
        let y = Col::from_fn(20, |i| ((i * 5) % 9) as f64);
        let fitted = OlsRegressor::default().fit(&x, &y).unwrap();

        let xtx = x.transpose() * &x;
        let product = &xtx * &fitted.result().xtx_inverse;
        for i in 0..4 {
            for j in 0..4 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_relative_eq!(product[(i, j)], expected, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn test_small_scale_regressor_is_estimated() {
        // a regressor on the 1e-6 scale, like the uptake of a rare product
        let x = Mat::from_fn(40, 3, |i, j| match j {
            0 => 1.0,
            1 => i as f64,
            _ => 1e-6 * ((i * 7) % 5) as f64,
        });
        let y = Col::from_fn(40, |i| 2.0 + 0.1 * i as f64 + 5e5 * x[(i, 2)] + 0.01 * ((i % 3) as f64 - 1.0));

        let fitted = OlsRegressor::default().fit(&x, &y).unwrap();
        let result = fitted.result();
        assert_eq!(result.rank, 3);
        assert!(result.aliased.iter().all(|&a| !a));
        assert_relative_eq!(result.coefficients[2], 5e5, max_relative = 0.05);

        let cov = &result.covariance;
        for j in 0..3 {
            assert!(cov[(j, j)].is_finite() && cov[(j, j)] >= 0.0);
        }
        assert!(crate::utils::max_asymmetry(cov) <= 1e-12 * cov[(2, 2)]);
    }

    #[test]
    fn test_non_finite_design_rejected() {
        let mut x = with_intercept(&Mat::from_fn(4, 1, |i, _| i as f64));
        x[(2, 1)] = f64::NAN;
        let y = Col::from_fn(4, |i| i as f64);
        assert!(matches!(
            OlsRegressor::builder().build().fit(&x, &y),
            Err(RegressionError::NonFinite(_))
        ));
    }
}

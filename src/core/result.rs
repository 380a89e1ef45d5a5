//! Regression result structures.

use faer::{Col, Mat};
use serde::{Deserialize, Serialize};

/// Heteroskedasticity-robust covariance estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CovarianceType {
    /// White sandwich, no small-sample correction.
    #[default]
    HC0,
    /// HC0 scaled by `n / (n - k)`.
    HC1,
}

/// Complete result from a least-squares fit.
#[derive(Debug, Clone)]
pub struct RegressionResult {
    // ========== Core Results ==========
    /// Estimated coefficients in design-column order.
    /// Aliased (collinear) coefficients are set to 0.
    pub coefficients: Col<f64>,

    /// Residuals (y - fitted_values).
    pub residuals: Col<f64>,

    /// Fitted values (predictions on training data).
    pub fitted_values: Col<f64>,

    // ========== Rank Information ==========
    /// Numerical rank of the design matrix.
    pub rank: usize,

    /// Number of observations.
    pub n_observations: usize,

    /// Indicates which coefficients are aliased (perfectly collinear).
    pub aliased: Vec<bool>,

    /// Tolerance used for rank determination.
    pub rank_tolerance: f64,

    // ========== Fit Statistics ==========
    /// Coefficient of determination (R²), computed around the mean.
    pub r_squared: f64,

    /// Adjusted R².
    pub adj_r_squared: f64,

    /// Residual sum of squares.
    pub rss: f64,

    /// Mean squared error, `rss / (n - rank)`.
    pub mse: f64,

    // ========== Inference ==========
    /// (X'X)⁻¹ over non-aliased columns, zero rows/columns where aliased.
    pub xtx_inverse: Mat<f64>,

    /// Robust covariance of the coefficients, zero where aliased.
    pub covariance: Mat<f64>,

    /// Estimator used for `covariance`.
    pub covariance_type: CovarianceType,
}

impl RegressionResult {
    /// Residual degrees of freedom.
    pub fn residual_df(&self) -> usize {
        self.n_observations.saturating_sub(self.rank)
    }

    pub fn n_features(&self) -> usize {
        self.coefficients.nrows()
    }

    /// Robust standard errors (NaN where aliased).
    pub fn std_errors(&self) -> Col<f64> {
        Col::from_fn(self.n_features(), |j| {
            if self.aliased[j] {
                f64::NAN
            } else {
                self.covariance[(j, j)].max(0.0).sqrt()
            }
        })
    }
}

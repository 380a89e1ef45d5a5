//! Coefficient inference calculations.

use crate::core::CovarianceType;
use faer::{Col, Mat, MatRef};
use serde::Serialize;
use statrs::distribution::{ContinuousCDF, Normal};

/// Computes inference statistics for regression coefficients.
pub struct CoefficientInference;

impl CoefficientInference {
    /// Compute (X'X)⁻¹ from the R factor of a column-pivoted QR of X.
    ///
    /// `columns[a]` is the original column at pivoted position `a`; only the
    /// leading `rank` positions are used. With `R₁₁` the leading `rank × rank`
    /// block, (X'X)⁻¹ over the kept columns is `R₁₁⁻¹ R₁₁⁻ᵀ`. The result is
    /// `p × p` with zero rows and columns at aliased positions, so it stays
    /// positive semi-definite however small the kept pivots are.
    pub fn xtx_inverse(r: MatRef<'_, f64>, columns: &[usize], rank: usize, p: usize) -> Mat<f64> {
        // R₁₁⁻¹ by back substitution, one unit vector at a time
        let mut r_inv = Mat::<f64>::zeros(rank, rank);
        for col in 0..rank {
            for i in (0..=col).rev() {
                let mut sum = if i == col { 1.0 } else { 0.0 };
                for j in (i + 1)..=col {
                    sum -= r[(i, j)] * r_inv[(j, col)];
                }
                r_inv[(i, col)] = sum / r[(i, i)];
            }
        }

        let mut full = Mat::zeros(p, p);
        for a in 0..rank {
            for b in a..rank {
                let v: f64 = (b..rank).map(|k| r_inv[(a, k)] * r_inv[(b, k)]).sum();
                full[(columns[a], columns[b])] = v;
                full[(columns[b], columns[a])] = v;
            }
        }
        full
    }

    /// Sandwich `B⁻¹ (Σᵢ xᵢxᵢᵀ eₐᵢ e_bᵢ) B⁻¹` for a pair of residual vectors.
    ///
    /// With `e_a == e_b` this is the HC0 covariance of one equation; with two
    /// equations sharing `X` it is their cross-covariance block.
    pub fn sandwich(x: &Mat<f64>, xtx_inv: &Mat<f64>, e_a: &Col<f64>, e_b: &Col<f64>) -> Mat<f64> {
        let weighted = Mat::from_fn(x.nrows(), x.ncols(), |i, j| x[(i, j)] * e_a[i] * e_b[i]);
        let meat = x.transpose() * &weighted;
        let left = xtx_inv * &meat;
        &left * xtx_inv
    }

    /// Robust covariance of a single equation.
    pub fn robust_covariance(
        x: &Mat<f64>,
        xtx_inv: &Mat<f64>,
        residuals: &Col<f64>,
        rank: usize,
        kind: CovarianceType,
    ) -> Mat<f64> {
        let mut cov = Self::sandwich(x, xtx_inv, residuals, residuals);
        if kind == CovarianceType::HC1 {
            let n = x.nrows();
            let scale = if n > rank {
                n as f64 / (n - rank) as f64
            } else {
                f64::NAN
            };
            for i in 0..cov.nrows() {
                for j in 0..cov.ncols() {
                    cov[(i, j)] *= scale;
                }
            }
        }
        cov
    }

    /// Compute z-statistics for coefficients.
    ///
    /// z_j = β_j / SE(β_j)
    pub fn z_statistics(coefficients: &Col<f64>, std_errors: &Col<f64>) -> Col<f64> {
        Col::from_fn(coefficients.nrows(), |j| {
            if std_errors[j].is_nan() || std_errors[j] == 0.0 {
                f64::NAN
            } else {
                coefficients[j] / std_errors[j]
            }
        })
    }

    /// Two-sided p-values from standard normal z-statistics.
    pub fn p_values(z_statistics: &Col<f64>) -> Col<f64> {
        let normal = Normal::new(0.0, 1.0).ok();
        Col::from_fn(z_statistics.nrows(), |j| {
            let z = z_statistics[j];
            match normal {
                Some(d) if z.is_finite() => 2.0 * (1.0 - d.cdf(z.abs())),
                _ => f64::NAN,
            }
        })
    }
}

/// One line of a coefficient table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoefficientRow {
    pub equation: String,
    pub name: String,
    pub estimate: f64,
    pub std_error: f64,
    pub z_statistic: f64,
    pub p_value: f64,
}

/// Coefficient estimates with robust inference, for audit output.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CoefficientTable {
    pub rows: Vec<CoefficientRow>,
}

impl CoefficientTable {
    /// Build a table from estimates and their covariance.
    ///
    /// Aliased coefficients carry NaN standard errors.
    pub fn new(
        equation: &str,
        names: &[String],
        coefficients: &Col<f64>,
        covariance: &Mat<f64>,
        aliased: &[bool],
    ) -> Self {
        let se = Col::from_fn(coefficients.nrows(), |j| {
            if aliased[j] {
                f64::NAN
            } else {
                covariance[(j, j)].max(0.0).sqrt()
            }
        });
        let z = CoefficientInference::z_statistics(coefficients, &se);
        let p = CoefficientInference::p_values(&z);

        let rows = names
            .iter()
            .enumerate()
            .map(|(j, name)| CoefficientRow {
                equation: equation.to_string(),
                name: name.clone(),
                estimate: coefficients[j],
                std_error: se[j],
                z_statistic: z[j],
                p_value: p[j],
            })
            .collect();
        Self { rows }
    }

    pub fn get(&self, name: &str) -> Option<&CoefficientRow> {
        self.rows.iter().find(|r| r.name == name)
    }

    /// Append another table's rows.
    pub fn extend(&mut self, other: CoefficientTable) {
        self.rows.extend(other.rows);
    }
}

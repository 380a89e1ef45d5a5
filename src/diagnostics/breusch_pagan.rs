//! Breusch–Pagan test for residual heteroskedasticity.
//!
//! Koenker's studentized form: regress squared residuals on the design
//! (intercept column included) and compare `n·R²` with χ²(rank − 1). The
//! F form of the same auxiliary regression is reported alongside.

use crate::solvers::{FittedRegressor, OlsRegressor, RegressionError, Regressor};
use faer::{Col, Mat};
use serde::Serialize;
use statrs::distribution::{ChiSquared, ContinuousCDF, FisherSnedecor};

/// Result of a Breusch–Pagan test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BreuschPagan {
    /// Lagrange multiplier statistic, `n·R²`.
    pub lm_statistic: f64,
    pub lm_pvalue: f64,
    pub f_statistic: f64,
    pub f_pvalue: f64,
    pub df_model: usize,
    pub df_resid: usize,
}

impl BreuschPagan {
    /// Reject homoskedasticity at `alpha` using the LM p-value.
    pub fn is_heteroskedastic(&self, alpha: f64) -> bool {
        self.lm_pvalue < alpha
    }
}

/// Run the test for `residuals` of a fit on `x`.
pub fn breusch_pagan(x: &Mat<f64>, residuals: &Col<f64>) -> Result<BreuschPagan, RegressionError> {
    let n = residuals.nrows();
    let squared = Col::from_fn(n, |i| residuals[i] * residuals[i]);

    let aux = OlsRegressor::builder().build().fit(x, &squared)?;
    let result = aux.result();
    let mean = squared.iter().sum::<f64>() / n as f64;
    let tss: f64 = squared.iter().map(|v| (v - mean).powi(2)).sum();
    // Constant squared residuals carry no evidence of heteroskedasticity.
    let r_squared = if tss > 0.0 { result.r_squared } else { 0.0 };
    let df_model = result.rank.saturating_sub(1);
    let df_resid = result.residual_df();

    let lm_statistic = n as f64 * r_squared;
    let lm_pvalue = if df_model > 0 {
        ChiSquared::new(df_model as f64)
            .ok()
            .map_or(f64::NAN, |d| 1.0 - d.cdf(lm_statistic))
    } else {
        f64::NAN
    };

    let (f_statistic, f_pvalue) = if df_model > 0 && df_resid > 0 && r_squared < 1.0 {
        let f = (r_squared / df_model as f64) / ((1.0 - r_squared) / df_resid as f64);
        let p = FisherSnedecor::new(df_model as f64, df_resid as f64)
            .ok()
            .map_or(f64::NAN, |d| 1.0 - d.cdf(f));
        (f, p)
    } else {
        (f64::NAN, f64::NAN)
    };

    Ok(BreuschPagan {
        lm_statistic,
        lm_pvalue,
        f_statistic,
        f_pvalue,
        df_model,
        df_resid,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn design(n: usize) -> Mat<f64> {
        Mat::from_fn(n, 2, |i, j| if j == 0 { 1.0 } else { (i + 1) as f64 })
    }

    #[test]
    fn test_detects_variance_growing_with_regressor() {
        let n = 60;
        let x = design(n);
        let resid = Col::from_fn(n, |i| {
            let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
            sign * (i + 1) as f64 * 0.1
        });
        let bp = breusch_pagan(&x, &resid).unwrap();
        assert_eq!(bp.df_model, 1);
        assert!(bp.is_heteroskedastic(0.01));
    }

    #[test]
    fn test_constant_variance_not_rejected() {
        let n = 40;
        let x = design(n);
        let resid = Col::from_fn(n, |i| if i % 2 == 0 { 1.0 } else { -1.0 });
        let bp = breusch_pagan(&x, &resid).unwrap();
        assert_relative_eq!(bp.lm_statistic, 0.0, epsilon = 1e-9);
        assert!(!bp.is_heteroskedastic(0.05));
    }
}

//! Regression solvers: single-equation OLS and a shared-design SUR system.

mod ols;
mod sur;
mod traits;

pub use ols::{FittedOls, OlsRegressor, OlsRegressorBuilder};
pub use sur::{FittedSur, SurEquation, SurEstimator};
pub use traits::{FittedRegressor, RegressionError, Regressor};

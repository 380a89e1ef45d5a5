//! Statistical inference (robust covariance, standard errors, p-values).

mod coefficient;

pub use coefficient::{CoefficientInference, CoefficientRow, CoefficientTable};

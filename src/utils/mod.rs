//! Shared numeric helpers.

mod matrix;

pub use matrix::{linear_predictor, max_asymmetry, row_dot};

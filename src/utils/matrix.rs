//! Matrix utility functions.

use faer::{Col, Mat};

/// Inner product of row `i` of `x` with `beta`.
pub fn row_dot(x: &Mat<f64>, i: usize, beta: &Col<f64>) -> f64 {
    let mut sum = 0.0;
    for j in 0..x.ncols() {
        sum += x[(i, j)] * beta[j];
    }
    sum
}

/// Linear predictor `X β` computed row by row.
pub fn linear_predictor(x: &Mat<f64>, beta: &Col<f64>) -> Col<f64> {
    Col::from_fn(x.nrows(), |i| row_dot(x, i, beta))
}

/// Largest absolute asymmetry `|a_ij - a_ji|`.
pub fn max_asymmetry(a: &Mat<f64>) -> f64 {
    let mut worst: f64 = 0.0;
    for i in 0..a.nrows() {
        for j in 0..i {
            worst = worst.max((a[(i, j)] - a[(j, i)]).abs());
        }
    }
    worst
}

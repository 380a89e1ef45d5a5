//! Counterfactual simulation: propagation, prediction and Monte Carlo.

mod monte_carlo;
mod predictor;
mod propagator;
mod sampler;

pub use monte_carlo::{CoefficientDraw, MonteCarloEngine, MonteCarloOutcome};
pub use predictor::{AvertedRow, AvertedTable, Outcome, ScenarioPredictions};
pub use propagator::{apply_propagated_lags, InfectionPropagator, Propagation};
pub use sampler::{semidefinite_cholesky, MvnSampler};

use thiserror::Error;

/// Errors raised by sampling and the draw pool.
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("covariance contains non-finite values")]
    NonFiniteCovariance,

    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("failed to build thread pool: {0}")]
    ThreadPool(String),

    #[error("all {0} Monte Carlo draws failed")]
    AllDrawsFailed(usize),
}

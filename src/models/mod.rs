//! Fitted outcome models.
//!
//! Each model owns its estimation sample, its observed and counterfactual
//! designs, and the fit. Evaluation takes a coefficient vector from outside,
//! so the same model serves the basecase and every Monte Carlo draw.

mod annual_gdp;
mod health;
mod quarterly_gdp;

pub use annual_gdp::{AnnualAvertedRow, AnnualGdpModel, AnnualGdpTable, AnnualObservation};
pub use health::{HealthEvaluation, HealthModel, DEATHS_EQUATION, INFECTIONS_EQUATION};
pub use quarterly_gdp::{QuarterlyGdpEvaluation, QuarterlyGdpModel, QUARTERLY_GDP_EQUATION};

use crate::core::SampleError;
use crate::solvers::RegressionError;
use crate::simulation::SimulationError;
use thiserror::Error;

/// Errors raised while fitting or evaluating a model.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error(transparent)]
    Sample(#[from] SampleError),

    #[error("{model} regression failed: {source}")]
    Regression {
        model: &'static str,
        #[source]
        source: RegressionError,
    },

    #[error(transparent)]
    Simulation(#[from] SimulationError),

    #[error("annual GDP sub-model has no usable countries")]
    NoAnnualCountries,

    #[error("coefficient vector has {got} entries, model expects {expected}")]
    CoefficientLength { expected: usize, got: usize },
}

impl ModelError {
    pub(crate) fn regression(model: &'static str) -> impl FnOnce(RegressionError) -> Self {
        move |source| ModelError::Regression { model, source }
    }
}

//! Counterfactual valuation of a vaccination programme from a country-quarter panel.
//!
//! The engine fits a two-equation SUR system for infections and deaths, an
//! OLS model of the quarterly GDP gap and a cross-sectional annual GDP model.
//! It then predicts outcomes under two counterfactuals: without the target
//! manufacturer group, and without any vaccination. Infection lags are
//! re-propagated through each counterfactual. Averted outcomes are valued
//! with per-country multipliers, and coefficient uncertainty is carried
//! through Monte Carlo draws.
//!
//! # Example
//!
//! ```rust,ignore
//! use vaccine_value::prelude::*;
//!
//! let panel = vaccine_value::io::read_panel_path("panel.csv")?;
//! let options = EngineOptions::builder().n_draws(1000).build()?;
//! let engine = Engine::fit(panel, options)?;
//!
//! let report = engine.run(&valuation)?;
//! let summary = &report.basecase.summary;
//! println!("value per dose = {}", summary.scenarios.no_target.value_per_dose);
//! ```

pub mod aggregation;
pub mod core;
pub mod design;
pub mod diagnostics;
pub mod inference;
pub mod io;
pub mod models;
pub mod pipeline;
pub mod simulation;
pub mod solvers;
pub mod utils;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::aggregation::{
        GlobalSummary, Measure, Multipliers, OutcomeTotals, PercentileTable, ValuationInputs, ValueComponents,
    };
    pub use crate::core::{
        Counterfactual, CoverageReport, EngineOptions, EngineOptionsBuilder, GdpSeries, Panel, PanelObservation,
        PerScenario, Period, Scenario,
    };
    pub use crate::models::{AnnualGdpModel, HealthModel, QuarterlyGdpModel};
    pub use crate::pipeline::{Basecase, CoefficientSource, Engine, EngineError, Evaluation, RunReport, UncertaintyReport};
    pub use crate::solvers::{FittedRegressor, OlsRegressor, Regressor, SurEstimator};
}

pub use crate::core::{Counterfactual, EngineOptions, Panel, PanelObservation, PerScenario, Period};
pub use crate::pipeline::{Engine, EngineError};

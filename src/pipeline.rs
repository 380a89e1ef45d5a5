//! The parameterized pipeline.
//!
//! One [`Engine`] fits every model once. [`Engine::evaluate`] then runs the
//! counterfactual chain (design, propagation, prediction, valuation) for a
//! [`CoefficientSource`]: the fitted means for the basecase, or one
//! pre-generated Monte Carlo draw. Valuation tables are a parameter, so
//! discounted and undiscounted runs are two calls on the same engine.

use crate::aggregation::{
    country_table, CountryValue, GlobalSummary, OutcomeTotals, PercentileTable, SummaryInputs, ValuationInputs,
    ValuedTable,
};
use crate::core::{
    Counterfactual, CoverageNote, CoverageReport, EngineOptions, FailedDraw, OptionsError, Panel, PerScenario,
};
use crate::diagnostics::BreuschPagan;
use crate::inference::CoefficientTable;
use crate::io::IoError;
use crate::models::{
    AnnualGdpModel, AnnualGdpTable, HealthEvaluation, HealthModel, ModelError, QuarterlyGdpEvaluation,
    QuarterlyGdpModel, QUARTERLY_GDP_EQUATION,
};
use crate::simulation::{CoefficientDraw, MonteCarloEngine, MvnSampler, SimulationError};
use faer::Col;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Top-level error of an engine run.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Options(#[from] OptionsError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Simulation(#[from] SimulationError),

    #[error(transparent)]
    Io(#[from] IoError),

    #[error("draw {index} out of range ({n_draws} draws)")]
    DrawOutOfRange { index: usize, n_draws: usize },

    #[error("draw {0} produced non-finite totals")]
    NonFiniteTotals(usize),
}

/// Where the coefficients of an evaluation come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoefficientSource {
    Fitted,
    Draw(usize),
}

/// Coefficient vectors of every model.
#[derive(Debug, Clone)]
struct Coefficients {
    health: Col<f64>,
    quarterly_gdp: Col<f64>,
    annual_gdp: Option<Col<f64>>,
}

/// Output of one pass through the counterfactual chain.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub health: HealthEvaluation,
    pub quarterly_gdp: QuarterlyGdpEvaluation,
    pub annual_gdp: Option<AnnualGdpTable>,
    pub valued: ValuedTable,
    pub countries: Vec<CountryValue>,
    pub notes: Vec<CoverageNote>,
}

impl Evaluation {
    /// Global totals per counterfactual.
    pub fn totals(&self) -> PerScenario<OutcomeTotals> {
        PerScenario::from_fn(|c| {
            let quarterly = self.valued.total(c);
            let annual_gdp = self.annual_gdp.as_ref().map_or(0.0, |t| t.total(c));
            OutcomeTotals {
                infections: self.health.infections.total(c),
                deaths: self.health.deaths.total(c),
                quarterly_gdp: self.quarterly_gdp.gdp.total(c),
                annual_gdp,
                health_value: quarterly.health_value,
                full_value: quarterly.quarterly_value + annual_gdp,
            }
        })
    }
}

/// Basecase outputs with audit tables.
#[derive(Debug, Clone)]
pub struct Basecase {
    pub evaluation: Evaluation,
    pub summary: GlobalSummary,
    pub coefficients: CoefficientTable,
    pub diagnostics: Vec<(String, BreuschPagan)>,
    pub coverage: CoverageReport,
}

#[derive(Debug, Clone)]
pub struct UncertaintyReport {
    pub percentiles: PercentileTable,
    /// Totals of every kept draw, in draw order.
    pub draws: Vec<(usize, PerScenario<OutcomeTotals>)>,
    pub failed: Vec<FailedDraw>,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub basecase: Basecase,
    pub uncertainty: UncertaintyReport,
}

/// Fitted models over one panel.
#[derive(Debug)]
pub struct Engine {
    panel: Panel,
    options: EngineOptions,
    health: HealthModel,
    quarterly_gdp: QuarterlyGdpModel,
    annual_gdp: Option<AnnualGdpModel>,
    fit_coverage: CoverageReport,
    draws: OnceLock<Vec<CoefficientDraw>>,
}

impl Engine {
    /// Validate options and fit every model.
    ///
    /// A panel without usable annual-GDP countries runs without the annual
    /// sub-model.
    pub fn fit(panel: Panel, options: EngineOptions) -> Result<Self, EngineError> {
        options.validate()?;
        info!(rows = panel.len(), countries = panel.countries().len(), "fitting models");

        let health = HealthModel::fit(&panel, &options)?;
        let quarterly_gdp = QuarterlyGdpModel::fit(&panel, &options)?;
        let annual_gdp = match AnnualGdpModel::fit(&panel, &options) {
            Ok(model) => Some(model),
            Err(ModelError::NoAnnualCountries) => {
                warn!("no usable annual GDP countries, annual sub-model skipped");
                None
            }
            Err(e) => return Err(e.into()),
        };

        let mut fit_coverage = CoverageReport::new();
        fit_coverage.record_sample(health.sample());
        fit_coverage.record_sample(quarterly_gdp.sample());
        fit_coverage.extend(health.design_notes().cloned());
        fit_coverage.extend(quarterly_gdp.design_notes().cloned());
        if let Some(annual) = &annual_gdp {
            fit_coverage.extend(annual.notes().iter().cloned());
        }

        Ok(Self {
            panel,
            options,
            health,
            quarterly_gdp,
            annual_gdp,
            fit_coverage,
            draws: OnceLock::new(),
        })
    }

    pub fn panel(&self) -> &Panel {
        &self.panel
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn health(&self) -> &HealthModel {
        &self.health
    }

    pub fn quarterly_gdp(&self) -> &QuarterlyGdpModel {
        &self.quarterly_gdp
    }

    pub fn annual_gdp(&self) -> Option<&AnnualGdpModel> {
        self.annual_gdp.as_ref()
    }

    /// Pre-generated Monte Carlo draws, created on first use.
    ///
    /// Per draw: health system, then quarterly GDP, then annual GDP.
    pub fn draws(&self) -> Result<&[CoefficientDraw], EngineError> {
        if let Some(draws) = self.draws.get() {
            return Ok(draws.as_slice());
        }
        let tol = self.options.psd_tolerance;
        let mut samplers = vec![
            MvnSampler::new(self.health.mean(), self.health.covariance(), tol)?,
            MvnSampler::new(self.quarterly_gdp.mean().clone(), self.quarterly_gdp.covariance(), tol)?,
        ];
        if let Some(annual) = &self.annual_gdp {
            samplers.push(MvnSampler::new(annual.mean().clone(), annual.covariance(), tol)?);
        }
        let refs: Vec<&MvnSampler> = samplers.iter().collect();
        let generated = self.monte_carlo().generate(&refs);
        debug!(n = generated.len(), seed = self.options.seed, "draws generated");
        Ok(self.draws.get_or_init(|| generated).as_slice())
    }

    fn monte_carlo(&self) -> MonteCarloEngine {
        MonteCarloEngine::new(self.options.n_draws, self.options.seed, self.options.n_threads)
    }

    fn coefficients(&self, source: CoefficientSource) -> Result<Coefficients, EngineError> {
        match source {
            CoefficientSource::Fitted => Ok(Coefficients {
                health: self.health.mean(),
                quarterly_gdp: self.quarterly_gdp.mean().clone(),
                annual_gdp: self.annual_gdp.as_ref().map(|m| m.mean().clone()),
            }),
            CoefficientSource::Draw(index) => {
                let draws = self.draws()?;
                let draw = draws.get(index).ok_or(EngineError::DrawOutOfRange {
                    index,
                    n_draws: draws.len(),
                })?;
                Ok(Coefficients {
                    health: draw.vectors[0].clone(),
                    quarterly_gdp: draw.vectors[1].clone(),
                    annual_gdp: draw.vectors.get(2).cloned(),
                })
            }
        }
    }

    /// Run the counterfactual chain with coefficients from `source`.
    pub fn evaluate(&self, source: CoefficientSource, valuation: &ValuationInputs) -> Result<Evaluation, EngineError> {
        let coefficients = self.coefficients(source)?;
        self.evaluate_with(&coefficients, valuation)
    }

    fn evaluate_with(&self, coefficients: &Coefficients, valuation: &ValuationInputs) -> Result<Evaluation, EngineError> {
        let panel = &self.panel;
        let health = self
            .health
            .evaluate(panel, &coefficients.health, self.options.recursion_offset)?;
        let quarterly_gdp = self
            .quarterly_gdp
            .evaluate(panel, &coefficients.quarterly_gdp, &health.propagation)?;
        let annual_gdp = match (&self.annual_gdp, &coefficients.annual_gdp) {
            (Some(model), Some(beta)) => Some(model.evaluate(beta)?),
            _ => None,
        };

        let (valued, valuation_notes) =
            ValuedTable::build(panel, &health.infections, &health.deaths, &quarterly_gdp.gdp, valuation);
        let countries = country_table(&valued, annual_gdp.as_ref());

        let mut notes: Vec<CoverageNote> = health.notes().cloned().collect();
        notes.extend(quarterly_gdp.notes.iter().cloned());
        notes.extend(valuation_notes);

        Ok(Evaluation {
            health,
            quarterly_gdp,
            annual_gdp,
            valued,
            countries,
            notes,
        })
    }

    /// Fitted-coefficient run with summary, audit tables and coverage.
    pub fn basecase(&self, valuation: &ValuationInputs) -> Result<Basecase, EngineError> {
        info!("running basecase");
        let evaluation = self.evaluate(CoefficientSource::Fitted, valuation)?;

        let reference_population = |country: &str| self.reference_population(valuation, country);
        let summary = GlobalSummary::compute(&SummaryInputs {
            panel: &self.panel,
            countries: &evaluation.countries,
            health_sample: self.health.sample(),
            quarterly_gdp_sample: self.quarterly_gdp.sample(),
            infections: &evaluation.health.infections,
            deaths: &evaluation.health.deaths,
            annual: evaluation.annual_gdp.as_ref(),
            reference_population: &reference_population,
            exclude_final_period_doses: self.options.exclude_final_period_doses,
            effectiveness_year: self.options.annual_outcome_year,
        });

        let mut coefficients = self.health.coefficients().clone();
        coefficients.extend(self.quarterly_gdp.coefficients().clone());
        if let Some(annual) = &self.annual_gdp {
            coefficients.extend(annual.coefficients().clone());
        }

        let mut diagnostics = self.health.heteroskedasticity().to_vec();
        diagnostics.push((
            QUARTERLY_GDP_EQUATION.to_string(),
            *self.quarterly_gdp.heteroskedasticity(),
        ));

        let mut coverage = self.fit_coverage.clone();
        coverage.extend(evaluation.notes.iter().cloned());

        for c in Counterfactual::ALL {
            let t = summary.scenarios.get(c).totals;
            info!(scenario = %c, full_value = t.full_value, per_dose = summary.scenarios.get(c).value_per_dose, "basecase totals");
        }

        Ok(Basecase {
            evaluation,
            summary,
            coefficients,
            diagnostics,
            coverage,
        })
    }

    /// Reference population, falling back to the country's first panel row.
    fn reference_population(&self, valuation: &ValuationInputs, country: &str) -> f64 {
        valuation.reference_population(country).unwrap_or_else(|| {
            debug!(%country, "no reference population, using panel population");
            self.panel
                .country_index(country)
                .map_or(0.0, |c| self.panel.row(self.panel.country_rows(c).start).population)
        })
    }

    /// Monte Carlo percentiles of the global totals.
    pub fn uncertainty(&self, valuation: &ValuationInputs) -> Result<UncertaintyReport, EngineError> {
        let draws = self.draws()?;
        info!(n_draws = draws.len(), "running uncertainty analysis");

        let outcome = self.monte_carlo().run(draws, |index, _| {
            let totals = self
                .evaluate(CoefficientSource::Draw(index), valuation)?
                .totals();
            if totals.no_target.is_finite() && totals.no_vaccination.is_finite() {
                Ok(totals)
            } else {
                Err(EngineError::NonFiniteTotals(index))
            }
        })?;

        let percentiles = PercentileTable::from_draws(outcome.values(), &self.options.percentiles);
        Ok(UncertaintyReport {
            percentiles,
            draws: outcome.results,
            failed: outcome.failed,
        })
    }

    /// Basecase and uncertainty, with failed draws in the coverage report.
    pub fn run(&self, valuation: &ValuationInputs) -> Result<RunReport, EngineError> {
        let mut basecase = self.basecase(valuation)?;
        let uncertainty = self.uncertainty(valuation)?;
        basecase.coverage.failed_draws = uncertainty.failed.clone();
        Ok(RunReport { basecase, uncertainty })
    }
}

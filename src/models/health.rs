//! Infection and death system.

use super::ModelError;
use crate::core::{
    Counterfactual, CoverageNote, EngineOptions, Panel, PerScenario, Period, SampleInfo, Stage,
};
use crate::design::{build_counterfactual, CounterfactualDesign, CovariateRegistry, DesignMatrix, Timelines};
use crate::diagnostics::{breusch_pagan, BreuschPagan};
use crate::inference::CoefficientTable;
use crate::simulation::{AvertedTable, InfectionPropagator, Outcome, Propagation, ScenarioPredictions};
use crate::solvers::{FittedSur, SurEstimator};
use faer::{Col, Mat};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const INFECTIONS_EQUATION: &str = "infections";
pub const DEATHS_EQUATION: &str = "deaths";

/// Two-equation SUR of infection and death rates on a shared design.
#[derive(Debug, Clone)]
pub struct HealthModel {
    sample: SampleInfo,
    observed: DesignMatrix,
    counterfactual: PerScenario<CounterfactualDesign>,
    system: FittedSur,
    coefficients: CoefficientTable,
    heteroskedasticity: Vec<(String, BreuschPagan)>,
    last_period: Period,
}

/// Result of evaluating the system with one coefficient vector.
#[derive(Debug, Clone)]
pub struct HealthEvaluation {
    /// Counterfactual designs with recomputed infection lags.
    pub propagation: PerScenario<Propagation>,
    pub infections: AvertedTable,
    pub deaths: AvertedTable,
}

impl HealthEvaluation {
    /// Coverage notes raised by the propagation.
    pub fn notes(&self) -> impl Iterator<Item = &CoverageNote> {
        self.propagation
            .no_target
            .notes
            .iter()
            .chain(self.propagation.no_vaccination.notes.iter())
    }
}

impl HealthModel {
    pub fn fit(panel: &Panel, options: &EngineOptions) -> Result<Self, ModelError> {
        let sample = SampleInfo::health(panel)?;
        if sample.has_removed() {
            warn!(
                kept = sample.len(),
                excluded = sample.n_removed(),
                "rows excluded from the health sample"
            );
        }

        let registry = Arc::new(CovariateRegistry::for_rows(panel, &sample.kept));
        let observed = DesignMatrix::observed(panel, &sample.kept, registry);

        let infections = Col::from_fn(sample.len(), |i| {
            panel.row(sample.kept[i]).infection_rate.unwrap_or(f64::NAN)
        });
        let deaths = Col::from_fn(sample.len(), |i| {
            panel.row(sample.kept[i]).death_rate.unwrap_or(f64::NAN)
        });

        let system = SurEstimator::new(options.rank_tolerance)
            .fit(
                observed.x(),
                &[(INFECTIONS_EQUATION, &infections), (DEATHS_EQUATION, &deaths)],
            )
            .map_err(ModelError::regression("health"))?;

        let names = observed.registry().names();
        let mut coefficients = CoefficientTable::default();
        let mut heteroskedasticity = Vec::with_capacity(2);
        for (k, equation) in system.equations().iter().enumerate() {
            let p = system.n_features();
            let block = Mat::from_fn(p, p, |i, j| system.joint_covariance()[(k * p + i, k * p + j)]);
            coefficients.extend(CoefficientTable::new(
                &equation.name,
                &names,
                &equation.result.coefficients,
                &block,
                &equation.result.aliased,
            ));
            let bp = breusch_pagan(observed.x(), &equation.result.residuals)
                .map_err(ModelError::regression("health"))?;
            debug!(equation = %equation.name, lm = bp.lm_statistic, p_value = bp.lm_pvalue, "Breusch-Pagan");
            heteroskedasticity.push((equation.name.clone(), bp));
        }

        let counterfactual = PerScenario::from_fn(|c| {
            build_counterfactual(
                &observed,
                panel,
                Timelines::detect(panel, &sample.kept, c),
                Stage::Health,
            )
        });

        let last_period = sample
            .last_period(panel)
            .unwrap_or_else(|| panel.row(sample.kept[0]).period);

        info!(
            rows = sample.len(),
            covariates = observed.ncols(),
            rank = system.equation(0).result.rank,
            "health system fitted"
        );

        Ok(Self {
            sample,
            observed,
            counterfactual,
            system,
            coefficients,
            heteroskedasticity,
            last_period,
        })
    }

    pub fn sample(&self) -> &SampleInfo {
        &self.sample
    }

    pub fn observed(&self) -> &DesignMatrix {
        &self.observed
    }

    pub fn counterfactual(&self, scenario: Counterfactual) -> &CounterfactualDesign {
        self.counterfactual.get(scenario)
    }

    pub fn system(&self) -> &FittedSur {
        &self.system
    }

    pub fn coefficients(&self) -> &CoefficientTable {
        &self.coefficients
    }

    /// Breusch–Pagan test per equation.
    pub fn heteroskedasticity(&self) -> &[(String, BreuschPagan)] {
        &self.heteroskedasticity
    }

    /// Last period of the sample, the end of the recursion horizon.
    pub fn last_period(&self) -> Period {
        self.last_period
    }

    /// Stacked fitted coefficients, infections first.
    pub fn mean(&self) -> Col<f64> {
        self.system.joint_coefficients()
    }

    pub fn covariance(&self) -> &Mat<f64> {
        self.system.joint_covariance()
    }

    /// Notes raised while building the counterfactual designs.
    pub fn design_notes(&self) -> impl Iterator<Item = &CoverageNote> {
        self.counterfactual
            .no_target
            .notes
            .iter()
            .chain(self.counterfactual.no_vaccination.notes.iter())
    }

    /// Propagate, predict and difference with a stacked coefficient vector.
    pub fn evaluate(
        &self,
        panel: &Panel,
        joint: &Col<f64>,
        recursion_offset: i64,
    ) -> Result<HealthEvaluation, ModelError> {
        let expected = 2 * self.system.n_features();
        if joint.nrows() != expected {
            return Err(ModelError::CoefficientLength {
                expected,
                got: joint.nrows(),
            });
        }
        let beta_infections = self.system.split(joint, 0);
        let beta_deaths = self.system.split(joint, 1);

        let propagator = InfectionPropagator::new(panel, recursion_offset, self.last_period);
        let propagation = PerScenario::from_fn(|c| {
            propagator.propagate(self.counterfactual.get(c), &beta_infections, Stage::Health)
        });
        let designs = PerScenario::from_fn(|c| &propagation.get(c).design);

        let infections = AvertedTable::from_predictions(
            Outcome::Infections,
            panel,
            &self.sample.kept,
            &ScenarioPredictions::compute(&self.observed, designs, &beta_infections),
        );
        let deaths = AvertedTable::from_predictions(
            Outcome::Deaths,
            panel,
            &self.sample.kept,
            &ScenarioPredictions::compute(&self.observed, designs, &beta_deaths),
        );

        Ok(HealthEvaluation {
            propagation,
            infections,
            deaths,
        })
    }
}

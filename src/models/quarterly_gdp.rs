//! Quarterly GDP-gap equation.

use super::ModelError;
use crate::core::{
    CovarianceType, Counterfactual, CoverageNote, EngineOptions, Panel, PerScenario, RegressionResult,
    SampleInfo, Stage,
};
use crate::design::{build_counterfactual, CounterfactualDesign, CovariateRegistry, DesignMatrix, Timelines};
use crate::diagnostics::{breusch_pagan, BreuschPagan};
use crate::inference::CoefficientTable;
use crate::simulation::{apply_propagated_lags, AvertedTable, Outcome, Propagation, ScenarioPredictions};
use crate::solvers::{OlsRegressor, Regressor};
use faer::{Col, Mat};
use std::sync::Arc;
use tracing::{info, warn};

pub const QUARTERLY_GDP_EQUATION: &str = "quarterly_gdp";

/// OLS of the quarterly GDP gap with HC1 covariance.
#[derive(Debug, Clone)]
pub struct QuarterlyGdpModel {
    sample: SampleInfo,
    observed: DesignMatrix,
    counterfactual: PerScenario<CounterfactualDesign>,
    result: RegressionResult,
    coefficients: CoefficientTable,
    heteroskedasticity: BreuschPagan,
}

#[derive(Debug, Clone)]
pub struct QuarterlyGdpEvaluation {
    pub gdp: AvertedTable,
    /// Rows that kept observed infection lags.
    pub notes: Vec<CoverageNote>,
}

impl QuarterlyGdpModel {
    pub fn fit(panel: &Panel, options: &EngineOptions) -> Result<Self, ModelError> {
        let sample = SampleInfo::quarterly_gdp(panel, &options.gdp_excluded_countries)?;
        if sample.has_removed() {
            warn!(
                kept = sample.len(),
                excluded = sample.n_removed(),
                "rows excluded from the quarterly GDP sample"
            );
        }

        let registry = Arc::new(CovariateRegistry::for_rows(panel, &sample.kept));
        let observed = DesignMatrix::observed(panel, &sample.kept, registry);
        let y = Col::from_fn(sample.len(), |i| panel.row(sample.kept[i]).gdp_gap.unwrap_or(f64::NAN));

        let result = OlsRegressor::builder()
            .rank_tolerance(options.rank_tolerance)
            .covariance(CovarianceType::HC1)
            .build()
            .fit(observed.x(), &y)
            .map_err(ModelError::regression(QUARTERLY_GDP_EQUATION))?
            .into_result();

        let coefficients = CoefficientTable::new(
            QUARTERLY_GDP_EQUATION,
            &observed.registry().names(),
            &result.coefficients,
            &result.covariance,
            &result.aliased,
        );
        let heteroskedasticity = breusch_pagan(observed.x(), &result.residuals)
            .map_err(ModelError::regression(QUARTERLY_GDP_EQUATION))?;

        let counterfactual = PerScenario::from_fn(|c| {
            build_counterfactual(
                &observed,
                panel,
                Timelines::detect(panel, &sample.kept, c),
                Stage::QuarterlyGdp,
            )
        });

        info!(
            rows = sample.len(),
            covariates = observed.ncols(),
            rank = result.rank,
            r_squared = result.r_squared,
            "quarterly GDP equation fitted"
        );

        Ok(Self {
            sample,
            observed,
            counterfactual,
            result,
            coefficients,
            heteroskedasticity,
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

    pub fn result(&self) -> &RegressionResult {
        &self.result
    }

    pub fn coefficients(&self) -> &CoefficientTable {
        &self.coefficients
    }

    pub fn heteroskedasticity(&self) -> &BreuschPagan {
        &self.heteroskedasticity
    }

    pub fn mean(&self) -> &Col<f64> {
        &self.result.coefficients
    }

    pub fn covariance(&self) -> &Mat<f64> {
        &self.result.covariance
    }

    pub fn design_notes(&self) -> impl Iterator<Item = &CoverageNote> {
        self.counterfactual
            .no_target
            .notes
            .iter()
            .chain(self.counterfactual.no_vaccination.notes.iter())
    }

    /// Predict with `beta`, using infection lags propagated by the health system.
    pub fn evaluate(
        &self,
        panel: &Panel,
        beta: &Col<f64>,
        propagation: &PerScenario<Propagation>,
    ) -> Result<QuarterlyGdpEvaluation, ModelError> {
        if beta.nrows() != self.observed.ncols() {
            return Err(ModelError::CoefficientLength {
                expected: self.observed.ncols(),
                got: beta.nrows(),
            });
        }

        let mut notes = Vec::new();
        let designs = PerScenario::from_fn(|c| {
            let mut design = self.counterfactual.get(c).design.clone();
            notes.extend(apply_propagated_lags(
                &mut design,
                panel,
                propagation.get(c),
                Stage::QuarterlyGdp,
                c,
            ));
            design
        });

        let predictions = ScenarioPredictions::compute(
            &self.observed,
            PerScenario::from_fn(|c| designs.get(c)),
            beta,
        );
        let gdp = AvertedTable::from_predictions(Outcome::QuarterlyGdp, panel, &self.sample.kept, &predictions);

        Ok(QuarterlyGdpEvaluation { gdp, notes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CoverageKind, GdpSeries, PanelObservation, Period};
    use crate::models::HealthModel;

    fn panel(gdp_only_row: bool) -> Panel {
        let mut rows = Vec::new();
        for (c, country) in ["A", "B", "C", "D"].iter().enumerate() {
            for k in 0..6i64 {
                let period = Period::new(2020, 3).unwrap().offset(k);
                let mut o = PanelObservation::new(*country, period, 500.0 * (c + 1) as f64);
                let uptake = if k >= 2 { 0.04 * (k - 1) as f64 * (c + 1) as f64 / 4.0 } else { 0.0 };
                o.uptake = uptake;
                o.uptake_target = uptake * 0.6;
                o.cum_uptake = uptake * (k - 1).max(0) as f64;
                o.cum_uptake_target = o.cum_uptake * 0.6;
                o.response_index_lag1 = Some(40.0 + ((k * 3 + c as i64 * 5) % 9) as f64);
                let wiggle = ((k * 5 + c as i64 * 3) % 7) as f64 * 0.001;
                o.infection_rate = Some(0.03 + wiggle - 0.02 * uptake);
                o.death_rate = Some(0.0003 + wiggle / 50.0);
                o.gdp_series = Some(GdpSeries::Quarterly);
                o.gdp_gap = Some(-0.05 + 0.1 * uptake + wiggle);
                o.gdp_projected_usd = Some(1e9 * (c + 1) as f64);
                rows.push(o);
            }
        }
        if gdp_only_row {
            // a GDP row the health sample cannot use
            if let Some(r) = rows.iter_mut().find(|r| r.country == "D" && r.period == Period::new(2021, 4).unwrap()) {
                r.death_rate = None;
            }
        }
        Panel::new(rows).unwrap()
    }

    #[test]
    fn test_fit_uses_hc1() {
        let panel = panel(false);
        let model = QuarterlyGdpModel::fit(&panel, &EngineOptions::default()).unwrap();
        assert_eq!(model.result().covariance_type, CovarianceType::HC1);
        assert_eq!(model.sample().len(), 24);
        assert!(model.coefficients().get("L1_inf_pc").is_some());
    }

    #[test]
    fn test_missing_propagated_lags_keep_observed() {
        let panel = panel(true);
        let options = EngineOptions::default();
        let health = HealthModel::fit(&panel, &options).unwrap();
        let model = QuarterlyGdpModel::fit(&panel, &options).unwrap();

        let health_eval = health.evaluate(&panel, &health.mean(), 2).unwrap();
        let eval = model.evaluate(&panel, model.mean(), &health_eval.propagation).unwrap();

        assert_eq!(eval.gdp.len(), 24);
        let kept: Vec<_> = eval.notes.iter().filter(|n| n.kind == CoverageKind::ObservedLagsKept).collect();
        // one row, once per counterfactual
        assert_eq!(kept.len(), 2);
        assert!(kept.iter().all(|n| n.country == "D"));
    }

    #[test]
    fn test_excluded_country_not_in_sample() {
        let panel = panel(false);
        let options = EngineOptions::builder().exclude_gdp_country("B").build().unwrap();
        let model = QuarterlyGdpModel::fit(&panel, &options).unwrap();
        assert_eq!(model.sample().len(), 18);
        let b = panel.country_index("B").unwrap();
        assert!(model.observed().country_block(b).is_none());
    }
}

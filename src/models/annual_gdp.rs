//! Annual GDP sub-model.
//!
//! Countries reporting GDP only annually enter a cross-sectional regression
//! of the change in mean GDP gap between a base year and an outcome year on
//! cumulative uptake at the end of the outcome year and cumulative infections
//! at the end of the base year. Only countries already vaccinating in Q1 of
//! the outcome year are used.

use super::ModelError;
use crate::core::{
    CovarianceType, Counterfactual, CoverageKind, CoverageNote, EngineOptions, GdpSeries, Panel,
    PerScenario, Period, RegressionResult, Stage,
};
use crate::inference::CoefficientTable;
use crate::solvers::{OlsRegressor, Regressor};
use crate::utils::linear_predictor;
use faer::{Col, Mat};
use serde::Serialize;
use tracing::{debug, info};

const ANNUAL_GDP_EQUATION: &str = "annual_gdp";
const REGRESSORS: [&str; 5] = ["Intercept", "g_base", "cv_other", "cv_target", "cn_base"];
const CV_OTHER: usize = 2;
const CV_TARGET: usize = 3;

/// One country of the annual regression.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnualObservation {
    pub country: String,
    /// Mean GDP gap in the base year.
    pub g_base: f64,
    /// Mean GDP gap in the outcome year.
    pub g_outcome: f64,
    /// Cumulative other-manufacturer uptake at Q4 of the outcome year.
    pub cv_other: f64,
    /// Cumulative target uptake at Q4 of the outcome year.
    pub cv_target: f64,
    /// Cumulative infections per capita at Q4 of the base year.
    pub cn_base: f64,
    /// Projected GDP in USD over the outcome year.
    pub projected_gdp: f64,
    /// Doses through Q4 of the outcome year, per counterfactual.
    pub doses: PerScenario<f64>,
}

impl AnnualObservation {
    fn regressors(&self) -> [f64; 5] {
        [1.0, self.g_base, self.cv_other, self.cv_target, self.cn_base]
    }
}

/// Averted GDP of one country.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnualAvertedRow {
    pub country: String,
    pub predicted_observed: f64,
    pub predicted: PerScenario<f64>,
    pub averted: PerScenario<f64>,
    pub projected_gdp: f64,
    pub doses: PerScenario<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnualGdpTable {
    pub rows: Vec<AnnualAvertedRow>,
}

impl AnnualGdpTable {
    pub fn total(&self, scenario: Counterfactual) -> f64 {
        self.rows.iter().map(|r| *r.averted.get(scenario)).sum()
    }

    pub fn totals(&self) -> PerScenario<f64> {
        PerScenario::from_fn(|c| self.total(c))
    }

    pub fn doses(&self, scenario: Counterfactual) -> f64 {
        self.rows.iter().map(|r| *r.doses.get(scenario)).sum()
    }

    pub fn get(&self, country: &str) -> Option<&AnnualAvertedRow> {
        self.rows.iter().find(|r| r.country == country)
    }
}

/// Fitted annual sub-model.
#[derive(Debug, Clone)]
pub struct AnnualGdpModel {
    observations: Vec<AnnualObservation>,
    x: Mat<f64>,
    counterfactual: PerScenario<Mat<f64>>,
    result: RegressionResult,
    coefficients: CoefficientTable,
    notes: Vec<CoverageNote>,
}

impl AnnualGdpModel {
    pub fn fit(panel: &Panel, options: &EngineOptions) -> Result<Self, ModelError> {
        let (observations, notes) = collect_observations(panel, options.annual_base_year, options.annual_outcome_year);
        if observations.is_empty() {
            return Err(ModelError::NoAnnualCountries);
        }

        let x = Mat::from_fn(observations.len(), REGRESSORS.len(), |i, j| observations[i].regressors()[j]);
        let y = Col::from_fn(observations.len(), |i| observations[i].g_outcome - observations[i].g_base);

        let result = OlsRegressor::builder()
            .rank_tolerance(options.rank_tolerance)
            .covariance(CovarianceType::HC1)
            .build()
            .fit(&x, &y)
            .map_err(ModelError::regression(ANNUAL_GDP_EQUATION))?
            .into_result();

        let names: Vec<String> = REGRESSORS.iter().map(|s| s.to_string()).collect();
        let coefficients = CoefficientTable::new(
            ANNUAL_GDP_EQUATION,
            &names,
            &result.coefficients,
            &result.covariance,
            &result.aliased,
        );

        // no_target drops target uptake; no_vaccination drops both groups
        let counterfactual = PerScenario::from_fn(|c| {
            let mut m = x.clone();
            let zeroed: &[usize] = match c {
                Counterfactual::NoTarget => &[CV_TARGET],
                Counterfactual::NoVaccination => &[CV_OTHER, CV_TARGET],
            };
            for &j in zeroed {
                for i in 0..m.nrows() {
                    m[(i, j)] = 0.0;
                }
            }
            m
        });

        info!(
            countries = observations.len(),
            dropped = notes.len(),
            rank = result.rank,
            "annual GDP sub-model fitted"
        );

        Ok(Self {
            observations,
            x,
            counterfactual,
            result,
            coefficients,
            notes,
        })
    }

    pub fn observations(&self) -> &[AnnualObservation] {
        &self.observations
    }

    pub fn result(&self) -> &RegressionResult {
        &self.result
    }

    pub fn coefficients(&self) -> &CoefficientTable {
        &self.coefficients
    }

    /// Countries dropped for a missing regressor.
    pub fn notes(&self) -> &[CoverageNote] {
        &self.notes
    }

    pub fn mean(&self) -> &Col<f64> {
        &self.result.coefficients
    }

    pub fn covariance(&self) -> &Mat<f64> {
        &self.result.covariance
    }

    pub fn evaluate(&self, beta: &Col<f64>) -> Result<AnnualGdpTable, ModelError> {
        if beta.nrows() != REGRESSORS.len() {
            return Err(ModelError::CoefficientLength {
                expected: REGRESSORS.len(),
                got: beta.nrows(),
            });
        }
        let observed = linear_predictor(&self.x, beta);
        let counterfactual = self.counterfactual.map(|m| linear_predictor(m, beta));

        let rows = self
            .observations
            .iter()
            .enumerate()
            .map(|(i, obs)| {
                let predicted = counterfactual.map(|p| p[i]);
                AnnualAvertedRow {
                    country: obs.country.clone(),
                    predicted_observed: observed[i],
                    predicted,
                    averted: predicted.map(|cf| (observed[i] - cf) * obs.projected_gdp),
                    projected_gdp: obs.projected_gdp,
                    doses: obs.doses,
                }
            })
            .collect();
        Ok(AnnualGdpTable { rows })
    }
}

/// Build one observation per eligible country.
fn collect_observations(panel: &Panel, base_year: i32, outcome_year: i32) -> (Vec<AnnualObservation>, Vec<CoverageNote>) {
    let mut observations = Vec::new();
    let mut notes = Vec::new();
    let entry = Period::q1(outcome_year);
    let outcome_q4 = Period::q4(outcome_year);
    let base_q4 = Period::q4(base_year);

    for (c, name) in panel.countries().iter().enumerate() {
        let annual: Vec<usize> = panel
            .country_rows(c)
            .filter(|&i| panel.row(i).gdp_series == Some(GdpSeries::Annual))
            .collect();
        if annual.is_empty() {
            continue;
        }
        let at = |period: Period| annual.iter().copied().find(|&i| panel.row(i).period == period);

        let vaccinating = at(entry).is_some_and(|i| panel.row(i).cum_uptake > 0.0);
        if !vaccinating {
            debug!(country = %name, "not vaccinating at entry period, left out of annual sub-model");
            continue;
        }

        let mean_gap = |year: i32| {
            let gaps: Vec<f64> = annual
                .iter()
                .map(|&i| panel.row(i))
                .filter(|r| r.period.year() == year)
                .filter_map(|r| r.gdp_gap)
                .collect();
            (!gaps.is_empty()).then(|| gaps.iter().sum::<f64>() / gaps.len() as f64)
        };

        // cumulative infections over the annual rows; a missing rate leaves
        // the row without a value
        let mut running = 0.0;
        let mut cn_base = None;
        for &i in &annual {
            let row = panel.row(i);
            let value = row.infection_rate.map(|rate| {
                running += rate * row.population;
                running / row.population
            });
            if row.period == base_q4 {
                cn_base = value;
            }
        }

        let observation = match (mean_gap(base_year), mean_gap(outcome_year), at(outcome_q4), cn_base) {
            (Some(g_base), Some(g_outcome), Some(q4), Some(cn_base)) => {
                let row = panel.row(q4);
                let projected_gdp: f64 = annual
                    .iter()
                    .map(|&i| panel.row(i))
                    .filter(|r| r.period.year() == outcome_year)
                    .filter_map(|r| r.gdp_projected_usd)
                    .sum();
                Some(AnnualObservation {
                    country: name.clone(),
                    g_base,
                    g_outcome,
                    cv_other: row.cum_uptake - row.cum_uptake_target,
                    cv_target: row.cum_uptake_target,
                    cn_base,
                    projected_gdp,
                    doses: PerScenario::new(
                        row.cum_uptake_target * row.population,
                        row.cum_uptake * row.population,
                    ),
                })
            }
            _ => None,
        };

        match observation {
            Some(o) => observations.push(o),
            None => {
                debug!(country = %name, "missing annual regressor, country dropped");
                notes.push(CoverageNote {
                    stage: Stage::AnnualGdp,
                    scenario: None,
                    country: name.clone(),
                    period: None,
                    kind: CoverageKind::MissingAnnualRegressor,
                });
            }
        }
    }

    (observations, notes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PanelObservation;
    use approx::assert_relative_eq;

    fn country(name: &str, scale: f64, rows: &mut Vec<PanelObservation>) {
        for k in 0..8i64 {
            let period = Period::new(2020, 1).unwrap().offset(k);
            let mut o = PanelObservation::new(name, period, 1000.0);
            o.gdp_series = Some(GdpSeries::Annual);
            o.infection_rate = Some(0.01 * scale);
            o.gdp_gap = Some(if period.year() == 2020 { -0.06 * scale } else { -0.02 * scale + 0.001 * k as f64 });
            o.gdp_projected_usd = Some(1e8);
            o.cum_uptake = if k >= 4 { 0.1 * scale * (k - 3) as f64 } else { 0.0 };
            o.cum_uptake_target = o.cum_uptake * 0.3;
            rows.push(o);
        }
    }

    fn panel() -> Panel {
        let mut rows = Vec::new();
        for (k, name) in ["A", "B", "C", "D", "E", "F", "G"].iter().enumerate() {
            country(name, 1.0 + 0.37 * k as f64 + 0.05 * ((k * k) % 3) as f64, &mut rows);
        }
        Panel::new(rows).unwrap()
    }

    #[test]
    fn test_observation_construction() {
        let panel = panel();
        let (obs, notes) = collect_observations(&panel, 2020, 2021);
        assert_eq!(obs.len(), 7);
        assert!(notes.is_empty());

        let a = &obs[0];
        assert_relative_eq!(a.g_base, -0.06, epsilon = 1e-12);
        // Q4 2020 cumulative infections: four quarters of 0.01
        assert_relative_eq!(a.cn_base, 0.04, epsilon = 1e-12);
        assert_relative_eq!(a.cv_target, 0.12, epsilon = 1e-12);
        assert_relative_eq!(a.cv_other, 0.28, epsilon = 1e-12);
        assert_relative_eq!(a.projected_gdp, 4e8, epsilon = 1e-3);
        assert_relative_eq!(a.doses.no_vaccination, 400.0, epsilon = 1e-9);
    }

    #[test]
    fn test_not_vaccinating_at_entry_is_left_out() {
        let mut rows = Vec::new();
        country("A", 1.0, &mut rows);
        for r in rows.iter_mut() {
            r.cum_uptake = 0.0;
            r.cum_uptake_target = 0.0;
        }
        let panel = Panel::new(rows).unwrap();
        let (obs, notes) = collect_observations(&panel, 2020, 2021);
        assert!(obs.is_empty());
        assert!(notes.is_empty());
        assert!(matches!(
            AnnualGdpModel::fit(&panel, &EngineOptions::default()),
            Err(ModelError::NoAnnualCountries)
        ));
    }

    #[test]
    fn test_missing_regressor_noted() {
        let mut rows = Vec::new();
        country("A", 1.0, &mut rows);
        rows.retain(|r| r.period != Period::new(2021, 4).unwrap());
        let panel = Panel::new(rows).unwrap();
        let (obs, notes) = collect_observations(&panel, 2020, 2021);
        assert!(obs.is_empty());
        assert_eq!(notes[0].kind, CoverageKind::MissingAnnualRegressor);
    }

    #[test]
    fn test_no_vaccination_removes_both_groups() {
        let panel = panel();
        let model = AnnualGdpModel::fit(&panel, &EngineOptions::default()).unwrap();
        let beta = Col::from_fn(5, |j| [0.01, 0.5, 0.2, 0.4, -0.1][j]);
        let table = model.evaluate(&beta).unwrap();

        let a = table.get("A").unwrap();
        let obs = &model.observations()[0];
        assert_relative_eq!(
            a.averted.no_target,
            0.4 * obs.cv_target * obs.projected_gdp,
            epsilon = 1e-6
        );
        assert_relative_eq!(
            a.averted.no_vaccination,
            (0.2 * obs.cv_other + 0.4 * obs.cv_target) * obs.projected_gdp,
            epsilon = 1e-6
        );
        assert_relative_eq!(table.total(Counterfactual::NoTarget), table.rows.iter().map(|r| r.averted.no_target).sum::<f64>());
    }
}

//! Scenario predictor and averted-outcome tables.

use crate::core::{Counterfactual, Panel, PanelObservation, PerScenario, Period};
use crate::design::DesignMatrix;
use faer::Col;
use serde::Serialize;
use std::fmt;

/// A quarterly outcome equation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Infections,
    Deaths,
    QuarterlyGdp,
}

impl Outcome {
    /// Averted quantity in absolute units.
    ///
    /// Infections and deaths: `(cf − observed) × population`.
    /// GDP gap is a shortfall ratio, so the sign flips and the scale is
    /// projected GDP in USD: `(observed − cf) × projected GDP`.
    pub fn averted(&self, observed: f64, counterfactual: f64, row: &PanelObservation) -> f64 {
        match self {
            Outcome::Infections | Outcome::Deaths => (counterfactual - observed) * row.population,
            Outcome::QuarterlyGdp => {
                (observed - counterfactual) * row.gdp_projected_usd.unwrap_or(f64::NAN)
            }
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Outcome::Infections => "infections",
            Outcome::Deaths => "deaths",
            Outcome::QuarterlyGdp => "quarterly_gdp",
        })
    }
}

/// Linear predictions under the observed and both counterfactual designs.
#[derive(Debug, Clone)]
pub struct ScenarioPredictions {
    pub observed: Col<f64>,
    pub counterfactual: PerScenario<Col<f64>>,
}

impl ScenarioPredictions {
    pub fn compute(observed: &DesignMatrix, counterfactual: PerScenario<&DesignMatrix>, beta: &Col<f64>) -> Self {
        Self {
            observed: observed.predict(beta),
            counterfactual: counterfactual.map(|d| d.predict(beta)),
        }
    }
}

/// One country-quarter of an averted-outcome table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AvertedRow {
    pub country: String,
    pub period: Period,
    #[serde(skip)]
    pub panel_row: usize,
    pub predicted_observed: f64,
    pub predicted: PerScenario<f64>,
    pub averted: PerScenario<f64>,
}

/// Per-country-quarter averted outcomes of one equation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AvertedTable {
    pub outcome: Outcome,
    pub rows: Vec<AvertedRow>,
}

impl AvertedTable {
    /// Difference the predictions row by row.
    pub fn from_predictions(
        outcome: Outcome,
        panel: &Panel,
        design_rows: &[usize],
        predictions: &ScenarioPredictions,
    ) -> Self {
        let rows = design_rows
            .iter()
            .enumerate()
            .map(|(i, &panel_row)| {
                let obs = panel.row(panel_row);
                let observed = predictions.observed[i];
                let predicted = predictions.counterfactual.map(|p| p[i]);
                let averted = PerScenario::from_fn(|c| outcome.averted(observed, *predicted.get(c), obs));
                AvertedRow {
                    country: obs.country.clone(),
                    period: obs.period,
                    panel_row,
                    predicted_observed: observed,
                    predicted,
                    averted,
                }
            })
            .collect();
        Self { outcome, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Sum of averted outcomes over all rows.
    pub fn total(&self, counterfactual: Counterfactual) -> f64 {
        self.rows.iter().map(|r| *r.averted.get(counterfactual)).sum()
    }

    pub fn totals(&self) -> PerScenario<f64> {
        PerScenario::from_fn(|c| self.total(c))
    }

    /// Averted outcome of a panel row, if it is in the table.
    pub fn averted_at(&self, panel_row: usize, counterfactual: Counterfactual) -> Option<f64> {
        self.rows
            .binary_search_by_key(&panel_row, |r| r.panel_row)
            .ok()
            .map(|k| *self.rows[k].averted.get(counterfactual))
    }
}

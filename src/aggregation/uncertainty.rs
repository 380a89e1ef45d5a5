//! Percentile table of Monte Carlo totals.

use super::percentiles::percentiles;
use crate::core::{Counterfactual, PerScenario};
use serde::Serialize;
use std::fmt;

/// Global totals of one evaluation under one counterfactual.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct OutcomeTotals {
    pub infections: f64,
    pub deaths: f64,
    pub quarterly_gdp: f64,
    pub annual_gdp: f64,
    pub health_value: f64,
    pub full_value: f64,
}

impl OutcomeTotals {
    pub fn is_finite(&self) -> bool {
        Measure::ALL.iter().all(|m| m.of(self).is_finite())
    }
}

/// A reported total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Measure {
    Infections,
    Deaths,
    QuarterlyGdp,
    AnnualGdp,
    HealthValue,
    FullValue,
}

impl Measure {
    pub const ALL: [Measure; 6] = [
        Measure::Infections,
        Measure::Deaths,
        Measure::QuarterlyGdp,
        Measure::AnnualGdp,
        Measure::HealthValue,
        Measure::FullValue,
    ];

    pub fn of(&self, totals: &OutcomeTotals) -> f64 {
        match self {
            Measure::Infections => totals.infections,
            Measure::Deaths => totals.deaths,
            Measure::QuarterlyGdp => totals.quarterly_gdp,
            Measure::AnnualGdp => totals.annual_gdp,
            Measure::HealthValue => totals.health_value,
            Measure::FullValue => totals.full_value,
        }
    }
}

impl fmt::Display for Measure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Measure::Infections => "infections",
            Measure::Deaths => "deaths",
            Measure::QuarterlyGdp => "quarterly_gdp",
            Measure::AnnualGdp => "annual_gdp",
            Measure::HealthValue => "health_value",
            Measure::FullValue => "full_value",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PercentileRow {
    pub scenario: Counterfactual,
    pub measure: Measure,
    pub percentile: f64,
    pub value: f64,
}

/// Percentiles of every measure under both counterfactuals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PercentileTable {
    pub rows: Vec<PercentileRow>,
    pub n_draws: usize,
}

impl PercentileTable {
    pub fn from_draws<'a>(draws: impl IntoIterator<Item = &'a PerScenario<OutcomeTotals>>, levels: &[f64]) -> Self {
        let draws: Vec<&PerScenario<OutcomeTotals>> = draws.into_iter().collect();
        let mut rows = Vec::with_capacity(2 * Measure::ALL.len() * levels.len());
        for scenario in Counterfactual::ALL {
            for measure in Measure::ALL {
                let values: Vec<f64> = draws.iter().map(|d| measure.of(d.get(scenario))).collect();
                for (&percentile, value) in levels.iter().zip(percentiles(&values, levels)) {
                    rows.push(PercentileRow {
                        scenario,
                        measure,
                        percentile,
                        value,
                    });
                }
            }
        }
        Self {
            rows,
            n_draws: draws.len(),
        }
    }

    pub fn get(&self, scenario: Counterfactual, measure: Measure, percentile: f64) -> Option<f64> {
        self.rows
            .iter()
            .find(|r| r.scenario == scenario && r.measure == measure && r.percentile == percentile)
            .map(|r| r.value)
    }
}

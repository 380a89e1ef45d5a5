//! Monetary valuation of averted outcomes.
//!
//! QALY losses, costs per case and full income come from upstream tables and
//! enter here as flat multipliers per country-quarter (full income and the
//! reference population per country).

use crate::core::{
    Counterfactual, CoverageKind, CoverageNote, ManufacturerGroup, Panel, PerScenario, Period, Stage,
};
use crate::simulation::AvertedTable;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Per-case multipliers of one country-quarter.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Multipliers {
    /// QALYs lost per non-fatal case.
    #[serde(default)]
    pub qaly_nonfatal: f64,
    /// QALYs lost per death.
    #[serde(default)]
    pub qaly_fatal: f64,
    /// Direct medical cost per case.
    #[serde(default)]
    pub direct_cost: f64,
    #[serde(default)]
    pub indirect_cost_nonfatal: f64,
    #[serde(default)]
    pub indirect_cost_fatal: f64,
    /// Unpaid work lost per non-fatal case.
    #[serde(default)]
    pub unpaid_work_loss: f64,
}

/// External valuation tables for one run.
///
/// Discounted and undiscounted runs differ only in these tables.
#[derive(Debug, Clone, Default)]
pub struct ValuationInputs {
    multipliers: HashMap<(String, Period), Multipliers>,
    full_income: HashMap<String, f64>,
    reference_population: HashMap<String, f64>,
}

impl ValuationInputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_multipliers(&mut self, country: impl Into<String>, period: Period, m: Multipliers) {
        self.multipliers.insert((country.into(), period), m);
    }

    /// Monetary value of one QALY in a country.
    pub fn insert_full_income(&mut self, country: impl Into<String>, value: f64) {
        self.full_income.insert(country.into(), value);
    }

    /// Population used for per-capita metrics.
    pub fn insert_reference_population(&mut self, country: impl Into<String>, population: f64) {
        self.reference_population.insert(country.into(), population);
    }

    pub fn multipliers(&self, country: &str, period: Period) -> Option<&Multipliers> {
        self.multipliers.get(&(country.to_string(), period))
    }

    pub fn full_income(&self, country: &str) -> Option<f64> {
        self.full_income.get(country).copied()
    }

    pub fn reference_population(&self, country: &str) -> Option<f64> {
        self.reference_population.get(country).copied()
    }
}

/// Value components of one row under one counterfactual.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ValueComponents {
    pub infections: f64,
    pub deaths: f64,
    pub nonfatal: f64,
    pub qalys: f64,
    pub monetized_qalys: f64,
    pub direct_costs: f64,
    /// Reported separately, not part of the health value.
    pub indirect_costs: f64,
    pub unpaid_work: f64,
    pub health_value: f64,
    pub quarterly_gdp: f64,
    pub quarterly_value: f64,
}

impl ValueComponents {
    pub fn compute(infections: f64, deaths: f64, quarterly_gdp: f64, m: &Multipliers, full_income: f64) -> Self {
        let nonfatal = infections - deaths;
        let qalys = nonfatal * m.qaly_nonfatal + deaths * m.qaly_fatal;
        let monetized_qalys = qalys * full_income;
        let direct_costs = infections * m.direct_cost;
        let indirect_costs = nonfatal * m.indirect_cost_nonfatal + deaths * m.indirect_cost_fatal;
        let unpaid_work = nonfatal * m.unpaid_work_loss;
        let health_value = monetized_qalys + direct_costs + unpaid_work;
        Self {
            infections,
            deaths,
            nonfatal,
            qalys,
            monetized_qalys,
            direct_costs,
            indirect_costs,
            unpaid_work,
            health_value,
            quarterly_gdp,
            quarterly_value: health_value + quarterly_gdp,
        }
    }

    /// Component-wise sum.
    pub fn add(&mut self, other: &ValueComponents) {
        self.infections += other.infections;
        self.deaths += other.deaths;
        self.nonfatal += other.nonfatal;
        self.qalys += other.qalys;
        self.monetized_qalys += other.monetized_qalys;
        self.direct_costs += other.direct_costs;
        self.indirect_costs += other.indirect_costs;
        self.unpaid_work += other.unpaid_work;
        self.health_value += other.health_value;
        self.quarterly_gdp += other.quarterly_gdp;
        self.quarterly_value += other.quarterly_value;
    }
}

/// One valued country-quarter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValuedRow {
    pub country: String,
    pub period: Period,
    #[serde(skip)]
    pub panel_row: usize,
    pub value: PerScenario<ValueComponents>,
    /// Doses administered in the quarter: target manufacturer, all vaccines.
    pub doses: PerScenario<f64>,
}

/// Valued rows, the outer join of the three quarterly tables.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValuedTable {
    pub rows: Vec<ValuedRow>,
}

impl ValuedTable {
    /// Join averted infections, deaths and quarterly GDP by panel row and value them.
    ///
    /// A component missing from a row counts as zero. Rows with health
    /// outcomes but no multipliers or full income are valued at zero for
    /// the missing part and noted.
    pub fn build(
        panel: &Panel,
        infections: &AvertedTable,
        deaths: &AvertedTable,
        quarterly_gdp: &AvertedTable,
        inputs: &ValuationInputs,
    ) -> (Self, Vec<CoverageNote>) {
        let mut joined: BTreeMap<usize, [Option<PerScenario<f64>>; 3]> = BTreeMap::new();
        for (slot, table) in [infections, deaths, quarterly_gdp].into_iter().enumerate() {
            for row in &table.rows {
                joined.entry(row.panel_row).or_default()[slot] = Some(row.averted);
            }
        }

        let mut notes = Vec::new();
        let mut missing_income: Vec<String> = Vec::new();
        let rows = joined
            .into_iter()
            .map(|(panel_row, [inf, dth, gdp])| {
                let obs = panel.row(panel_row);
                let has_health = inf.is_some() || dth.is_some();

                let multipliers = match inputs.multipliers(&obs.country, obs.period) {
                    Some(m) => *m,
                    None => {
                        if has_health {
                            notes.push(CoverageNote {
                                stage: Stage::Valuation,
                                scenario: None,
                                country: obs.country.clone(),
                                period: Some(obs.period),
                                kind: CoverageKind::MissingMultiplier,
                            });
                        }
                        Multipliers::default()
                    }
                };
                let full_income = match inputs.full_income(&obs.country) {
                    Some(v) => v,
                    None => {
                        if has_health && !missing_income.contains(&obs.country) {
                            missing_income.push(obs.country.clone());
                            notes.push(CoverageNote {
                                stage: Stage::Valuation,
                                scenario: None,
                                country: obs.country.clone(),
                                period: None,
                                kind: CoverageKind::MissingMultiplier,
                            });
                        }
                        0.0
                    }
                };

                let pick = |v: &Option<PerScenario<f64>>, c: Counterfactual| v.map_or(0.0, |p| *p.get(c));
                let value = PerScenario::from_fn(|c| {
                    ValueComponents::compute(pick(&inf, c), pick(&dth, c), pick(&gdp, c), &multipliers, full_income)
                });
                ValuedRow {
                    country: obs.country.clone(),
                    period: obs.period,
                    panel_row,
                    value,
                    doses: PerScenario::new(
                        obs.uptake_of(ManufacturerGroup::Target) * obs.population,
                        obs.uptake * obs.population,
                    ),
                }
            })
            .collect();

        if !notes.is_empty() {
            debug!(n = notes.len(), "valuation inputs missing for some rows");
        }
        (Self { rows }, notes)
    }

    pub fn total(&self, scenario: Counterfactual) -> ValueComponents {
        let mut total = ValueComponents::default();
        for row in &self.rows {
            total.add(row.value.get(scenario));
        }
        total
    }
}

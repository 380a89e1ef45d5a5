//! Country and global totals, per-dose and per-capita metrics.

use super::percentiles::weighted_average;
use super::valuation::{ValueComponents, ValuedTable};
use crate::core::{Counterfactual, ManufacturerGroup, Panel, PerScenario, SampleInfo};
use crate::models::AnnualGdpTable;
use crate::simulation::AvertedTable;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Totals of one country (or the globe) under one counterfactual.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ScenarioTotals {
    pub quarterly: ValueComponents,
    pub annual_gdp: f64,
    /// Quarterly value plus annual GDP.
    pub full_value: f64,
    pub doses: f64,
}

impl ScenarioTotals {
    fn finish(mut self) -> Self {
        self.full_value = self.quarterly.quarterly_value + self.annual_gdp;
        self
    }

    pub fn gdp(&self) -> f64 {
        self.quarterly.quarterly_gdp + self.annual_gdp
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountryValue {
    pub country: String,
    pub totals: PerScenario<ScenarioTotals>,
}

/// Per-country totals, quarterly rows plus the annual sub-model.
pub fn country_table(valued: &ValuedTable, annual: Option<&AnnualGdpTable>) -> Vec<CountryValue> {
    let mut by_country: BTreeMap<String, PerScenario<ScenarioTotals>> = BTreeMap::new();
    for row in &valued.rows {
        let entry = by_country.entry(row.country.clone()).or_default();
        for c in Counterfactual::ALL {
            let t = entry.get_mut(c);
            t.quarterly.add(row.value.get(c));
            t.doses += row.doses.get(c);
        }
    }
    if let Some(annual) = annual {
        for row in &annual.rows {
            let entry = by_country.entry(row.country.clone()).or_default();
            for c in Counterfactual::ALL {
                entry.get_mut(c).annual_gdp += row.averted.get(c);
            }
        }
    }
    by_country
        .into_iter()
        .map(|(country, totals)| CountryValue {
            country,
            totals: totals.map(|t| t.finish()),
        })
        .collect()
}

/// Dose and population denominators behind one sub-model.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Denominators {
    pub doses: f64,
    pub population: f64,
}

/// Vaccine effectiveness over one year: averted per dose over counterfactual
/// cases per capita.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Effectiveness {
    pub year: i32,
    pub infections: f64,
    pub deaths: f64,
}

/// Global metrics under one counterfactual.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScenarioSummary {
    pub totals: ScenarioTotals,
    pub health: Denominators,
    pub quarterly_gdp: Denominators,
    pub annual_gdp: Denominators,
    pub health_value_per_dose: f64,
    pub quarterly_gdp_per_dose: f64,
    pub annual_gdp_per_dose: f64,
    /// Dose-weighted average of the two GDP rates.
    pub gdp_per_dose: f64,
    pub value_per_dose: f64,
    pub health_value_per_capita: f64,
    pub quarterly_gdp_per_capita: f64,
    pub annual_gdp_per_capita: f64,
    /// Population-weighted average of the two GDP rates.
    pub gdp_per_capita: f64,
    pub value_per_capita: f64,
    pub effectiveness: Effectiveness,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GlobalSummary {
    pub scenarios: PerScenario<ScenarioSummary>,
}

/// Everything the global summary is computed from.
pub struct SummaryInputs<'a> {
    pub panel: &'a Panel,
    pub countries: &'a [CountryValue],
    pub health_sample: &'a SampleInfo,
    pub quarterly_gdp_sample: &'a SampleInfo,
    pub infections: &'a AvertedTable,
    pub deaths: &'a AvertedTable,
    pub annual: Option<&'a AnnualGdpTable>,
    /// Reference population per country.
    pub reference_population: &'a dyn Fn(&str) -> f64,
    pub exclude_final_period_doses: bool,
    pub effectiveness_year: i32,
}

impl GlobalSummary {
    pub fn compute(inputs: &SummaryInputs<'_>) -> Self {
        let mut global = PerScenario::<ScenarioTotals>::default();
        for country in inputs.countries {
            for c in Counterfactual::ALL {
                let t = global.get_mut(c);
                t.quarterly.add(&country.totals.get(c).quarterly);
                t.annual_gdp += country.totals.get(c).annual_gdp;
                t.doses += country.totals.get(c).doses;
            }
        }
        let global = global.map(|t| t.finish());

        let scenarios = PerScenario::from_fn(|c| {
            let totals = *global.get(c);
            let health = sample_denominators(inputs, inputs.health_sample, c);
            let quarterly_gdp = sample_denominators(inputs, inputs.quarterly_gdp_sample, c);
            let annual_gdp = annual_denominators(inputs, c);

            let health_value_per_dose = totals.quarterly.health_value / health.doses;
            let quarterly_gdp_per_dose = totals.quarterly.quarterly_gdp / quarterly_gdp.doses;
            let annual_gdp_per_dose = totals.annual_gdp / annual_gdp.doses;
            let gdp_per_dose = weighted_average(&[
                (quarterly_gdp_per_dose, quarterly_gdp.doses),
                (annual_gdp_per_dose, annual_gdp.doses),
            ]);

            let health_value_per_capita = totals.quarterly.health_value / health.population;
            let quarterly_gdp_per_capita = totals.quarterly.quarterly_gdp / quarterly_gdp.population;
            let annual_gdp_per_capita = totals.annual_gdp / annual_gdp.population;
            let gdp_per_capita = weighted_average(&[
                (quarterly_gdp_per_capita, quarterly_gdp.population),
                (annual_gdp_per_capita, annual_gdp.population),
            ]);

            ScenarioSummary {
                totals,
                health,
                quarterly_gdp,
                annual_gdp,
                health_value_per_dose,
                quarterly_gdp_per_dose,
                annual_gdp_per_dose,
                gdp_per_dose,
                value_per_dose: health_value_per_dose + gdp_per_dose,
                health_value_per_capita,
                quarterly_gdp_per_capita,
                annual_gdp_per_capita,
                gdp_per_capita,
                value_per_capita: health_value_per_capita + gdp_per_capita,
                effectiveness: effectiveness(inputs, c, &health),
            }
        });

        Self { scenarios }
    }
}

fn removed_group(c: Counterfactual) -> Option<ManufacturerGroup> {
    match c {
        Counterfactual::NoTarget => Some(ManufacturerGroup::Target),
        Counterfactual::NoVaccination => None,
    }
}

/// Doses in a quarterly sample and the reference population of its countries.
///
/// For the target manufacturer only countries where its lag-1 uptake is ever
/// nonzero count toward the population.
fn sample_denominators(inputs: &SummaryInputs<'_>, sample: &SampleInfo, c: Counterfactual) -> Denominators {
    let panel = inputs.panel;
    let final_period = panel.periods().last().copied();
    let group = removed_group(c);

    let doses = sample
        .kept
        .iter()
        .map(|&i| panel.row(i))
        .filter(|r| !(inputs.exclude_final_period_doses && Some(r.period) == final_period))
        .map(|r| {
            let uptake = group.map_or(r.uptake, |g| r.uptake_of(g));
            uptake * r.population
        })
        .sum();

    let countries: BTreeSet<&str> = sample
        .kept
        .iter()
        .filter(|&&i| group.map_or(true, |g| panel.derived(i).uptake_lag(g, 1) != 0.0))
        .map(|&i| panel.row(i).country.as_str())
        .collect();
    let population = countries.iter().map(|c| (inputs.reference_population)(c)).sum();

    Denominators { doses, population }
}

fn annual_denominators(inputs: &SummaryInputs<'_>, c: Counterfactual) -> Denominators {
    let Some(annual) = inputs.annual else {
        return Denominators::default();
    };
    let population = annual
        .rows
        .iter()
        .filter(|r| c == Counterfactual::NoVaccination || r.doses.no_target != 0.0)
        .map(|r| (inputs.reference_population)(&r.country))
        .sum();
    Denominators {
        doses: annual.doses(c),
        population,
    }
}

fn effectiveness(inputs: &SummaryInputs<'_>, c: Counterfactual, health: &Denominators) -> Effectiveness {
    let year = inputs.effectiveness_year;
    let ratio = |table: &AvertedTable| {
        let (cases, averted) = table
            .rows
            .iter()
            .filter(|r| r.period.year() == year)
            .fold((0.0, 0.0), |(cases, averted), r| {
                let pop = inputs.panel.row(r.panel_row).population;
                (cases + r.predicted.get(c) * pop, averted + r.averted.get(c))
            });
        (averted / health.doses) / (cases / health.population)
    };
    Effectiveness {
        year,
        infections: ratio(inputs.infections),
        deaths: ratio(inputs.deaths),
    }
}

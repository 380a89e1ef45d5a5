//! In-memory country × quarter panel.
//!
//! The panel is the read-only input of one engine run. Rows are sorted by
//! (country, period) so every country occupies a contiguous block, and the
//! lagged regressors the models need are derived once at construction.

use super::period::Period;
use super::scenario::ManufacturerGroup;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::Range;
use thiserror::Error;

/// Number of lags derived for uptake and infection series.
pub const MAX_LAG: usize = 8;

/// Which GDP sub-model a row's GDP gap belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GdpSeries {
    Quarterly,
    Annual,
}

/// One (country, quarter) record as delivered by data preparation.
///
/// Rates and uptake are per capita. `uptake*` is doses administered in the
/// quarter, `cum_uptake*` the running total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelObservation {
    pub country: String,
    pub period: Period,
    pub infection_rate: Option<f64>,
    pub death_rate: Option<f64>,
    pub gdp_gap: Option<f64>,
    pub gdp_projected_usd: Option<f64>,
    pub gdp_series: Option<GdpSeries>,
    pub population: f64,
    #[serde(default)]
    pub uptake: f64,
    #[serde(default)]
    pub uptake_target: f64,
    #[serde(default)]
    pub cum_uptake: f64,
    #[serde(default)]
    pub cum_uptake_target: f64,
    pub response_index: Option<f64>,
    pub response_index_lag1: Option<f64>,
}

impl PanelObservation {
    /// A row with no outcomes and no uptake.
    pub fn new(country: impl Into<String>, period: Period, population: f64) -> Self {
        Self {
            country: country.into(),
            period,
            infection_rate: None,
            death_rate: None,
            gdp_gap: None,
            gdp_projected_usd: None,
            gdp_series: None,
            population,
            uptake: 0.0,
            uptake_target: 0.0,
            cum_uptake: 0.0,
            cum_uptake_target: 0.0,
            response_index: None,
            response_index_lag1: None,
        }
    }

    /// Per-period uptake of one manufacturer group.
    pub fn uptake_of(&self, group: ManufacturerGroup) -> f64 {
        match group {
            ManufacturerGroup::Target => self.uptake_target,
            ManufacturerGroup::Other => self.uptake - self.uptake_target,
        }
    }

    /// Cumulative uptake of one manufacturer group.
    pub fn cum_uptake_of(&self, group: ManufacturerGroup) -> f64 {
        match group {
            ManufacturerGroup::Target => self.cum_uptake_target,
            ManufacturerGroup::Other => self.cum_uptake - self.cum_uptake_target,
        }
    }
}

/// Lagged series derived from a country's rows.
///
/// Index `k - 1` holds lag `k`. Shifts are row-based within the country and
/// rows before the start are filled with 0.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedRow {
    uptake_lags: [[f64; MAX_LAG]; 2],
    cum_uptake_lags: [[f64; MAX_LAG]; 2],
    infection_lags: [Option<f64>; MAX_LAG],
    /// Cumulative infections per capita through this row.
    pub cum_infection_pc: Option<f64>,
    cum_infection_lags: [Option<f64>; MAX_LAG],
}

impl DerivedRow {
    fn group_slot(group: ManufacturerGroup) -> usize {
        match group {
            ManufacturerGroup::Target => 0,
            ManufacturerGroup::Other => 1,
        }
    }

    pub fn uptake_lag(&self, group: ManufacturerGroup, lag: usize) -> f64 {
        self.uptake_lags[Self::group_slot(group)][lag - 1]
    }

    pub fn cum_uptake_lag(&self, group: ManufacturerGroup, lag: usize) -> f64 {
        self.cum_uptake_lags[Self::group_slot(group)][lag - 1]
    }

    pub fn infection_lag(&self, lag: usize) -> Option<f64> {
        self.infection_lags[lag - 1]
    }

    pub fn cum_infection_lag(&self, lag: usize) -> Option<f64> {
        self.cum_infection_lags[lag - 1]
    }
}

/// Errors raised while assembling a panel.
#[derive(Debug, Error)]
pub enum PanelError {
    #[error("panel has no observations")]
    Empty,

    #[error("duplicate observation for {country} in {period}")]
    DuplicateKey { country: String, period: Period },

    #[error("population for {country} in {period} must be positive, got {value}")]
    InvalidPopulation {
        country: String,
        period: Period,
        value: f64,
    },
}

/// The panel store.
#[derive(Debug, Clone)]
pub struct Panel {
    rows: Vec<PanelObservation>,
    derived: Vec<DerivedRow>,
    countries: Vec<String>,
    country_of_row: Vec<usize>,
    country_ranges: Vec<Range<usize>>,
    periods: Vec<Period>,
    index: HashMap<(usize, Period), usize>,
}

impl Panel {
    /// Sort, validate and derive lags.
    pub fn new(mut rows: Vec<PanelObservation>) -> Result<Self, PanelError> {
        if rows.is_empty() {
            return Err(PanelError::Empty);
        }

        for row in &rows {
            if !(row.population > 0.0) {
                return Err(PanelError::InvalidPopulation {
                    country: row.country.clone(),
                    period: row.period,
                    value: row.population,
                });
            }
        }

        rows.sort_by(|a, b| a.country.cmp(&b.country).then(a.period.cmp(&b.period)));

        let mut countries: Vec<String> = Vec::new();
        let mut country_of_row = Vec::with_capacity(rows.len());
        let mut country_ranges: Vec<Range<usize>> = Vec::new();
        let mut index = HashMap::with_capacity(rows.len());

        for (i, row) in rows.iter().enumerate() {
            if countries.last() != Some(&row.country) {
                countries.push(row.country.clone());
                country_ranges.push(i..i);
            }
            let c = countries.len() - 1;
            country_ranges[c].end = i + 1;
            country_of_row.push(c);
            if index.insert((c, row.period), i).is_some() {
                return Err(PanelError::DuplicateKey {
                    country: row.country.clone(),
                    period: row.period,
                });
            }
        }

        let mut periods: Vec<Period> = rows.iter().map(|r| r.period).collect();
        periods.sort();
        periods.dedup();

        let mut derived = Vec::with_capacity(rows.len());
        for range in &country_ranges {
            derived.extend(derive_country(&rows[range.clone()]));
        }

        Ok(Self {
            rows,
            derived,
            countries,
            country_of_row,
            country_ranges,
            periods,
            index,
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[PanelObservation] {
        &self.rows
    }

    pub fn row(&self, i: usize) -> &PanelObservation {
        &self.rows[i]
    }

    pub fn derived(&self, i: usize) -> &DerivedRow {
        &self.derived[i]
    }

    /// Country names in sorted order.
    pub fn countries(&self) -> &[String] {
        &self.countries
    }

    pub fn country_of(&self, row: usize) -> usize {
        self.country_of_row[row]
    }

    pub fn country_index(&self, name: &str) -> Option<usize> {
        self.countries.binary_search_by(|c| c.as_str().cmp(name)).ok()
    }

    /// Rows of one country, in period order.
    pub fn country_rows(&self, country: usize) -> Range<usize> {
        self.country_ranges[country].clone()
    }

    /// Distinct periods in ascending order.
    pub fn periods(&self) -> &[Period] {
        &self.periods
    }

    pub fn position(&self, country: usize, period: Period) -> Option<usize> {
        self.index.get(&(country, period)).copied()
    }
}

fn shifted<T: Copy>(series: &[T], i: usize, lag: usize, fill: T) -> T {
    if i >= lag {
        series[i - lag]
    } else {
        fill
    }
}

fn derive_country(rows: &[PanelObservation]) -> Vec<DerivedRow> {
    let groups = [ManufacturerGroup::Target, ManufacturerGroup::Other];
    let uptake: Vec<Vec<f64>> = groups
        .iter()
        .map(|&g| rows.iter().map(|r| r.uptake_of(g)).collect())
        .collect();
    let cum_uptake: Vec<Vec<f64>> = groups
        .iter()
        .map(|&g| rows.iter().map(|r| r.cum_uptake_of(g)).collect())
        .collect();

    // A missing rate leaves the running total untouched but has no
    // cumulative value itself.
    let infections: Vec<Option<f64>> = rows.iter().map(|r| r.infection_rate).collect();
    let mut running = 0.0;
    let cum_infection_pc: Vec<Option<f64>> = rows
        .iter()
        .map(|r| {
            r.infection_rate.map(|rate| {
                running += rate * r.population;
                running / r.population
            })
        })
        .collect();

    (0..rows.len())
        .map(|i| {
            let mut uptake_lags = [[0.0; MAX_LAG]; 2];
            let mut cum_uptake_lags = [[0.0; MAX_LAG]; 2];
            let mut infection_lags = [Some(0.0); MAX_LAG];
            let mut cum_infection_lags = [Some(0.0); MAX_LAG];
            for lag in 1..=MAX_LAG {
                for g in 0..2 {
                    uptake_lags[g][lag - 1] = shifted(&uptake[g], i, lag, 0.0);
                    cum_uptake_lags[g][lag - 1] = shifted(&cum_uptake[g], i, lag, 0.0);
                }
                infection_lags[lag - 1] = shifted(&infections, i, lag, Some(0.0));
                cum_infection_lags[lag - 1] = shifted(&cum_infection_pc, i, lag, Some(0.0));
            }
            DerivedRow {
                uptake_lags,
                cum_uptake_lags,
                infection_lags,
                cum_infection_pc: cum_infection_pc[i],
                cum_infection_lags,
            }
        })
        .collect()
}

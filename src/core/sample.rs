//! Estimation-sample selection.
//!
//! Each regression sees only the panel rows that carry everything it needs.
//! Dropping a row from one sample never drops it from another, and every
//! dropped row is recorded with its reason so coverage can be audited:
//!
//! - health sample: infection rate, death rate, lag-1 response index and the
//!   derived infection lags must be present
//! - quarterly GDP sample: a quarterly GDP gap, projected GDP, lag-1 response
//!   index and derived infection lags, for countries not explicitly excluded

use super::panel::{GdpSeries, Panel};
use super::period::Period;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

/// Why a panel row is outside an estimation sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionReason {
    MissingInfectionRate,
    MissingDeathRate,
    MissingResponseIndexLag,
    MissingInfectionLag,
    NotQuarterlyGdp,
    ExcludedCountry,
    MissingGdpGap,
    MissingProjectedGdp,
}

impl fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ExclusionReason::MissingInfectionRate => "missing infection rate",
            ExclusionReason::MissingDeathRate => "missing death rate",
            ExclusionReason::MissingResponseIndexLag => "missing lag-1 response index",
            ExclusionReason::MissingInfectionLag => "missing lagged infection regressor",
            ExclusionReason::NotQuarterlyGdp => "not a quarterly GDP row",
            ExclusionReason::ExcludedCountry => "country excluded by configuration",
            ExclusionReason::MissingGdpGap => "missing GDP gap",
            ExclusionReason::MissingProjectedGdp => "missing projected GDP",
        };
        f.write_str(text)
    }
}

/// A row left out of a sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Exclusion {
    pub country: String,
    pub period: Period,
    pub reason: ExclusionReason,
}

/// Error when a sample ends up empty.
#[derive(Debug, Error)]
pub enum SampleError {
    #[error("{sample} sample is empty after exclusions ({n_excluded} rows excluded)")]
    Empty {
        sample: &'static str,
        n_excluded: usize,
    },
}

/// Which panel rows a regression uses.
#[derive(Debug, Clone)]
pub struct SampleInfo {
    /// Sample name used in logs and reports.
    pub name: &'static str,
    /// Number of panel rows before selection.
    pub n_original: usize,
    /// Panel row indices kept, in panel order.
    pub kept: Vec<usize>,
    /// Rows removed, with the first failing requirement.
    pub exclusions: Vec<Exclusion>,
    position: Vec<Option<usize>>,
}

impl SampleInfo {
    fn from_mask(
        name: &'static str,
        panel: &Panel,
        mut reason_for: impl FnMut(usize) -> Option<ExclusionReason>,
    ) -> Result<Self, SampleError> {
        let mut kept = Vec::new();
        let mut exclusions = Vec::new();
        let mut position = vec![None; panel.len()];

        for i in 0..panel.len() {
            match reason_for(i) {
                None => {
                    position[i] = Some(kept.len());
                    kept.push(i);
                }
                Some(reason) => {
                    let row = panel.row(i);
                    exclusions.push(Exclusion {
                        country: row.country.clone(),
                        period: row.period,
                        reason,
                    });
                }
            }
        }

        if kept.is_empty() {
            return Err(SampleError::Empty {
                sample: name,
                n_excluded: exclusions.len(),
            });
        }

        Ok(Self {
            name,
            n_original: panel.len(),
            kept,
            exclusions,
            position,
        })
    }

    /// Rows required by the infection/death system.
    pub fn health(panel: &Panel) -> Result<Self, SampleError> {
        Self::from_mask("health", panel, |i| {
            let row = panel.row(i);
            let derived = panel.derived(i);
            if row.infection_rate.is_none() {
                Some(ExclusionReason::MissingInfectionRate)
            } else if row.death_rate.is_none() {
                Some(ExclusionReason::MissingDeathRate)
            } else if row.response_index_lag1.is_none() {
                Some(ExclusionReason::MissingResponseIndexLag)
            } else if derived.infection_lag(1).is_none() || derived.cum_infection_lag(2).is_none() {
                Some(ExclusionReason::MissingInfectionLag)
            } else {
                None
            }
        })
    }

    /// Rows required by the quarterly GDP equation.
    pub fn quarterly_gdp(panel: &Panel, excluded_countries: &[String]) -> Result<Self, SampleError> {
        let excluded: HashSet<&str> = excluded_countries.iter().map(String::as_str).collect();
        Self::from_mask("quarterly_gdp", panel, |i| {
            let row = panel.row(i);
            let derived = panel.derived(i);
            if row.gdp_series != Some(GdpSeries::Quarterly) {
                Some(ExclusionReason::NotQuarterlyGdp)
            } else if excluded.contains(row.country.as_str()) {
                Some(ExclusionReason::ExcludedCountry)
            } else if row.gdp_gap.is_none() {
                Some(ExclusionReason::MissingGdpGap)
            } else if row.gdp_projected_usd.is_none() {
                Some(ExclusionReason::MissingProjectedGdp)
            } else if row.response_index_lag1.is_none() {
                Some(ExclusionReason::MissingResponseIndexLag)
            } else if derived.infection_lag(1).is_none() || derived.cum_infection_lag(2).is_none() {
                Some(ExclusionReason::MissingInfectionLag)
            } else {
                None
            }
        })
    }

    pub fn len(&self) -> usize {
        self.kept.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kept.is_empty()
    }

    pub fn n_removed(&self) -> usize {
        self.exclusions.len()
    }

    pub fn has_removed(&self) -> bool {
        !self.exclusions.is_empty()
    }

    /// Position of a panel row within the sample.
    pub fn sample_position(&self, panel_row: usize) -> Option<usize> {
        self.position.get(panel_row).copied().flatten()
    }

    /// Distinct panel country indices present, in order.
    pub fn countries(&self, panel: &Panel) -> Vec<usize> {
        let mut out: Vec<usize> = self.kept.iter().map(|&i| panel.country_of(i)).collect();
        out.dedup();
        out
    }

    /// Last period present in the sample.
    pub fn last_period(&self, panel: &Panel) -> Option<Period> {
        self.kept.iter().map(|&i| panel.row(i).period).max()
    }

    /// Expand per-sample values to panel length, NaN at excluded rows.
    pub fn expand(&self, values: &[f64]) -> Vec<f64> {
        let mut expanded = vec![f64::NAN; self.n_original];
        for (&row, &v) in self.kept.iter().zip(values) {
            expanded[row] = v;
        }
        expanded
    }
}

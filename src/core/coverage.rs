//! Coverage report: what a run could not process, and why.

use super::period::Period;
use super::sample::{Exclusion, SampleInfo};
use super::scenario::Counterfactual;
use serde::Serialize;
use std::fmt;

/// Pipeline stage a note was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Health,
    QuarterlyGdp,
    AnnualGdp,
    Valuation,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Health => "health",
            Stage::QuarterlyGdp => "quarterly_gdp",
            Stage::AnnualGdp => "annual_gdp",
            Stage::Valuation => "valuation",
        })
    }
}

/// Kind of omission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverageKind {
    /// Uptake never nonzero: no freeze, no recursive correction.
    NoTimeline,
    /// First-vaccination row absent from the design: country skipped.
    MissingAnchorRow,
    /// A quarter of the recursion horizon has no row: step skipped.
    MissingHorizonRow,
    /// GDP row without a propagated infection lag: observed lags used.
    ObservedLagsKept,
    /// No valuation multipliers for the row: counted as zero.
    MissingMultiplier,
    /// Annual sub-model country dropped for a missing regressor.
    MissingAnnualRegressor,
}

/// One omission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageNote {
    pub stage: Stage,
    pub scenario: Option<Counterfactual>,
    pub country: String,
    pub period: Option<Period>,
    pub kind: CoverageKind,
}

/// A Monte Carlo draw left out of the percentiles.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedDraw {
    pub index: usize,
    pub reason: String,
}

/// Everything a run skipped, grouped for auditing.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CoverageReport {
    /// Rows excluded per estimation sample, keyed by sample name.
    pub exclusions: Vec<(String, Vec<Exclusion>)>,
    pub notes: Vec<CoverageNote>,
    pub failed_draws: Vec<FailedDraw>,
}

impl CoverageReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_sample(&mut self, sample: &SampleInfo) {
        self.exclusions
            .push((sample.name.to_string(), sample.exclusions.clone()));
    }

    pub fn note(&mut self, note: CoverageNote) {
        self.notes.push(note);
    }

    pub fn extend(&mut self, notes: impl IntoIterator<Item = CoverageNote>) {
        self.notes.extend(notes);
    }

    /// Notes of one kind.
    pub fn of_kind(&self, kind: CoverageKind) -> impl Iterator<Item = &CoverageNote> {
        self.notes.iter().filter(move |n| n.kind == kind)
    }

    /// Countries noted with `kind` in a stage and scenario, deduplicated.
    pub fn countries_with(
        &self,
        stage: Stage,
        scenario: Option<Counterfactual>,
        kind: CoverageKind,
    ) -> Vec<&str> {
        let mut out: Vec<&str> = self
            .notes
            .iter()
            .filter(|n| n.stage == stage && n.scenario == scenario && n.kind == kind)
            .map(|n| n.country.as_str())
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    pub fn n_excluded_rows(&self) -> usize {
        self.exclusions.iter().map(|(_, e)| e.len()).sum()
    }

    pub fn is_complete(&self) -> bool {
        self.notes.is_empty() && self.failed_draws.is_empty() && self.n_excluded_rows() == 0
    }
}

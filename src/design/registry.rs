//! Typed covariate registry.
//!
//! Maps each logical covariate of the quarterly models to its column in the
//! design matrix. Counterfactual code asks the registry for positions instead
//! of matching column names.

use crate::core::{ManufacturerGroup, Panel, Period};
use std::collections::HashMap;
use std::fmt;

/// One column of a quarterly design matrix.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Covariate {
    Intercept,
    /// Per-period uptake, lag 1.
    UptakeLag1(ManufacturerGroup),
    /// Cumulative uptake, lag 2.
    CumUptakeLag2(ManufacturerGroup),
    /// Government response index, lag 1.
    ResponseIndexLag1,
    /// Infection rate, lag 1.
    InfectionLag1,
    /// Cumulative per-capita infections, lag 2.
    CumInfectionLag2,
    CountryEffect(String),
    PeriodEffect(Period),
}

impl fmt::Display for Covariate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let group = |g: &ManufacturerGroup| match g {
            ManufacturerGroup::Target => "target",
            ManufacturerGroup::Other => "other",
        };
        match self {
            Covariate::Intercept => f.write_str("Intercept"),
            Covariate::UptakeLag1(g) => write!(f, "L1_uptake_{}", group(g)),
            Covariate::CumUptakeLag2(g) => write!(f, "L2_cum_uptake_{}", group(g)),
            Covariate::ResponseIndexLag1 => f.write_str("L1_gri"),
            Covariate::InfectionLag1 => f.write_str("L1_inf_pc"),
            Covariate::CumInfectionLag2 => f.write_str("L2_cum_inf_pc"),
            Covariate::CountryEffect(c) => write!(f, "country[T.{c}]"),
            Covariate::PeriodEffect(p) => write!(f, "period[T.{p}]"),
        }
    }
}

/// Ordered covariates with a position index.
#[derive(Debug, Clone, PartialEq)]
pub struct CovariateRegistry {
    covariates: Vec<Covariate>,
    positions: HashMap<Covariate, usize>,
}

/// The continuous covariates, in column order.
const CONTINUOUS: [Covariate; 8] = [
    Covariate::Intercept,
    Covariate::UptakeLag1(ManufacturerGroup::Target),
    Covariate::CumUptakeLag2(ManufacturerGroup::Target),
    Covariate::UptakeLag1(ManufacturerGroup::Other),
    Covariate::CumUptakeLag2(ManufacturerGroup::Other),
    Covariate::ResponseIndexLag1,
    Covariate::InfectionLag1,
    Covariate::CumInfectionLag2,
];

impl CovariateRegistry {
    /// Registry for the given panel rows.
    ///
    /// Fixed effects cover the country and period levels present in `rows`,
    /// each with its first level dropped as the reference.
    pub fn for_rows(panel: &Panel, rows: &[usize]) -> Self {
        let mut countries: Vec<&str> = rows.iter().map(|&i| panel.row(i).country.as_str()).collect();
        countries.sort_unstable();
        countries.dedup();

        let mut periods: Vec<Period> = rows.iter().map(|&i| panel.row(i).period).collect();
        periods.sort_unstable();
        periods.dedup();

        let covariates: Vec<Covariate> = CONTINUOUS
            .iter()
            .cloned()
            .chain(countries.iter().skip(1).map(|c| Covariate::CountryEffect(c.to_string())))
            .chain(periods.iter().skip(1).map(|&p| Covariate::PeriodEffect(p)))
            .collect();

        Self::from_covariates(covariates)
    }

    pub fn from_covariates(covariates: Vec<Covariate>) -> Self {
        let positions = covariates
            .iter()
            .enumerate()
            .map(|(j, c)| (c.clone(), j))
            .collect();
        Self {
            covariates,
            positions,
        }
    }

    pub fn len(&self) -> usize {
        self.covariates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.covariates.is_empty()
    }

    pub fn covariates(&self) -> &[Covariate] {
        &self.covariates
    }

    pub fn position(&self, covariate: &Covariate) -> Option<usize> {
        self.positions.get(covariate).copied()
    }

    /// Uptake columns (lag 1 and cumulative lag 2) of the given groups.
    pub fn uptake_columns(&self, groups: &[ManufacturerGroup]) -> Vec<usize> {
        groups
            .iter()
            .flat_map(|&g| [Covariate::UptakeLag1(g), Covariate::CumUptakeLag2(g)])
            .filter_map(|c| self.position(&c))
            .collect()
    }

    pub fn response_index(&self) -> Option<usize> {
        self.position(&Covariate::ResponseIndexLag1)
    }

    pub fn infection_lag1(&self) -> Option<usize> {
        self.position(&Covariate::InfectionLag1)
    }

    pub fn cum_infection_lag2(&self) -> Option<usize> {
        self.position(&Covariate::CumInfectionLag2)
    }

    /// Column names in order.
    pub fn names(&self) -> Vec<String> {
        self.covariates.iter().map(|c| c.to_string()).collect()
    }
}

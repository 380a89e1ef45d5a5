//! Engine options and configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Seed used for Monte Carlo draws unless overridden.
pub const DEFAULT_SEED: u64 = 102_015;

/// Configuration for one engine run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    /// Number of Monte Carlo draws (default: 1000).
    pub n_draws: usize,
    /// Seed of the single generator all draws come from.
    pub seed: u64,
    /// Percentiles reported for Monte Carlo totals, in [0, 100].
    pub percentiles: Vec<f64>,
    /// Worker threads for the draw pool (0 = rayon default).
    pub n_threads: usize,
    /// Rank tolerance for the column-pivoted QR.
    pub rank_tolerance: f64,
    /// Pivots below this are treated as zero when factoring a covariance.
    pub psd_tolerance: f64,
    /// Quarters after first vaccination at which lag recursion starts.
    pub recursion_offset: i64,
    /// Countries dropped from the quarterly GDP regression.
    pub gdp_excluded_countries: Vec<String>,
    /// Base year of the annual GDP sub-model.
    pub annual_base_year: i32,
    /// Outcome year of the annual GDP sub-model.
    pub annual_outcome_year: i32,
    /// Leave doses of the last sample period out of per-dose denominators.
    pub exclude_final_period_doses: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            n_draws: 1000,
            seed: DEFAULT_SEED,
            percentiles: vec![2.5, 50.0, 97.5],
            n_threads: 0,
            rank_tolerance: 1e-10,
            psd_tolerance: 1e-12,
            recursion_offset: 2,
            gdp_excluded_countries: Vec::new(),
            annual_base_year: 2020,
            annual_outcome_year: 2021,
            exclude_final_period_doses: true,
        }
    }
}

/// Errors that can occur when validating engine options.
#[derive(Debug, Error, PartialEq)]
pub enum OptionsError {
    #[error("n_draws must be at least 1, got {0}")]
    InvalidDraws(usize),
    #[error("percentiles must lie in [0, 100], got {0}")]
    InvalidPercentile(f64),
    #[error("tolerance must be positive, got {0}")]
    InvalidTolerance(f64),
    #[error("recursion_offset must be at least 1, got {0}")]
    InvalidRecursionOffset(i64),
    #[error("annual outcome year {outcome} must follow base year {base}")]
    InvalidAnnualYears { base: i32, outcome: i32 },
}

impl EngineOptions {
    /// Create a new builder for engine options.
    pub fn builder() -> EngineOptionsBuilder {
        EngineOptionsBuilder::default()
    }

    /// Validate the options and return an error if invalid.
    pub fn validate(&self) -> Result<(), OptionsError> {
        if self.n_draws < 1 {
            return Err(OptionsError::InvalidDraws(self.n_draws));
        }
        if let Some(&p) = self
            .percentiles
            .iter()
            .find(|p| !(0.0..=100.0).contains(*p))
        {
            return Err(OptionsError::InvalidPercentile(p));
        }
        if self.rank_tolerance <= 0.0 {
            return Err(OptionsError::InvalidTolerance(self.rank_tolerance));
        }
        if self.psd_tolerance <= 0.0 {
            return Err(OptionsError::InvalidTolerance(self.psd_tolerance));
        }
        if self.recursion_offset < 1 {
            return Err(OptionsError::InvalidRecursionOffset(self.recursion_offset));
        }
        if self.annual_outcome_year <= self.annual_base_year {
            return Err(OptionsError::InvalidAnnualYears {
                base: self.annual_base_year,
                outcome: self.annual_outcome_year,
            });
        }
        Ok(())
    }
}

/// Builder for `EngineOptions`.
#[derive(Debug, Clone, Default)]
pub struct EngineOptionsBuilder {
    options: EngineOptions,
}

impl EngineOptionsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn n_draws(mut self, n: usize) -> Self {
        self.options.n_draws = n;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.options.seed = seed;
        self
    }

    pub fn percentiles(mut self, percentiles: Vec<f64>) -> Self {
        self.options.percentiles = percentiles;
        self
    }

    pub fn n_threads(mut self, n: usize) -> Self {
        self.options.n_threads = n;
        self
    }

    pub fn rank_tolerance(mut self, tol: f64) -> Self {
        self.options.rank_tolerance = tol;
        self
    }

    pub fn psd_tolerance(mut self, tol: f64) -> Self {
        self.options.psd_tolerance = tol;
        self
    }

    pub fn recursion_offset(mut self, quarters: i64) -> Self {
        self.options.recursion_offset = quarters;
        self
    }

    pub fn exclude_gdp_country(mut self, country: impl Into<String>) -> Self {
        self.options.gdp_excluded_countries.push(country.into());
        self
    }

    pub fn annual_years(mut self, base: i32, outcome: i32) -> Self {
        self.options.annual_base_year = base;
        self.options.annual_outcome_year = outcome;
        self
    }

    pub fn exclude_final_period_doses(mut self, exclude: bool) -> Self {
        self.options.exclude_final_period_doses = exclude;
        self
    }

    /// Build and validate the options.
    pub fn build(self) -> Result<EngineOptions, OptionsError> {
        self.options.validate()?;
        Ok(self.options)
    }

    /// Build the options without validation.
    pub fn build_unchecked(self) -> EngineOptions {
        self.options
    }
}

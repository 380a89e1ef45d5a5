//! Valuation and aggregation of averted outcomes.

mod percentiles;
mod summary;
mod uncertainty;
mod valuation;

pub use percentiles::{percentile, percentiles, weighted_average};
pub use summary::{
    country_table, CountryValue, Denominators, Effectiveness, GlobalSummary, ScenarioSummary, ScenarioTotals,
    SummaryInputs,
};
pub use uncertainty::{Measure, OutcomeTotals, PercentileRow, PercentileTable};
pub use valuation::{Multipliers, ValuationInputs, ValueComponents, ValuedRow, ValuedTable};

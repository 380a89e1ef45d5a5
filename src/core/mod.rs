//! Core types: panel store, periods, samples, scenarios and options.

mod coverage;
mod options;
mod panel;
mod period;
mod result;
mod sample;
mod scenario;

pub use coverage::{CoverageKind, CoverageNote, CoverageReport, FailedDraw, Stage};
pub use options::{EngineOptions, EngineOptionsBuilder, OptionsError, DEFAULT_SEED};
pub use panel::{DerivedRow, GdpSeries, Panel, PanelError, PanelObservation, MAX_LAG};
pub use period::{Period, PeriodError};
pub use result::{CovarianceType, RegressionResult};
pub use sample::{Exclusion, ExclusionReason, SampleError, SampleInfo};
pub use scenario::{Counterfactual, ManufacturerGroup, PerScenario, Scenario};

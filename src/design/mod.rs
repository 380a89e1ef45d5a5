//! Design matrices and their counterfactual variants.
//!
//! - [`CovariateRegistry`] fixes the column layout of the quarterly models
//! - [`DesignMatrix`] holds values aligned with an estimation sample
//! - [`Timelines`] records each country's first vaccinated quarter
//! - [`build_counterfactual`] zeroes removed uptake and freezes the response index

mod counterfactual;
mod matrix;
mod registry;
mod timeline;

pub use counterfactual::{build_counterfactual, CounterfactualDesign};
pub use matrix::DesignMatrix;
pub use registry::{Covariate, CovariateRegistry};
pub use timeline::{Timelines, VaccinationTimeline};

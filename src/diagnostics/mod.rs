//! Regression diagnostics.
//!
//! # Example
//!
//! ```rust,ignore
//! use vaccine_value::diagnostics::breusch_pagan;
//!
//! let bp = breusch_pagan(design.x(), &fitted.result().residuals)?;
//! println!("LM = {} (p = {})", bp.lm_statistic, bp.lm_pvalue);
//! ```

mod breusch_pagan;

pub use breusch_pagan::{breusch_pagan, BreuschPagan};

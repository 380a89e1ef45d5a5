//! Design matrices aligned with an estimation sample.

use super::registry::{Covariate, CovariateRegistry};
use crate::core::Panel;
use crate::utils::{linear_predictor, row_dot};
use faer::{Col, Mat};
use std::ops::Range;
use std::sync::Arc;

/// A numeric design aligned row-for-row with panel rows.
///
/// Counterfactual variants are clones that differ only in values, never in
/// row alignment or column layout.
#[derive(Debug, Clone)]
pub struct DesignMatrix {
    x: Mat<f64>,
    rows: Vec<usize>,
    blocks: Vec<(usize, Range<usize>)>,
    registry: Arc<CovariateRegistry>,
}

impl DesignMatrix {
    /// Observed design for `rows` (panel indices in panel order).
    pub fn observed(panel: &Panel, rows: &[usize], registry: Arc<CovariateRegistry>) -> Self {
        let x = Mat::from_fn(rows.len(), registry.len(), |i, j| {
            covariate_value(panel, rows[i], &registry.covariates()[j])
        });
        let mut blocks: Vec<(usize, Range<usize>)> = Vec::new();
        for (i, &r) in rows.iter().enumerate() {
            let country = panel.country_of(r);
            match blocks.last_mut() {
                Some((c, range)) if *c == country => range.end = i + 1,
                _ => blocks.push((country, i..i + 1)),
            }
        }
        Self {
            x,
            rows: rows.to_vec(),
            blocks,
            registry,
        }
    }

    pub fn x(&self) -> &Mat<f64> {
        &self.x
    }

    pub fn nrows(&self) -> usize {
        self.x.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.x.ncols()
    }

    /// Panel row behind each design row.
    pub fn rows(&self) -> &[usize] {
        &self.rows
    }

    /// Contiguous design rows per panel country, in country order.
    pub fn country_blocks(&self) -> &[(usize, Range<usize>)] {
        &self.blocks
    }

    pub fn country_block(&self, country: usize) -> Option<Range<usize>> {
        self.blocks
            .iter()
            .find(|(c, _)| *c == country)
            .map(|(_, r)| r.clone())
    }

    pub fn registry(&self) -> &CovariateRegistry {
        &self.registry
    }

    pub fn shared_registry(&self) -> Arc<CovariateRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.x[(i, j)]
    }

    pub fn set(&mut self, i: usize, j: usize, value: f64) {
        self.x[(i, j)] = value;
    }

    /// Zero a column in every row.
    pub fn zero_column(&mut self, j: usize) {
        for i in 0..self.x.nrows() {
            self.x[(i, j)] = 0.0;
        }
    }

    pub fn predict_row(&self, i: usize, beta: &Col<f64>) -> f64 {
        row_dot(&self.x, i, beta)
    }

    pub fn predict(&self, beta: &Col<f64>) -> Col<f64> {
        linear_predictor(&self.x, beta)
    }
}

fn covariate_value(panel: &Panel, i: usize, covariate: &Covariate) -> f64 {
    let row = panel.row(i);
    let derived = panel.derived(i);
    match covariate {
        Covariate::Intercept => 1.0,
        Covariate::UptakeLag1(g) => derived.uptake_lag(*g, 1),
        Covariate::CumUptakeLag2(g) => derived.cum_uptake_lag(*g, 2),
        Covariate::ResponseIndexLag1 => row.response_index_lag1.unwrap_or(f64::NAN),
        Covariate::InfectionLag1 => derived.infection_lag(1).unwrap_or(f64::NAN),
        Covariate::CumInfectionLag2 => derived.cum_infection_lag(2).unwrap_or(f64::NAN),
        Covariate::CountryEffect(c) => indicator(row.country == *c),
        Covariate::PeriodEffect(p) => indicator(row.period == *p),
    }
}

fn indicator(flag: bool) -> f64 {
    if flag {
        1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{PanelObservation, Period};

    #[test]
    fn test_observed_design_values() {
        let mut rows = Vec::new();
        for (country, pop) in [("A", 100.0), ("B", 50.0)] {
            for q in 1..=2 {
                let mut o = PanelObservation::new(country, Period::new(2021, q).unwrap(), pop);
                o.infection_rate = Some(0.1 * q as f64);
                o.response_index_lag1 = Some(40.0 + q as f64);
                o.uptake = 0.2;
                o.uptake_target = 0.05;
                rows.push(o);
            }
        }
        let panel = Panel::new(rows).unwrap();
        let all: Vec<usize> = (0..panel.len()).collect();
        let registry = Arc::new(CovariateRegistry::for_rows(&panel, &all));
        let design = DesignMatrix::observed(&panel, &all, registry);

        assert_eq!(design.nrows(), 4);
        // row 1 = A, 2021_Q2
        assert_eq!(design.get(1, 0), 1.0);
        assert!((design.get(1, 1) - 0.05).abs() < 1e-12);
        assert!((design.get(1, 3) - 0.15).abs() < 1e-12);
        assert_eq!(design.get(1, 5), 42.0);
        assert!((design.get(1, 6) - 0.1).abs() < 1e-12);
        // country[T.B], period[T.2021_Q2]
        assert_eq!(design.get(1, 8), 0.0);
        assert_eq!(design.get(1, 9), 1.0);
        assert_eq!(design.get(3, 8), 1.0);
        assert_eq!(design.country_blocks().len(), 2);
        assert_eq!(design.country_block(1), Some(2..4));
    }
}

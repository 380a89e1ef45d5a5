//! Recursive infection propagator.
//!
//! Lagged infection regressors are endogenous: once vaccination is removed,
//! predicted infections change, which changes next quarter's lag-1 and
//! cumulative-lag-2 regressors, which changes next quarter's prediction.
//! The propagator walks each country forward through time and rewrites those
//! two columns from the counterfactual predictions themselves.
//!
//! Recursion starts `offset` quarters after the first-vaccination quarter
//! (two by default) and runs to the last period of the sample. Earlier
//! quarters keep the one-shot zeroed-vaccination regressors. Countries with
//! no timeline are left as they are.

use crate::core::{Counterfactual, CoverageKind, CoverageNote, Panel, Period, Stage};
use crate::design::{CounterfactualDesign, DesignMatrix, VaccinationTimeline};
use faer::Col;
use std::collections::HashMap;
use std::ops::Range;
use tracing::{debug, trace};

/// Output of one propagation run.
#[derive(Debug, Clone)]
pub struct Propagation {
    /// Counterfactual design with the lag columns rewritten.
    pub design: DesignMatrix,
    /// Design rows whose lags were recomputed, in processing order.
    pub recomputed: Vec<usize>,
    pub notes: Vec<CoverageNote>,
    lags: HashMap<(usize, Period), (f64, f64)>,
}

impl Propagation {
    /// `(L1_inf_pc, L2_cum_inf_pc)` of a country-quarter, if it is in the design.
    pub fn lags_at(&self, country: usize, period: Period) -> Option<(f64, f64)> {
        self.lags.get(&(country, period)).copied()
    }
}

/// Forward-simulates lagged infections under a counterfactual.
#[derive(Debug, Clone, Copy)]
pub struct InfectionPropagator<'a> {
    panel: &'a Panel,
    offset: i64,
    last_period: Period,
}

impl<'a> InfectionPropagator<'a> {
    /// `last_period` closes the recursion horizon.
    pub fn new(panel: &'a Panel, offset: i64, last_period: Period) -> Self {
        Self {
            panel,
            offset,
            last_period,
        }
    }

    /// Propagate with infection-equation coefficients `beta`.
    pub fn propagate(&self, counterfactual: &CounterfactualDesign, beta: &Col<f64>, stage: Stage) -> Propagation {
        let mut design = counterfactual.design.clone();
        let mut recomputed = Vec::new();
        let mut notes = Vec::new();
        let scenario = counterfactual.timelines.counterfactual();

        let registry = design.registry();
        let (Some(l1), Some(l2)) = (registry.infection_lag1(), registry.cum_infection_lag2()) else {
            let lags = self.collect_lags(&design, None);
            return Propagation {
                design,
                recomputed,
                notes,
                lags,
            };
        };

        let blocks = design.country_blocks().to_vec();
        for (country, block) in blocks {
            let VaccinationTimeline::Present(first) = counterfactual.timelines.get(country) else {
                continue;
            };

            let mut period = first.offset(self.offset);
            while period <= self.last_period {
                match self.find_row(&design, block.clone(), period) {
                    Some(r) => {
                        self.step(&mut design, block.clone(), r, beta, l1, l2);
                        recomputed.push(r);
                    }
                    None => {
                        debug!(
                            country = %self.panel.countries()[country],
                            %period,
                            %scenario,
                            "no row for recursion quarter, step skipped"
                        );
                        notes.push(CoverageNote {
                            stage,
                            scenario: Some(scenario),
                            country: self.panel.countries()[country].clone(),
                            period: Some(period),
                            kind: CoverageKind::MissingHorizonRow,
                        });
                    }
                }
                period = period.offset(1);
            }
        }

        let lags = self.collect_lags(&design, Some((l1, l2)));
        Propagation {
            design,
            recomputed,
            notes,
            lags,
        }
    }

    fn find_row(&self, design: &DesignMatrix, block: Range<usize>, period: Period) -> Option<usize> {
        block
            .into_iter()
            .find(|&i| self.panel.row(design.rows()[i]).period == period)
    }

    fn population(&self, design: &DesignMatrix, i: usize) -> f64 {
        self.panel.row(design.rows()[i]).population
    }

    /// Population of the previous row of the country, 1 at the first row.
    fn previous_population(&self, design: &DesignMatrix, block: &Range<usize>, i: usize) -> f64 {
        if i > block.start {
            self.population(design, i - 1)
        } else {
            1.0
        }
    }

    /// Rewrite the lags of row `r` from the current state of earlier rows.
    fn step(&self, design: &mut DesignMatrix, block: Range<usize>, r: usize, beta: &Col<f64>, l1: usize, l2: usize) {
        let lag1 = if r > block.start {
            design.predict_row(r - 1, beta)
        } else {
            0.0
        };

        // Running absolute infections through the previous row, per capita
        // of the population two rows back.
        let cum_lag2 = if r > block.start {
            let prev = r - 1;
            let absolute: f64 = (block.start..=prev)
                .map(|u| design.get(u, l1) * self.previous_population(design, &block, u))
                .sum();
            absolute / self.previous_population(design, &block, prev)
        } else {
            0.0
        };

        trace!(row = r, lag1, cum_lag2, "lags recomputed");
        design.set(r, l1, lag1);
        design.set(r, l2, cum_lag2);
    }

    fn collect_lags(&self, design: &DesignMatrix, columns: Option<(usize, usize)>) -> HashMap<(usize, Period), (f64, f64)> {
        let Some((l1, l2)) = columns else {
            return HashMap::new();
        };
        design
            .rows()
            .iter()
            .enumerate()
            .map(|(i, &row)| {
                let obs = self.panel.row(row);
                (
                    (self.panel.country_of(row), obs.period),
                    (design.get(i, l1), design.get(i, l2)),
                )
            })
            .collect()
    }
}

/// Copy propagated lags into another counterfactual design by (country, period).
///
/// Rows with no propagated counterpart keep their observed lags and are noted.
pub fn apply_propagated_lags(
    design: &mut DesignMatrix,
    panel: &Panel,
    propagation: &Propagation,
    stage: Stage,
    scenario: Counterfactual,
) -> Vec<CoverageNote> {
    let mut notes = Vec::new();
    let (Some(l1), Some(l2)) = (design.registry().infection_lag1(), design.registry().cum_infection_lag2()) else {
        return notes;
    };

    for i in 0..design.nrows() {
        let row = design.rows()[i];
        let obs = panel.row(row);
        match propagation.lags_at(panel.country_of(row), obs.period) {
            Some((lag1, cum_lag2)) => {
                design.set(i, l1, lag1);
                design.set(i, l2, cum_lag2);
            }
            None => notes.push(CoverageNote {
                stage,
                scenario: Some(scenario),
                country: obs.country.clone(),
                period: Some(obs.period),
                kind: CoverageKind::ObservedLagsKept,
            }),
        }
    }
    notes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PanelObservation;
    use crate::design::{build_counterfactual, CovariateRegistry, Timelines};
    use approx::assert_relative_eq;
    use std::sync::Arc;

    /// One country, 2020_Q4..2021_Q4, vaccinating from 2021_Q1.
    fn panel(pops: [f64; 5]) -> Panel {
        let uptake = [0.0, 0.1, 0.2, 0.2, 0.1];
        let periods = [(2020, 4), (2021, 1), (2021, 2), (2021, 3), (2021, 4)];
        let rows = (0..5)
            .map(|k| {
                let (y, q) = periods[k];
                let mut o = PanelObservation::new("A", Period::new(y, q).unwrap(), pops[k]);
                o.infection_rate = Some(0.05 + 0.01 * k as f64);
                o.uptake = uptake[k];
                o.response_index_lag1 = Some(50.0);
                o
            })
            .collect();
        Panel::new(rows).unwrap()
    }

    fn counterfactual(panel: &Panel) -> CounterfactualDesign {
        let rows: Vec<usize> = (0..panel.len()).collect();
        let registry = Arc::new(CovariateRegistry::for_rows(panel, &rows));
        let observed = DesignMatrix::observed(panel, &rows, registry);
        build_counterfactual(
            &observed,
            panel,
            Timelines::detect(panel, &rows, Counterfactual::NoVaccination),
            Stage::Health,
        )
    }

    fn beta(p: usize) -> Col<f64> {
        // intercept 0.01, L1_inf 0.5, L2_cum -0.1, everything else 0
        Col::from_fn(p, |j| match j {
            0 => 0.01,
            6 => 0.5,
            7 => -0.1,
            _ => 0.0,
        })
    }

    #[test]
    fn test_recursion_starts_two_quarters_after_first_vaccination() {
        let panel = panel([100.0; 5]);
        let cf = counterfactual(&panel);
        let beta = beta(cf.design.ncols());
        let last = Period::new(2021, 4).unwrap();
        let prop = InfectionPropagator::new(&panel, 2, last).propagate(&cf, &beta, Stage::Health);

        // first vaccination 2021_Q1 -> rows 2021_Q3 and 2021_Q4
        assert_eq!(prop.recomputed, vec![3, 4]);
        for i in 0..3 {
            assert_eq!(prop.design.get(i, 6), cf.design.get(i, 6));
            assert_eq!(prop.design.get(i, 7), cf.design.get(i, 7));
        }
    }

    #[test]
    fn test_lag1_equals_previous_counterfactual_prediction() {
        let panel = panel([100.0, 110.0, 120.0, 130.0, 140.0]);
        let cf = counterfactual(&panel);
        let beta = beta(cf.design.ncols());
        let last = Period::new(2021, 4).unwrap();
        let prop = InfectionPropagator::new(&panel, 2, last).propagate(&cf, &beta, Stage::Health);

        let pred_q3 = prop.design.predict_row(3, &beta);
        assert_eq!(prop.design.get(4, 6), pred_q3);

        let pred_q2 = prop.design.predict_row(2, &beta);
        assert_eq!(prop.design.get(3, 6), pred_q2);
    }

    #[test]
    fn test_cumulative_lag_formula() {
        let pops = [100.0, 110.0, 120.0, 130.0, 140.0];
        let panel = panel(pops);
        let cf = counterfactual(&panel);
        let beta = beta(cf.design.ncols());
        let last = Period::new(2021, 4).unwrap();
        let prop = InfectionPropagator::new(&panel, 2, last).propagate(&cf, &beta, Stage::Health);

        // row 4: sum over rows 0..=3 of L1[u] * pop[u-1] (pop[-1] = 1), over pop[2]
        let l1: Vec<f64> = (0..4).map(|u| prop.design.get(u, 6)).collect();
        let prev_pop = [1.0, pops[0], pops[1], pops[2]];
        let expected: f64 = (0..4).map(|u| l1[u] * prev_pop[u]).sum::<f64>() / pops[2];
        assert_relative_eq!(prop.design.get(4, 7), expected, epsilon = 1e-15);
    }

    #[test]
    fn test_missing_horizon_quarter_is_noted() {
        let panel = panel([100.0; 5]);
        let cf = counterfactual(&panel);
        let beta = beta(cf.design.ncols());
        // horizon runs past the data
        let last = Period::new(2022, 1).unwrap();
        let prop = InfectionPropagator::new(&panel, 2, last).propagate(&cf, &beta, Stage::Health);

        assert_eq!(prop.recomputed, vec![3, 4]);
        assert_eq!(prop.notes.len(), 1);
        assert_eq!(prop.notes[0].kind, CoverageKind::MissingHorizonRow);
        assert_eq!(prop.notes[0].period, Some(last));
    }

    #[test]
    fn test_lags_lookup_by_country_period() {
        let panel = panel([100.0; 5]);
        let cf = counterfactual(&panel);
        let beta = beta(cf.design.ncols());
        let last = Period::new(2021, 4).unwrap();
        let prop = InfectionPropagator::new(&panel, 2, last).propagate(&cf, &beta, Stage::Health);

        let (l1, l2) = prop.lags_at(0, last).unwrap();
        assert_eq!(l1, prop.design.get(4, 6));
        assert_eq!(l2, prop.design.get(4, 7));
        assert!(prop.lags_at(0, Period::new(2019, 1).unwrap()).is_none());
    }
}

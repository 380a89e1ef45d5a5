//! Common test utilities and data generators.

#![allow(dead_code)]

use vaccine_value::aggregation::{Multipliers, ValuationInputs};
use vaccine_value::core::{GdpSeries, Panel, PanelObservation, Period};

/// Quarterly-GDP countries with a vaccination programme.
pub const QUARTERLY: [&str; 6] = ["QA", "QB", "QC", "QD", "QE", "QF"];
/// Annual-GDP countries.
pub const ANNUAL: [&str; 7] = ["AA", "AB", "AC", "AD", "AE", "AF", "AG"];
/// A quarterly country that never vaccinates.
pub const UNVACCINATED: &str = "ZZ";

const N_QUARTERS: i64 = 8;

/// Simple deterministic "random" in [-1, 1] for reproducibility.
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self(seed)
    }

    pub fn next(&mut self) -> f64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1);
        ((self.0 >> 33) as f64) / (u32::MAX as f64) * 2.0 - 1.0
    }
}

/// Generate a 2020Q1..2021Q4 panel.
///
/// Outcomes are linear in the lagged regressors plus country and period
/// effects; `noise = 0` gives an exact fit for every model.
pub fn synthetic_panel(noise: f64, seed: u64) -> Panel {
    let mut rng = Lcg::new(seed);
    let mut rows = Vec::new();

    let countries = QUARTERLY
        .iter()
        .map(|c| (*c, GdpSeries::Quarterly, true))
        .chain(ANNUAL.iter().map(|c| (*c, GdpSeries::Annual, true)))
        .chain(std::iter::once((UNVACCINATED, GdpSeries::Quarterly, false)));

    for (c, (name, series, vaccinates)) in countries.enumerate() {
        let cf = c as f64;
        let population = 1e6 * (1.0 + 0.3 * cf);
        let start = 3 + (c % 2) as i64;
        let rate = 0.05 * (1.0 + 0.1 * ((c * 7) % 5) as f64);
        let share = 0.35 + 0.06 * ((c * 3) % 4) as f64;
        let country_effect = 0.002 * ((c * 5) % 3) as f64;
        let gap_base = -0.03 - 0.01 * ((c * 2) % 5) as f64;

        let mut prev_uptake_target = 0.0;
        let mut prev_uptake_other = 0.0;
        let mut prev_infection: f64 = 0.02;
        let mut cum_uptake = 0.0;
        let mut cum_infections = 0.0;
        let mut country_rows = Vec::new();

        for k in 0..N_QUARTERS {
            let period = Period::new(2020, 1).unwrap().offset(k);
            let period_effect = 0.001 * (k % 3) as f64;
            let gri = 40.0 + ((k * 7 + c as i64 * 3) % 11) as f64;

            let uptake = if vaccinates && k >= start { rate } else { 0.0 };
            cum_uptake += uptake;

            let infection = 0.02 + country_effect + period_effect - 0.05 * prev_uptake_target
                - 0.03 * prev_uptake_other
                + 0.00002 * gri
                + 0.3 * prev_infection
                + noise * 0.0005 * rng.next();
            let death = 0.0002 + 0.01 * prev_infection - 0.0005 * prev_uptake_other
                + country_effect / 20.0
                + noise * 0.000005 * rng.next();

            let mut o = PanelObservation::new(name, period, population);
            o.uptake = uptake;
            o.uptake_target = uptake * share;
            o.cum_uptake = cum_uptake;
            o.cum_uptake_target = cum_uptake * share;
            o.response_index = Some(gri + 1.0);
            o.response_index_lag1 = Some(gri);
            o.infection_rate = Some(infection);
            o.death_rate = Some(death);
            o.gdp_series = Some(series);
            o.gdp_projected_usd = Some(1e10 * (1.0 + 0.5 * cf));
            o.gdp_gap = Some(match series {
                GdpSeries::Quarterly => {
                    -0.04 + 0.2 * prev_uptake_target + 0.1 * prev_uptake_other - 0.5 * prev_infection - 0.00005 * gri
                        + country_effect
                        + period_effect
                        + noise * 0.001 * rng.next()
                }
                GdpSeries::Annual => gap_base,
            });

            if period.year() == 2020 {
                cum_infections += infection;
            }
            prev_uptake_target = o.uptake_target;
            prev_uptake_other = o.uptake - o.uptake_target;
            prev_infection = infection;
            country_rows.push(o);
        }

        if series == GdpSeries::Annual {
            let last = &country_rows[country_rows.len() - 1];
            let cv_target = last.cum_uptake_target;
            let cv_other = last.cum_uptake - last.cum_uptake_target;
            let change = 0.01 - 0.3 * gap_base + 0.05 * cv_other + 0.08 * cv_target - 0.2 * cum_infections
                + noise * 0.0005 * rng.next();
            for o in country_rows.iter_mut().filter(|o| o.period.year() == 2021) {
                o.gdp_gap = Some(gap_base + change);
            }
        }

        rows.extend(country_rows);
    }

    Panel::new(rows).unwrap()
}

/// Uniform valuation tables for every country and period of `panel`.
pub fn valuation(panel: &Panel) -> ValuationInputs {
    let mut inputs = ValuationInputs::new();
    let multipliers = Multipliers {
        qaly_nonfatal: 0.01,
        qaly_fatal: 12.0,
        direct_cost: 150.0,
        indirect_cost_nonfatal: 40.0,
        indirect_cost_fatal: 2e4,
        unpaid_work_loss: 25.0,
    };
    for row in panel.rows() {
        inputs.insert_multipliers(row.country.clone(), row.period, multipliers);
    }
    for (c, name) in panel.countries().iter().enumerate() {
        let first = panel.row(panel.country_rows(c).start);
        inputs.insert_full_income(name.clone(), 4e4 + 1e3 * c as f64);
        inputs.insert_reference_population(name.clone(), first.population);
    }
    inputs
}

/// Approximate equality check for floating point values.
pub fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
    (a - b).abs() < epsilon
}

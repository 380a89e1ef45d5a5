//! Country vaccination timelines.

use crate::core::{Counterfactual, Panel, Period};
use std::collections::BTreeMap;

/// First quarter with nonzero uptake, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaccinationTimeline {
    Present(Period),
    Absent,
}

impl VaccinationTimeline {
    pub fn first_period(&self) -> Option<Period> {
        match self {
            VaccinationTimeline::Present(p) => Some(*p),
            VaccinationTimeline::Absent => None,
        }
    }
}

/// Timelines of every country in a sample, for one counterfactual.
#[derive(Debug, Clone, PartialEq)]
pub struct Timelines {
    counterfactual: Counterfactual,
    by_country: BTreeMap<usize, VaccinationTimeline>,
}

impl Timelines {
    /// Detect timelines over the given rows.
    ///
    /// The removed uptake defines the start: target-manufacturer uptake for
    /// `NoTarget`, overall uptake for `NoVaccination`.
    pub fn detect(panel: &Panel, rows: &[usize], counterfactual: Counterfactual) -> Self {
        let mut by_country: BTreeMap<usize, VaccinationTimeline> = BTreeMap::new();
        for &i in rows {
            let row = panel.row(i);
            let entry = by_country
                .entry(panel.country_of(i))
                .or_insert(VaccinationTimeline::Absent);
            let uptake = match counterfactual {
                Counterfactual::NoTarget => row.uptake_target,
                Counterfactual::NoVaccination => row.uptake,
            };
            if uptake != 0.0 {
                match entry {
                    VaccinationTimeline::Present(p) if *p <= row.period => {}
                    _ => *entry = VaccinationTimeline::Present(row.period),
                }
            }
        }
        Self {
            counterfactual,
            by_country,
        }
    }

    pub fn counterfactual(&self) -> Counterfactual {
        self.counterfactual
    }

    pub fn get(&self, country: usize) -> VaccinationTimeline {
        self.by_country
            .get(&country)
            .copied()
            .unwrap_or(VaccinationTimeline::Absent)
    }

    /// (panel country index, timeline) in country order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, VaccinationTimeline)> + '_ {
        self.by_country.iter().map(|(&c, &t)| (c, t))
    }

    pub fn absent_countries(&self) -> impl Iterator<Item = usize> + '_ {
        self.iter()
            .filter(|(_, t)| *t == VaccinationTimeline::Absent)
            .map(|(c, _)| c)
    }
}

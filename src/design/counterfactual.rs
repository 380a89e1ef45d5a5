//! Counterfactual design builder.

use super::matrix::DesignMatrix;
use super::timeline::{Timelines, VaccinationTimeline};
use crate::core::{CoverageKind, CoverageNote, Panel, Stage};
use tracing::{debug, warn};

/// A counterfactual design with the timelines it was built from.
#[derive(Debug, Clone)]
pub struct CounterfactualDesign {
    pub design: DesignMatrix,
    pub timelines: Timelines,
    pub notes: Vec<CoverageNote>,
}

/// Zero removed uptake and freeze the response index.
///
/// For every country with a present timeline, the lag-1 response index of
/// the first-vaccination row is copied into all of that country's rows at or
/// after that period. Countries without a timeline keep their observed
/// response index; a present timeline whose anchor row is not in the design
/// skips the country.
pub fn build_counterfactual(
    observed: &DesignMatrix,
    panel: &Panel,
    timelines: Timelines,
    stage: Stage,
) -> CounterfactualDesign {
    let counterfactual = timelines.counterfactual();
    let mut design = observed.clone();
    let mut notes = Vec::new();

    for j in design.registry().uptake_columns(counterfactual.removed_groups()) {
        design.zero_column(j);
    }

    let Some(gri) = design.registry().response_index() else {
        return CounterfactualDesign {
            design,
            timelines,
            notes,
        };
    };

    let blocks = design.country_blocks().to_vec();
    for (country, block) in blocks {
        let name = &panel.countries()[country];
        let first = match timelines.get(country) {
            VaccinationTimeline::Present(p) => p,
            VaccinationTimeline::Absent => {
                debug!(country = %name, scenario = %counterfactual, %stage, "no vaccination timeline, response index not frozen");
                notes.push(CoverageNote {
                    stage,
                    scenario: Some(counterfactual),
                    country: name.clone(),
                    period: None,
                    kind: CoverageKind::NoTimeline,
                });
                continue;
            }
        };

        let period_of = |i: usize| panel.row(design.rows()[i]).period;
        let Some(anchor) = block.clone().find(|&i| period_of(i) == first) else {
            warn!(country = %name, period = %first, %stage, "first-vaccination row missing from design, country skipped");
            notes.push(CoverageNote {
                stage,
                scenario: Some(counterfactual),
                country: name.clone(),
                period: Some(first),
                kind: CoverageKind::MissingAnchorRow,
            });
            continue;
        };

        let frozen = design.get(anchor, gri);
        let targets: Vec<usize> = block.filter(|&i| period_of(i) >= first).collect();
        for i in targets {
            design.set(i, gri, frozen);
        }
    }

    CounterfactualDesign {
        design,
        timelines,
        notes,
    }
}

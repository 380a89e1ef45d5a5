//! Vaccination scenarios.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Manufacturer grouping of uptake regressors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManufacturerGroup {
    /// The single manufacturer whose contribution is being valued.
    Target,
    /// Every other manufacturer.
    Other,
}

/// A scenario in which some vaccination is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Counterfactual {
    /// Target manufacturer's uptake removed.
    NoTarget,
    /// All uptake removed.
    NoVaccination,
}

impl Counterfactual {
    /// Both counterfactuals, in reporting order.
    pub const ALL: [Counterfactual; 2] = [Counterfactual::NoTarget, Counterfactual::NoVaccination];

    /// Manufacturer groups whose uptake columns are zeroed.
    pub fn removed_groups(&self) -> &'static [ManufacturerGroup] {
        match self {
            Counterfactual::NoTarget => &[ManufacturerGroup::Target],
            Counterfactual::NoVaccination => &[ManufacturerGroup::Target, ManufacturerGroup::Other],
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Counterfactual::NoTarget => "no_target",
            Counterfactual::NoVaccination => "no_vaccination",
        }
    }
}

impl fmt::Display for Counterfactual {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Any of the three design variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    Observed,
    NoTarget,
    NoVaccination,
}

impl Scenario {
    pub const ALL: [Scenario; 3] = [Scenario::Observed, Scenario::NoTarget, Scenario::NoVaccination];

    pub fn counterfactual(&self) -> Option<Counterfactual> {
        match self {
            Scenario::Observed => None,
            Scenario::NoTarget => Some(Counterfactual::NoTarget),
            Scenario::NoVaccination => Some(Counterfactual::NoVaccination),
        }
    }

    pub fn removed_groups(&self) -> &'static [ManufacturerGroup] {
        self.counterfactual().map_or(&[], |c| c.removed_groups())
    }

    pub fn label(&self) -> &'static str {
        self.counterfactual().map_or("observed", |c| c.label())
    }
}

impl From<Counterfactual> for Scenario {
    fn from(c: Counterfactual) -> Self {
        match c {
            Counterfactual::NoTarget => Scenario::NoTarget,
            Counterfactual::NoVaccination => Scenario::NoVaccination,
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One value per counterfactual.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PerScenario<T> {
    pub no_target: T,
    pub no_vaccination: T,
}

impl<T> PerScenario<T> {
    pub fn new(no_target: T, no_vaccination: T) -> Self {
        Self {
            no_target,
            no_vaccination,
        }
    }

    /// Build both entries from a function of the counterfactual.
    pub fn from_fn(mut f: impl FnMut(Counterfactual) -> T) -> Self {
        Self {
            no_target: f(Counterfactual::NoTarget),
            no_vaccination: f(Counterfactual::NoVaccination),
        }
    }

    pub fn try_from_fn<E>(mut f: impl FnMut(Counterfactual) -> Result<T, E>) -> Result<Self, E> {
        Ok(Self {
            no_target: f(Counterfactual::NoTarget)?,
            no_vaccination: f(Counterfactual::NoVaccination)?,
        })
    }

    pub fn get(&self, scenario: Counterfactual) -> &T {
        match scenario {
            Counterfactual::NoTarget => &self.no_target,
            Counterfactual::NoVaccination => &self.no_vaccination,
        }
    }

    pub fn get_mut(&mut self, scenario: Counterfactual) -> &mut T {
        match scenario {
            Counterfactual::NoTarget => &mut self.no_target,
            Counterfactual::NoVaccination => &mut self.no_vaccination,
        }
    }

    pub fn map<U>(&self, mut f: impl FnMut(&T) -> U) -> PerScenario<U> {
        PerScenario {
            no_target: f(&self.no_target),
            no_vaccination: f(&self.no_vaccination),
        }
    }
}

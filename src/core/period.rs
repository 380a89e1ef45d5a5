//! Year-quarter keys.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A calendar quarter, printed and parsed as `YYYY_Qn`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Period {
    year: i32,
    quarter: u8,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PeriodError {
    #[error("quarter must be in 1..=4, got {0}")]
    InvalidQuarter(u8),
    #[error("cannot parse period '{0}', expected YYYY_Qn")]
    Malformed(String),
}

impl Period {
    pub fn new(year: i32, quarter: u8) -> Result<Self, PeriodError> {
        if !(1..=4).contains(&quarter) {
            return Err(PeriodError::InvalidQuarter(quarter));
        }
        Ok(Self { year, quarter })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn quarter(&self) -> u8 {
        self.quarter
    }

    /// Quarters since year 0, Q1.
    fn ordinal(&self) -> i64 {
        self.year as i64 * 4 + (self.quarter as i64 - 1)
    }

    fn from_ordinal(ordinal: i64) -> Self {
        Self {
            year: ordinal.div_euclid(4) as i32,
            quarter: (ordinal.rem_euclid(4) + 1) as u8,
        }
    }

    /// Shift by `quarters` (negative moves backwards).
    pub fn offset(&self, quarters: i64) -> Self {
        Self::from_ordinal(self.ordinal() + quarters)
    }

    /// Signed number of quarters from `self` to `other`.
    pub fn quarters_until(&self, other: &Period) -> i64 {
        other.ordinal() - self.ordinal()
    }

    /// Last quarter of a year.
    pub fn q4(year: i32) -> Self {
        Self { year, quarter: 4 }
    }

    /// First quarter of a year.
    pub fn q1(year: i32) -> Self {
        Self { year, quarter: 1 }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_Q{}", self.year, self.quarter)
    }
}

impl FromStr for Period {
    type Err = PeriodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || PeriodError::Malformed(s.to_string());
        let (year, quarter) = s.trim().split_once("_Q").ok_or_else(malformed)?;
        let year: i32 = year.parse().map_err(|_| malformed())?;
        let quarter: u8 = quarter.parse().map_err(|_| malformed())?;
        Period::new(year, quarter)
    }
}

impl Serialize for Period {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Period {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let p: Period = "2021_Q3".parse().unwrap();
        assert_eq!(p.year(), 2021);
        assert_eq!(p.quarter(), 3);
        assert_eq!(p.to_string(), "2021_Q3");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!("2021Q3".parse::<Period>(), Err(PeriodError::Malformed(_))));
        assert_eq!("2021_Q5".parse::<Period>(), Err(PeriodError::InvalidQuarter(5)));
    }

    #[test]
    fn test_offset_crosses_years() {
        let p = Period::new(2020, 4).unwrap();
        assert_eq!(p.offset(2).to_string(), "2021_Q2");
        assert_eq!(p.offset(-4).to_string(), "2019_Q4");
        assert_eq!(p.quarters_until(&p.offset(5)), 5);
    }

    #[test]
    fn test_ordering() {
        let a = Period::new(2020, 4).unwrap();
        let b = Period::new(2021, 1).unwrap();
        assert!(a < b);
    }
}

//! Forecast horizons

use serde::{Deserialize, Serialize};
use std::fmt;

/// Cumulative years up to which the one-year models are used
const ONE_YEAR_CUTOFF: f64 = 1.0;

/// Look-ahead distance a model set was trained for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Horizon {
    #[serde(rename = "1yr")]
    OneYear,
    #[serde(rename = "2yr")]
    TwoYear,
}

impl Horizon {
    pub const ALL: [Horizon; 2] = [Horizon::OneYear, Horizon::TwoYear];

    /// Distance in years between features and target
    pub fn years(self) -> i32 {
        match self {
            Horizon::OneYear => 1,
            Horizon::TwoYear => 2,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Horizon::OneYear => "1yr",
            Horizon::TwoYear => "2yr",
        }
    }

    /// Model set for step `step` (1-based) of a projection advancing
    /// `step_years` per step
    pub fn for_step(step: usize, step_years: f64) -> Self {
        Self::for_cumulative_years(step as f64 * step_years)
    }

    pub fn for_cumulative_years(cumulative: f64) -> Self {
        if cumulative <= ONE_YEAR_CUTOFF {
            Horizon::OneYear
        } else {
            Horizon::TwoYear
        }
    }
}

impl fmt::Display for Horizon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quarterly_switch_after_fourth_step() {
        let horizons: Vec<Horizon> = (1..=8).map(|i| Horizon::for_step(i, 0.25)).collect();
        assert_eq!(&horizons[..4], &[Horizon::OneYear; 4]);
        assert_eq!(&horizons[4..], &[Horizon::TwoYear; 4]);
    }

    #[test]
    fn test_boundary_is_inclusive() {
        assert_eq!(Horizon::for_cumulative_years(1.0), Horizon::OneYear);
        assert_eq!(Horizon::for_cumulative_years(1.0001), Horizon::TwoYear);
        assert_eq!(Horizon::for_step(3, 0.5), Horizon::TwoYear);
        // Beyond two years the two-year models are still used
        assert_eq!(Horizon::for_cumulative_years(3.5), Horizon::TwoYear);
    }

    #[test]
    fn test_labels() {
        assert_eq!(serde_json::to_string(&Horizon::OneYear).unwrap(), "\"1yr\"");
        assert_eq!(Horizon::TwoYear.to_string(), "2yr");
        assert_eq!(Horizon::TwoYear.years(), 2);
    }
}

//! Time-related types for fantasy football seasons and weeks.

use crate::error::{CommishError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::{Month, OffsetDateTime};

/// Type-safe wrapper for Season years
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Season(pub u16);

impl Season {
    pub fn new(year: u16) -> Self {
        Self(year)
    }

    pub fn as_u16(&self) -> u16 {
        self.0
    }

    /// The NFL season a calendar date belongs to.
    ///
    /// Seasons are named after the year they kick off in, so January and
    /// February games still belong to the previous year's season.
    pub fn containing(date: OffsetDateTime) -> Self {
        let year = date.year() as u16;
        match date.month() {
            Month::January | Month::February => Self(year - 1),
            _ => Self(year),
        }
    }

    pub fn current() -> Self {
        Self::containing(OffsetDateTime::now_utc())
    }
}

impl Default for Season {
    fn default() -> Self {
        Self::current()
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Season {
    type Err = CommishError;

    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .parse()
            .map(Self)
            .map_err(|_| CommishError::config(format!("season '{s}'")))
    }
}

/// Type-safe wrapper for scoring-week numbers. Always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
pub struct Week(u16);

impl Week {
    /// Returns `None` for week 0, which no provider uses for a played week.
    pub fn new(week: u16) -> Option<Self> {
        (week > 0).then_some(Self(week))
    }

    pub fn as_u16(&self) -> u16 {
        self.0
    }

    /// The week before this one, if any.
    pub fn previous(&self) -> Option<Self> {
        Self::new(self.0 - 1)
    }
}

impl TryFrom<u16> for Week {
    type Error = CommishError;

    fn try_from(week: u16) -> Result<Self> {
        Week::new(week).ok_or_else(|| CommishError::config(format!("week {week} (must be positive)")))
    }
}

impl From<Week> for u16 {
    fn from(week: Week) -> u16 {
        week.0
    }
}

impl fmt::Display for Week {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Week {
    type Err = CommishError;

    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .parse::<u16>()
            .ok()
            .and_then(Week::new)
            .ok_or_else(|| CommishError::config(format!("week '{s}' (must be a positive integer)")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_week_rejects_zero() {
        assert!(Week::new(0).is_none());
        assert!("0".parse::<Week>().is_err());
        assert!("abc".parse::<Week>().is_err());
        assert_eq!("7".parse::<Week>().unwrap().as_u16(), 7);
    }

    #[test]
    fn test_week_deserialize_rejects_zero() {
        assert!(serde_json::from_value::<Week>(serde_json::json!(0)).is_err());
        assert_eq!(
            serde_json::from_value::<Week>(serde_json::json!(4)).unwrap(),
            Week::new(4).unwrap()
        );
        assert_eq!(serde_json::to_value(Week::new(4).unwrap()).unwrap(), serde_json::json!(4));
    }

    #[test]
    fn test_week_previous() {
        assert_eq!(Week::new(5).unwrap().previous(), Week::new(4));
        assert_eq!(Week::new(1).unwrap().previous(), None);
    }

    #[test]
    fn test_season_containing_date() {
        assert_eq!(Season::containing(datetime!(2026-10-18 12:00 UTC)), Season::new(2026));
        assert_eq!(Season::containing(datetime!(2027-01-10 12:00 UTC)), Season::new(2026));
        assert_eq!(Season::containing(datetime!(2027-03-01 0:00 UTC)), Season::new(2027));
    }

    #[test]
    fn test_season_from_str() {
        assert_eq!("2025".parse::<Season>().unwrap(), Season::new(2025));
        assert!("twenty".parse::<Season>().is_err());
    }
}

//! ID types for fantasy leagues and teams.

use crate::error::{CommishError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Type-safe wrapper for a provider's league identifier.
///
/// ESPN and Yahoo hand out small integers while Sleeper uses 18-digit
/// snowflakes, so the id is kept as the provider's own string. Blank ids are
/// rejected at parse time.
///
/// # Examples
///
/// ```rust
/// use commish::LeagueId;
///
/// let league_id: LeagueId = " 123456 ".parse().unwrap();
/// assert_eq!(league_id.as_str(), "123456");
/// assert!("   ".parse::<LeagueId>().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeagueId(String);

impl LeagueId {
    /// Create a LeagueId, trimming surrounding whitespace.
    pub fn new(id: impl AsRef<str>) -> Result<Self> {
        let trimmed = id.as_ref().trim();
        if trimmed.is_empty() {
            return Err(CommishError::config("league id"));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LeagueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for LeagueId {
    type Err = CommishError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

/// Team identifier, unique within one league snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TeamId(pub String);

impl TeamId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<u64> for TeamId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

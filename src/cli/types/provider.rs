//! League data provider selector.

use crate::error::CommishError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The fantasy platforms a league can be hosted on.
///
/// # Examples
///
/// ```rust
/// use commish::Provider;
///
/// assert_eq!("sleeper".parse::<Provider>().unwrap(), Provider::Sleeper);
/// assert_eq!(Provider::Espn.to_string(), "ESPN");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Espn,
    Yahoo,
    Sleeper,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::Espn, Provider::Yahoo, Provider::Sleeper];
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Provider::Espn => "ESPN",
            Provider::Yahoo => "Yahoo",
            Provider::Sleeper => "Sleeper",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Provider {
    type Err = CommishError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "espn" => Ok(Provider::Espn),
            "yahoo" => Ok(Provider::Yahoo),
            "sleeper" => Ok(Provider::Sleeper),
            other => Err(CommishError::config(format!(
                "provider '{other}' (expected espn, yahoo or sleeper)"
            ))),
        }
    }
}

//! Per-provider credential shapes handed to the adapters.

use std::fmt;

use crate::{oauth::TokenSession, LeagueId, Provider, Season};

/// ESPN private-league session cookies.
#[derive(Clone, PartialEq, Eq)]
pub struct EspnCredentials {
    pub league_id: LeagueId,
    pub season: Season,
    pub swid: String,
    pub espn_s2: String,
}

impl fmt::Debug for EspnCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EspnCredentials")
            .field("league_id", &self.league_id)
            .field("season", &self.season)
            .field("swid", &"<redacted>")
            .field("espn_s2", &"<redacted>")
            .finish()
    }
}

/// Yahoo league plus the token session that authorizes reads.
///
/// The session is shared, so the adapter locks it for the duration of each
/// fetch and refreshes the access token first if it has expired.
#[derive(Clone)]
pub struct YahooCredentials {
    pub league_id: LeagueId,
    pub session: TokenSession,
}

impl fmt::Debug for YahooCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("YahooCredentials")
            .field("league_id", &self.league_id)
            .finish_non_exhaustive()
    }
}

/// Sleeper leagues are public; the id is all that is needed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SleeperCredentials {
    pub league_id: LeagueId,
}

/// Credentials tagged by the provider they belong to.
#[derive(Debug, Clone)]
pub enum CredentialBundle {
    Espn(EspnCredentials),
    Yahoo(YahooCredentials),
    Sleeper(SleeperCredentials),
}

impl CredentialBundle {
    pub fn provider(&self) -> Provider {
        match self {
            CredentialBundle::Espn(_) => Provider::Espn,
            CredentialBundle::Yahoo(_) => Provider::Yahoo,
            CredentialBundle::Sleeper(_) => Provider::Sleeper,
        }
    }

    pub fn league_id(&self) -> &LeagueId {
        match self {
            CredentialBundle::Espn(c) => &c.league_id,
            CredentialBundle::Yahoo(c) => &c.league_id,
            CredentialBundle::Sleeper(c) => &c.league_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_espn_debug_redacts_cookies() {
        let creds = EspnCredentials {
            league_id: LeagueId::new("42").unwrap(),
            season: Season::new(2025),
            swid: "{SECRET-SWID}".to_string(),
            espn_s2: "SECRETS2".to_string(),
        };

        let debug = format!("{:?}", creds);
        assert!(debug.contains("42"));
        assert!(!debug.contains("SECRET"));
    }

    #[test]
    fn test_bundle_provider_and_league() {
        let bundle = CredentialBundle::Sleeper(SleeperCredentials {
            league_id: LeagueId::new("123456").unwrap(),
        });

        assert_eq!(bundle.provider(), Provider::Sleeper);
        assert_eq!(bundle.league_id().as_str(), "123456");
    }
}

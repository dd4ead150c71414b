//! Provider adapters and the facade that dispatches between them.
//!
//! Every adapter exposes the same capability, `fetch_league_summary`, and
//! produces a [`LeagueSnapshot`](crate::league::LeagueSnapshot). [`Adapter`]
//! is the tagged union the facade selects from.

pub mod aggregate;
pub mod espn;
pub mod sleeper;
pub mod yahoo;

pub use aggregate::{Aggregator, RawCredentials};
pub use espn::EspnAdapter;
pub use sleeper::SleeperAdapter;
pub use yahoo::YahooAdapter;

use crate::{
    league::{CredentialBundle, LeagueSnapshot},
    CommishError, Provider, Result, Week,
};

#[derive(Debug, Clone)]
pub enum Adapter {
    Espn(EspnAdapter),
    Yahoo(YahooAdapter),
    Sleeper(SleeperAdapter),
}

impl Adapter {
    pub fn provider(&self) -> Provider {
        match self {
            Adapter::Espn(_) => Provider::Espn,
            Adapter::Yahoo(_) => Provider::Yahoo,
            Adapter::Sleeper(_) => Provider::Sleeper,
        }
    }

    /// Fetch one week of league results. `None` lets the adapter pick the
    /// latest completed week.
    pub async fn fetch_league_summary(
        &self,
        credentials: &CredentialBundle,
        week: Option<Week>,
    ) -> Result<LeagueSnapshot> {
        match (self, credentials) {
            (Adapter::Espn(adapter), CredentialBundle::Espn(creds)) => {
                adapter.fetch_league_summary(creds, week).await
            }
            (Adapter::Yahoo(adapter), CredentialBundle::Yahoo(creds)) => {
                adapter.fetch_league_summary(creds, week).await
            }
            (Adapter::Sleeper(adapter), CredentialBundle::Sleeper(creds)) => {
                adapter.fetch_league_summary(creds, week).await
            }
            (adapter, creds) => Err(CommishError::config(format!(
                "{} credentials cannot be used with the {} adapter",
                creds.provider(),
                adapter.provider()
            ))),
        }
    }
}

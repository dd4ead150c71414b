//! Normalized league data and the credentials used to fetch it.

pub mod credentials;
pub mod snapshot;

pub use credentials::{CredentialBundle, EspnCredentials, SleeperCredentials, YahooCredentials};
pub use snapshot::{
    rank_by_provider, rank_by_record, LeagueSnapshot, Matchup, Record, StandingLine, Team,
    TeamRank,
};

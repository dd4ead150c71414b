//! CLI argument definitions and parsing.

pub mod types;

use clap::{Args, Parser, Subcommand};
use types::{Provider, Season, Week};

use crate::narrative::DEFAULT_INTENSITY;

/// Inputs for one recap run.
#[derive(Debug, Args)]
pub struct RecapArgs {
    /// League platform: espn, yahoo or sleeper.
    #[clap(long, short)]
    pub provider: Provider,

    /// League ID (or set `COMMISH_LEAGUE_ID` env var).
    #[clap(long, short)]
    pub league_id: Option<String>,

    /// ESPN `SWID` session cookie (or set `ESPN_SWID`).
    #[clap(long)]
    pub swid: Option<String>,

    /// ESPN `espn_s2` session cookie (or set `ESPN_S2`).
    #[clap(long = "espn-s2")]
    pub espn_s2: Option<String>,

    /// Yahoo authorization code. Prompted for when omitted.
    #[clap(long)]
    pub auth_code: Option<String>,

    /// Scoring week to recap. Defaults to the latest completed week.
    #[clap(long, short)]
    pub week: Option<Week>,

    /// Season year for ESPN leagues (e.g. 2025). Defaults to the current season.
    #[clap(long, short)]
    pub season: Option<Season>,

    /// Narrator voice, e.g. "a washed-up sportscaster".
    #[clap(long)]
    pub persona: Option<String>,

    /// Trash talk level: 1 is friendly banter, 10 is all-out roasting.
    #[clap(long, short, default_value_t = DEFAULT_INTENSITY)]
    pub intensity: u8,

    /// Screen the persona with the moderation endpoint first.
    #[clap(long)]
    pub moderate: bool,

    /// Print the normalized league snapshot as JSON instead of narrating.
    #[clap(long)]
    pub json_snapshot: bool,

    /// Print progress to stderr.
    #[clap(long, short)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Fetch a league week and stream a narrated recap.
    Recap(RecapArgs),

    /// Print the Yahoo consent page URL that yields an authorization code.
    AuthUrl,
}

#[derive(Debug, Parser)]
#[clap(
    name = "commish",
    version,
    about = "Weekly fantasy football recaps for ESPN, Yahoo and Sleeper leagues"
)]
pub struct Commish {
    #[clap(subcommand)]
    pub command: Commands,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Commish::command().debug_assert();
    }

    #[test]
    fn test_parse_recap() {
        let cli = Commish::try_parse_from([
            "commish",
            "recap",
            "--provider",
            "Sleeper",
            "--league-id",
            "123456",
            "--persona",
            "a calm analyst",
            "-i",
            "1",
        ])
        .unwrap();

        let Commands::Recap(args) = cli.command else {
            panic!("expected recap");
        };
        assert_eq!(args.provider, Provider::Sleeper);
        assert_eq!(args.league_id.as_deref(), Some("123456"));
        assert_eq!(args.intensity, 1);
        assert!(args.week.is_none());
        assert!(!args.moderate);
    }

    #[test]
    fn test_parse_rejects_unknown_provider_and_zero_week() {
        assert!(Commish::try_parse_from(["commish", "recap", "-p", "fleaflicker"]).is_err());
        assert!(Commish::try_parse_from(["commish", "recap", "-p", "espn", "-w", "0"]).is_err());
    }

    #[test]
    fn test_intensity_defaults_to_five() {
        let cli = Commish::try_parse_from(["commish", "recap", "-p", "yahoo"]).unwrap();
        let Commands::Recap(args) = cli.command else {
            panic!("expected recap");
        };
        assert_eq!(args.intensity, 5);
    }
}

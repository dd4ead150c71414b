//! Sleeper adapter over the public read API (`/v1`).

use std::collections::{BTreeMap, HashMap};

use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::{
    core::{decode, get_json, RetryPolicy},
    league::{
        rank_by_record, LeagueSnapshot, Matchup, Record, SleeperCredentials, StandingLine, Team,
    },
    CommishError, Provider, Result, TeamId, Week,
};


const PROVIDER: Provider = Provider::Sleeper;

/// `GET /state/nfl`
#[derive(Debug, Clone, Deserialize)]
pub struct NflState {
    pub week: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SleeperLeague {
    pub league_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub total_rosters: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SleeperUser {
    pub user_id: String,
    pub display_name: String,
    #[serde(default)]
    pub metadata: Option<SleeperUserMetadata>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SleeperUserMetadata {
    #[serde(default)]
    pub team_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SleeperRoster {
    pub roster_id: u32,
    #[serde(default)]
    pub owner_id: Option<String>,
    pub settings: RosterSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RosterSettings {
    #[serde(default)]
    pub wins: u32,
    #[serde(default)]
    pub losses: u32,
    #[serde(default)]
    pub ties: u32,
    #[serde(default)]
    pub fpts: u32,
    #[serde(default)]
    pub fpts_decimal: u32,
}

impl RosterSettings {
    /// Sleeper splits season points into whole and hundredths.
    pub fn points_for(&self) -> f64 {
        self.fpts as f64 + self.fpts_decimal as f64 / 100.0
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SleeperMatchupEntry {
    pub roster_id: u32,
    #[serde(default)]
    pub matchup_id: Option<u32>,
    #[serde(default)]
    pub points: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct SleeperAdapter {
    http: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl SleeperAdapter {
    pub fn new(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            retry: RetryPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn get(&self, path: &str) -> Result<Value> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), path);
        get_json(PROVIDER, self.http.get(url), self.retry).await
    }

    #[instrument(name = "sleeper.fetch_league_summary", skip_all, fields(league_id = %creds.league_id))]
    pub async fn fetch_league_summary(
        &self,
        creds: &SleeperCredentials,
        week: Option<Week>,
    ) -> Result<LeagueSnapshot> {
        let league_id = creds.league_id.as_str();

        let state: NflState = decode(PROVIDER, self.get("state/nfl").await?, "NFL state")?;

        // Unknown leagues come back as a literal `null`.
        let league = self.get(&format!("league/{league_id}")).await?;
        if league.is_null() {
            return Err(CommishError::NotFound {
                provider: PROVIDER,
                what: format!("league {league_id}"),
            });
        }
        let league: SleeperLeague = decode(PROVIDER, league, "league")?;

        let week = match week {
            Some(week) => week,
            None => Week::new(state.week).ok_or_else(|| CommishError::NotFound {
                provider: PROVIDER,
                what: "a completed week (the season has not started)".to_string(),
            })?,
        };
        debug!(%week, current_week = state.week, "resolved Sleeper week");

        let users: Vec<SleeperUser> =
            decode(PROVIDER, self.get(&format!("league/{league_id}/users")).await?, "users")?;
        let rosters: Vec<SleeperRoster> = decode(
            PROVIDER,
            self.get(&format!("league/{league_id}/rosters")).await?,
            "rosters",
        )?;
        let matchups: Vec<SleeperMatchupEntry> = decode(
            PROVIDER,
            self.get(&format!("league/{league_id}/matchups/{week}")).await?,
            "matchups",
        )?;

        normalize(creds, &state, &league, week, &users, &rosters, &matchups)
    }
}

/// Build the snapshot from already-fetched Sleeper payloads.
pub fn normalize(
    creds: &SleeperCredentials,
    state: &NflState,
    league: &SleeperLeague,
    week: Week,
    users: &[SleeperUser],
    rosters: &[SleeperRoster],
    entries: &[SleeperMatchupEntry],
) -> Result<LeagueSnapshot> {
    if let Some(total) = league.total_rosters {
        if total as usize != rosters.len() {
            debug!(total, found = rosters.len(), "roster count differs from league settings");
        }
    }

    let users: HashMap<&str, &SleeperUser> =
        users.iter().map(|u| (u.user_id.as_str(), u)).collect();

    let mut teams = Vec::with_capacity(rosters.len());
    let mut lines = Vec::with_capacity(rosters.len());
    for roster in rosters {
        let id = TeamId::from(roster.roster_id as u64);
        let (name, owner) = match roster.owner_id.as_deref() {
            None => (format!("Team {}", roster.roster_id), "Orphaned".to_string()),
            Some(owner_id) => {
                let user = users.get(owner_id).ok_or_else(|| {
                    CommishError::malformed(
                        PROVIDER,
                        format!("roster {} is owned by unknown user {owner_id}", roster.roster_id),
                    )
                })?;
                let name = user
                    .metadata
                    .as_ref()
                    .and_then(|m| m.team_name.clone())
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or_else(|| user.display_name.clone());
                (name, user.display_name.clone())
            }
        };
        let s = &roster.settings;
        let record = Record::new(s.wins, s.losses, s.ties);
        lines.push(StandingLine {
            team_id: id.clone(),
            record,
            points_for: s.points_for(),
        });
        teams.push(Team {
            id,
            name,
            owner,
            record,
        });
    }

    let mut pairs: BTreeMap<u32, Vec<&SleeperMatchupEntry>> = BTreeMap::new();
    for entry in entries {
        // No matchup id means a bye.
        if let Some(matchup_id) = entry.matchup_id {
            pairs.entry(matchup_id).or_default().push(entry);
        }
    }

    let mut matchups = Vec::with_capacity(pairs.len());
    for (matchup_id, sides) in pairs {
        let [home, away] = sides.as_slice() else {
            if sides.len() == 1 {
                continue;
            }
            return Err(CommishError::malformed(
                PROVIDER,
                format!("matchup {matchup_id} has {} sides", sides.len()),
            ));
        };
        let home_score = side_score(home, week, state)?;
        let away_score = side_score(away, week, state)?;
        matchups.push(Matchup {
            home_team_id: TeamId::from(home.roster_id as u64),
            away_team_id: TeamId::from(away.roster_id as u64),
            home_score,
            away_score,
            is_complete: week.as_u16() < state.week || (home_score > 0.0 && away_score > 0.0),
        });
    }

    let snapshot = LeagueSnapshot::new(
        PROVIDER,
        creds.league_id.clone(),
        week,
        teams,
        matchups,
        rank_by_record(lines),
    )?;
    Ok(match &league.name {
        Some(name) => snapshot.with_league_name(name.clone()),
        None => snapshot,
    })
}

/// Sleeper leaves `points` null until a week's games start; a past week without them is unusable.
fn side_score(entry: &SleeperMatchupEntry, week: Week, state: &NflState) -> Result<f64> {
    match entry.points {
        Some(points) => Ok(points),
        None if week.as_u16() >= state.week => Ok(0.0),
        None => Err(CommishError::malformed(
            PROVIDER,
            format!("roster {} has no points for week {week}", entry.roster_id),
        )),
    }
}

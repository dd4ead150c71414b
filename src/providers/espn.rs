//! ESPN adapter over the fantasy v3 reads API, authenticated by session cookies.

use std::collections::HashMap;

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::{
    core::{decode, espn_cookie_header_map, get_json, RetryPolicy},
    league::{rank_by_provider, EspnCredentials, LeagueSnapshot, Matchup, Record, StandingLine, Team},
    CommishError, Provider, Result, TeamId, Week,
};


const PROVIDER: Provider = Provider::Espn;

/// Views requested in one call: teams, scores, league name, current period.
const LEAGUE_VIEWS: [&str; 4] = ["mTeam", "mMatchupScore", "mSettings", "mStatus"];

const UNDECIDED: &str = "UNDECIDED";

/// Root of the league endpoint for the requested views.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EspnLeague {
    #[serde(default)]
    pub settings: Option<EspnSettings>,
    pub status: EspnStatus,
    #[serde(default)]
    pub members: Vec<EspnMember>,
    pub teams: Vec<EspnTeam>,
    #[serde(default)]
    pub schedule: Vec<EspnScheduleItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EspnSettings {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EspnStatus {
    pub current_matchup_period: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EspnMember {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

impl EspnMember {
    fn label(&self) -> Option<String> {
        let full = format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or_default(),
            self.last_name.as_deref().unwrap_or_default()
        );
        let full = full.trim();
        if !full.is_empty() {
            return Some(full.to_string());
        }
        self.display_name.clone().filter(|n| !n.trim().is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EspnTeam {
    pub id: u32,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub owners: Vec<String>,
    #[serde(default)]
    pub playoff_seed: Option<u32>,
    pub record: EspnRecord,
}

impl EspnTeam {
    /// Newer leagues carry `name`; older ones split it into location + nickname.
    fn display_name(&self) -> Option<String> {
        if let Some(name) = self.name.as_deref().filter(|n| !n.trim().is_empty()) {
            return Some(name.trim().to_string());
        }
        let joined = format!(
            "{} {}",
            self.location.as_deref().unwrap_or_default(),
            self.nickname.as_deref().unwrap_or_default()
        );
        let joined = joined.trim();
        (!joined.is_empty()).then(|| joined.to_string())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EspnRecord {
    pub overall: EspnRecordLine,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EspnRecordLine {
    pub wins: u32,
    pub losses: u32,
    pub ties: u32,
    pub points_for: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EspnScheduleItem {
    pub matchup_period_id: u16,
    pub home: EspnMatchupSide,
    /// Missing on byes.
    #[serde(default)]
    pub away: Option<EspnMatchupSide>,
    #[serde(default)]
    pub winner: Option<String>,
}

impl EspnScheduleItem {
    fn is_decided(&self) -> bool {
        self.winner.as_deref().is_some_and(|w| w != UNDECIDED)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EspnMatchupSide {
    pub team_id: u32,
    #[serde(default)]
    pub total_points: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct EspnAdapter {
    http: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl EspnAdapter {
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

    /// ESPN answers 401 for bad cookies on a private league and 404 for a
    /// league id that does not exist; both surface as-is.
    #[instrument(
        name = "espn.fetch_league_summary",
        skip_all,
        fields(league_id = %creds.league_id, season = %creds.season)
    )]
    pub async fn fetch_league_summary(
        &self,
        creds: &EspnCredentials,
        week: Option<Week>,
    ) -> Result<LeagueSnapshot> {
        let url = format!(
            "{}/seasons/{}/segments/0/leagues/{}",
            self.base_url.trim_end_matches('/'),
            creds.season,
            creds.league_id
        );
        let headers = espn_cookie_header_map(&creds.swid, &creds.espn_s2)?;
        let mut params: Vec<(&str, &str)> = LEAGUE_VIEWS.iter().map(|v| ("view", *v)).collect();
        let period = week.map(|w| w.to_string());
        if let Some(period) = &period {
            params.push(("scoringPeriodId", period.as_str()));
        }

        let request = self.http.get(&url).headers(headers).query(&params);
        let payload = get_json(PROVIDER, request, self.retry).await?;
        let league: EspnLeague = decode(PROVIDER, payload, "league")?;

        normalize(creds, &league, week)
    }
}

/// Latest matchup period whose games are all decided.
pub fn completed_week(league: &EspnLeague) -> Option<Week> {
    let current = league.status.current_matchup_period;
    let mut games = league
        .schedule
        .iter()
        .filter(|item| item.matchup_period_id == current)
        .peekable();
    let current_done = games.peek().is_some() && games.all(EspnScheduleItem::is_decided);
    if current_done {
        Week::new(current)
    } else {
        Week::new(current.saturating_sub(1))
    }
}

/// Build the snapshot from an already-fetched league payload.
pub fn normalize(
    creds: &EspnCredentials,
    league: &EspnLeague,
    week: Option<Week>,
) -> Result<LeagueSnapshot> {
    let week = match week {
        Some(week) => week,
        None => completed_week(league).ok_or_else(|| CommishError::NotFound {
            provider: PROVIDER,
            what: "a completed week (no matchup period has finished)".to_string(),
        })?,
    };
    debug!(%week, current = league.status.current_matchup_period, "resolved ESPN week");

    let members: HashMap<&str, &EspnMember> =
        league.members.iter().map(|m| (m.id.as_str(), m)).collect();

    let mut teams = Vec::with_capacity(league.teams.len());
    let mut lines = Vec::with_capacity(league.teams.len());
    for team in &league.teams {
        let name = team.display_name().ok_or_else(|| {
            CommishError::malformed(PROVIDER, format!("team {} has no name", team.id))
        })?;
        let owner = team
            .owners
            .first()
            .and_then(|id| members.get(id.as_str()))
            .and_then(|m| m.label())
            .ok_or_else(|| {
                CommishError::malformed(PROVIDER, format!("team {} has no known owner", team.id))
            })?;
        let line = &team.record.overall;
        let record = Record::new(line.wins, line.losses, line.ties);
        let id = TeamId::from(team.id as u64);

        // ESPN's playoff seed is the league's own ordering.
        lines.push((
            team.playoff_seed,
            StandingLine {
                team_id: id.clone(),
                record,
                points_for: line.points_for,
            },
        ));
        teams.push(Team {
            id,
            name,
            owner,
            record,
        });
    }

    let week_games: Vec<&EspnScheduleItem> = league
        .schedule
        .iter()
        .filter(|item| item.matchup_period_id == week.as_u16())
        .collect();
    if week_games.is_empty() {
        return Err(CommishError::NotFound {
            provider: PROVIDER,
            what: format!("matchups for week {week}"),
        });
    }

    let mut matchups = Vec::with_capacity(week_games.len());
    for item in week_games {
        let Some(away) = item.away.as_ref() else {
            continue;
        };
        matchups.push(Matchup {
            home_team_id: TeamId::from(item.home.team_id as u64),
            away_team_id: TeamId::from(away.team_id as u64),
            home_score: side_score(item, &item.home)?,
            away_score: side_score(item, away)?,
            is_complete: item.is_decided(),
        });
    }

    let snapshot = LeagueSnapshot::new(
        PROVIDER,
        creds.league_id.clone(),
        week,
        teams,
        matchups,
        rank_by_provider(lines),
    )?;
    Ok(match league.settings.as_ref().and_then(|s| s.name.clone()) {
        Some(name) => snapshot.with_league_name(name),
        None => snapshot,
    })
}

/// Undecided games may omit `totalPoints`; a decided game without it is unusable.
fn side_score(item: &EspnScheduleItem, side: &EspnMatchupSide) -> Result<f64> {
    match side.total_points {
        Some(points) => Ok(points),
        None if !item.is_decided() => Ok(0.0),
        None => Err(CommishError::malformed(
            PROVIDER,
            format!(
                "team {} has no score for decided week {}",
                side.team_id, item.matchup_period_id
            ),
        )),
    }
}

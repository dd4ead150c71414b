//! Yahoo Fantasy adapter over the v2 REST API (`?format=json`).
//!
//! Yahoo's JSON mirrors its XML: records arrive as arrays of single-key
//! objects, and collections as objects keyed `"0"`, `"1"`, … plus a `count`.
//! The helpers at the bottom flatten both before anything is typed.

use reqwest::Client;
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use crate::{
    core::{get_json, RetryPolicy},
    league::{
        rank_by_provider, LeagueSnapshot, Matchup, Record, StandingLine, Team, YahooCredentials,
    },
    CommishError, Provider, Result, TeamId, Week,
};


const PROVIDER: Provider = Provider::Yahoo;

/// Matchup status once every player's game is final.
const POSTEVENT: &str = "postevent";
/// Matchup status before any player has kicked off.
const PREEVENT: &str = "preevent";

/// League metadata from the standings call.
#[derive(Debug, Clone, PartialEq)]
pub struct YahooLeagueMeta {
    pub name: Option<String>,
    pub current_week: u16,
}

/// One team row from the standings call.
#[derive(Debug, Clone, PartialEq)]
pub struct YahooTeamStanding {
    pub team_id: String,
    pub name: String,
    pub manager: Option<String>,
    pub rank: Option<u32>,
    pub record: Record,
    pub points_for: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct YahooMatchup {
    pub status: String,
    /// `(team_id, week points)` per side.
    pub sides: Vec<(String, f64)>,
}

impl YahooMatchup {
    fn is_final(&self) -> bool {
        self.status == POSTEVENT
    }
}

#[derive(Debug, Clone)]
pub struct YahooAdapter {
    http: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl YahooAdapter {
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

    fn league_key(creds: &YahooCredentials) -> String {
        format!("nfl.l.{}", creds.league_id)
    }

    async fn get(&self, token: &str, resource: &str) -> Result<Value> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), resource);
        let request = self
            .http
            .get(url)
            .bearer_auth(token)
            .query(&[("format", "json")]);
        get_json(PROVIDER, request, self.retry).await
    }

    async fn scoreboard(&self, token: &str, key: &str, week: Week) -> Result<Vec<YahooMatchup>> {
        let payload = self.get(token, &format!("league/{key}/scoreboard;week={week}")).await?;
        parse_scoreboard(&payload)
    }

    /// The session lock is held for the whole fetch, so a refresh triggered
    /// here cannot race another reader of the same session.
    #[instrument(name = "yahoo.fetch_league_summary", skip_all, fields(league_id = %creds.league_id))]
    pub async fn fetch_league_summary(
        &self,
        creds: &YahooCredentials,
        week: Option<Week>,
    ) -> Result<LeagueSnapshot> {
        let mut session = creds.session.lock().await;
        let token = session.ensure_valid().await?;
        let key = Self::league_key(creds);

        let standings = self.get(&token, &format!("league/{key}/standings")).await?;
        let (meta, teams) = parse_standings(&standings)?;

        let (week, matchups) = match week {
            Some(week) => (week, self.scoreboard(&token, &key, week).await?),
            None => {
                let current = Week::new(meta.current_week).ok_or_else(not_started)?;
                let matchups = self.scoreboard(&token, &key, current).await?;
                if !matchups.is_empty() && matchups.iter().all(YahooMatchup::is_final) {
                    (current, matchups)
                } else {
                    let previous = current.previous().ok_or_else(not_started)?;
                    debug!(%current, %previous, "current Yahoo week still in progress");
                    (previous, self.scoreboard(&token, &key, previous).await?)
                }
            }
        };
        drop(session);

        normalize(creds, &meta, week, &teams, &matchups)
    }
}

fn not_started() -> CommishError {
    CommishError::NotFound {
        provider: PROVIDER,
        what: "a completed week (the season has not started)".to_string(),
    }
}

/// Build the snapshot from already-parsed standings and scoreboard.
pub fn normalize(
    creds: &YahooCredentials,
    meta: &YahooLeagueMeta,
    week: Week,
    standings: &[YahooTeamStanding],
    scoreboard: &[YahooMatchup],
) -> Result<LeagueSnapshot> {
    let mut teams = Vec::with_capacity(standings.len());
    let mut lines = Vec::with_capacity(standings.len());
    for row in standings {
        let id = TeamId::new(row.team_id.clone());
        let owner = row.manager.clone().ok_or_else(|| {
            CommishError::malformed(PROVIDER, format!("team {} has no manager", row.team_id))
        })?;
        lines.push((
            row.rank,
            StandingLine {
                team_id: id.clone(),
                record: row.record,
                points_for: row.points_for,
            },
        ));
        teams.push(Team {
            id,
            name: row.name.clone(),
            owner,
            record: row.record,
        });
    }

    let mut matchups = Vec::with_capacity(scoreboard.len());
    for m in scoreboard {
        match m.sides.as_slice() {
            [(home, home_score), (away, away_score)] => matchups.push(Matchup {
                home_team_id: TeamId::new(home.clone()),
                away_team_id: TeamId::new(away.clone()),
                home_score: *home_score,
                away_score: *away_score,
                is_complete: m.is_final(),
            }),
            // Byes and median-scoring slots carry one side.
            [_] => {}
            sides => {
                return Err(CommishError::malformed(
                    PROVIDER,
                    format!("matchup with {} sides", sides.len()),
                ))
            }
        }
    }

    let snapshot = LeagueSnapshot::new(
        PROVIDER,
        creds.league_id.clone(),
        week,
        teams,
        matchups,
        rank_by_provider(lines),
    )?;
    Ok(match &meta.name {
        Some(name) => snapshot.with_league_name(name.clone()),
        None => snapshot,
    })
}

/// `fantasy_content.league` is `[metadata, {resource}]`.
fn league_parts(payload: &Value) -> Result<(Map<String, Value>, &Value)> {
    let parts = payload
        .pointer("/fantasy_content/league")
        .and_then(Value::as_array)
        .ok_or_else(|| CommishError::malformed(PROVIDER, "missing fantasy_content.league"))?;
    let meta = parts
        .first()
        .map(flatten)
        .ok_or_else(|| CommishError::malformed(PROVIDER, "league metadata missing"))?;
    let resource = parts
        .get(1)
        .ok_or_else(|| CommishError::malformed(PROVIDER, "league resource missing"))?;
    Ok((meta, resource))
}

/// Parse `league/{key}/standings`.
pub fn parse_standings(payload: &Value) -> Result<(YahooLeagueMeta, Vec<YahooTeamStanding>)> {
    let (meta, resource) = league_parts(payload)?;
    let current_week = meta
        .get("current_week")
        .and_then(as_u32)
        .and_then(|w| u16::try_from(w).ok())
        .ok_or_else(|| CommishError::malformed(PROVIDER, "league has no current_week"))?;
    let meta = YahooLeagueMeta {
        name: meta.get("name").and_then(Value::as_str).map(str::to_string),
        current_week,
    };

    let standings = resource
        .get("standings")
        .map(flatten)
        .ok_or_else(|| CommishError::malformed(PROVIDER, "missing standings"))?;
    let teams = standings
        .get("teams")
        .map(collection)
        .ok_or_else(|| CommishError::malformed(PROVIDER, "standings have no teams"))?;

    let rows = teams
        .into_iter()
        .map(parse_team_row)
        .collect::<Result<Vec<_>>>()?;
    Ok((meta, rows))
}

fn parse_team_row(entry: &Value) -> Result<YahooTeamStanding> {
    let team = entry
        .get("team")
        .map(flatten)
        .ok_or_else(|| CommishError::malformed(PROVIDER, "standings entry without team"))?;

    let team_id = team
        .get("team_id")
        .and_then(as_text)
        .ok_or_else(|| CommishError::malformed(PROVIDER, "team without team_id"))?;
    let name = team
        .get("name")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| CommishError::malformed(PROVIDER, format!("team {team_id} has no name")))?
        .to_string();
    let manager = team
        .get("managers")
        .map(collection)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|m| m.pointer("/manager/nickname").and_then(Value::as_str))
        .map(str::to_string)
        .next();

    let standing = team.get("team_standings").ok_or_else(|| {
        CommishError::malformed(PROVIDER, format!("team {team_id} has no team_standings"))
    })?;
    let outcome = standing.get("outcome_totals").ok_or_else(|| {
        CommishError::malformed(PROVIDER, format!("team {team_id} has no outcome_totals"))
    })?;
    let count = |field: &str| {
        outcome.get(field).and_then(as_u32).ok_or_else(|| {
            CommishError::malformed(PROVIDER, format!("team {team_id} has no {field} total"))
        })
    };
    let record = Record::new(count("wins")?, count("losses")?, count("ties")?);
    let points_for = standing
        .get("points_for")
        .and_then(as_points)
        .or_else(|| team.get("team_points").and_then(|p| p.get("total")).and_then(as_points))
        .ok_or_else(|| {
            CommishError::malformed(PROVIDER, format!("team {team_id} has no points_for"))
        })?;

    Ok(YahooTeamStanding {
        team_id,
        name,
        manager,
        rank: standing.get("rank").and_then(as_u32),
        record,
        points_for,
    })
}

/// Parse `league/{key}/scoreboard;week={w}`.
pub fn parse_scoreboard(payload: &Value) -> Result<Vec<YahooMatchup>> {
    let (_, resource) = league_parts(payload)?;
    let scoreboard = resource
        .get("scoreboard")
        .map(flatten)
        .ok_or_else(|| CommishError::malformed(PROVIDER, "missing scoreboard"))?;
    // The matchups collection sits under key "0" of the scoreboard object.
    let matchups = scoreboard
        .get("0")
        .and_then(|inner| inner.get("matchups"))
        .or_else(|| scoreboard.get("matchups"))
        .map(collection)
        .unwrap_or_default();

    matchups
        .into_iter()
        .map(|entry| {
            let matchup = entry
                .get("matchup")
                .ok_or_else(|| CommishError::malformed(PROVIDER, "scoreboard entry without matchup"))?;
            let status = matchup
                .get("status")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let teams = matchup
                .get("0")
                .and_then(|inner| inner.get("teams"))
                .map(collection)
                .unwrap_or_default();
            let sides = teams
                .into_iter()
                .map(|t| {
                    let team = t
                        .get("team")
                        .map(flatten)
                        .ok_or_else(|| CommishError::malformed(PROVIDER, "matchup side without team"))?;
                    let id = team.get("team_id").and_then(as_text).ok_or_else(|| {
                        CommishError::malformed(PROVIDER, "matchup side without team_id")
                    })?;
                    let points = team
                        .get("team_points")
                        .and_then(|p| p.get("total"))
                        .and_then(as_points);
                    match points {
                        Some(points) => Ok((id, points)),
                        // Unplayed matchups may omit the week total.
                        None if status == PREEVENT => Ok((id, 0.0)),
                        None => Err(CommishError::malformed(
                            PROVIDER,
                            format!("team {id} has no points in a {status} matchup"),
                        )),
                    }
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(YahooMatchup { status, sides })
        })
        .collect()
}

/// Merge Yahoo's arrays of single-key objects (nested arrays included) into one map.
fn flatten(value: &Value) -> Map<String, Value> {
    let mut out = Map::new();
    merge_into(value, &mut out);
    out
}

fn merge_into(value: &Value, out: &mut Map<String, Value>) {
    match value {
        Value::Array(items) => items.iter().for_each(|item| merge_into(item, out)),
        Value::Object(fields) => {
            for (k, v) in fields {
                out.insert(k.clone(), v.clone());
            }
        }
        _ => {}
    }
}

/// Values of a `{"0": .., "1": .., "count": n}` collection, in index order.
/// Some collections (`managers`) are plain arrays instead.
fn collection(value: &Value) -> Vec<&Value> {
    let fields = match value {
        Value::Object(fields) => fields,
        Value::Array(items) => return items.iter().collect(),
        _ => return Vec::new(),
    };
    let mut indexed: Vec<(usize, &Value)> = fields
        .iter()
        .filter_map(|(k, v)| k.parse::<usize>().ok().map(|i| (i, v)))
        .collect();
    indexed.sort_by_key(|(i, _)| *i);
    indexed.into_iter().map(|(_, v)| v).collect()
}

/// Yahoo sends most numbers as strings.
fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// A point total; Yahoo leaves it blank until the first game is scored.
fn as_points(value: &Value) -> Option<f64> {
    match value {
        Value::String(s) if s.trim().is_empty() => Some(0.0),
        other => as_f64(other),
    }
}

fn as_u32(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

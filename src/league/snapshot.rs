//! Provider-independent league snapshot for one completed scoring week.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;

use crate::{CommishError, LeagueId, Provider, Result, TeamId, Week};


/// Win/loss/tie totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub wins: u32,
    pub losses: u32,
    pub ties: u32,
}

impl Record {
    pub fn new(wins: u32, losses: u32, ties: u32) -> Self {
        Self { wins, losses, ties }
    }

    pub fn games(&self) -> u32 {
        self.wins + self.losses + self.ties
    }

    /// Ties count as half a win.
    pub fn win_pct(&self) -> f64 {
        match self.games() {
            0 => 0.0,
            games => (self.wins as f64 + 0.5 * self.ties as f64) / games as f64,
        }
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ties > 0 {
            write!(f, "{}-{}-{}", self.wins, self.losses, self.ties)
        } else {
            write!(f, "{}-{}", self.wins, self.losses)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    pub name: String,
    pub owner: String,
    pub record: Record,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Matchup {
    pub home_team_id: TeamId,
    pub away_team_id: TeamId,
    pub home_score: f64,
    pub away_score: f64,
    pub is_complete: bool,
}

impl Matchup {
    /// Winning team id, `None` for a tie or an unfinished game.
    pub fn winner(&self) -> Option<&TeamId> {
        if !self.is_complete {
            return None;
        }
        match self.home_score.partial_cmp(&self.away_score) {
            Some(Ordering::Greater) => Some(&self.home_team_id),
            Some(Ordering::Less) => Some(&self.away_team_id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamRank {
    pub team_id: TeamId,
    pub rank: u32,
    pub wins: u32,
    pub losses: u32,
    pub ties: u32,
    pub points_for: f64,
}

/// One team's season line before ranking.
#[derive(Debug, Clone, PartialEq)]
pub struct StandingLine {
    pub team_id: TeamId,
    pub record: Record,
    pub points_for: f64,
}

/// Rank teams by win percentage, then points for, then team id.
pub fn rank_by_record(mut lines: Vec<StandingLine>) -> Vec<TeamRank> {
    lines.sort_by(|a, b| {
        b.record
            .win_pct()
            .total_cmp(&a.record.win_pct())
            .then(b.points_for.total_cmp(&a.points_for))
            .then_with(|| a.team_id.cmp(&b.team_id))
    });

    lines
        .into_iter()
        .enumerate()
        .map(|(i, line)| TeamRank {
            team_id: line.team_id,
            rank: i as u32 + 1,
            wins: line.record.wins,
            losses: line.record.losses,
            ties: line.record.ties,
            points_for: line.points_for,
        })
        .collect()
}

/// Use the provider's own ranks when every team has a distinct positive one,
/// otherwise fall back to [`rank_by_record`].
pub fn rank_by_provider(lines: Vec<(Option<u32>, StandingLine)>) -> Vec<TeamRank> {
    let mut seen = HashSet::new();
    let complete = lines
        .iter()
        .all(|(rank, _)| rank.is_some_and(|r| r > 0 && seen.insert(r)));
    if !complete {
        return rank_by_record(lines.into_iter().map(|(_, line)| line).collect());
    }

    lines
        .into_iter()
        .map(|(rank, line)| TeamRank {
            team_id: line.team_id,
            rank: rank.unwrap_or_default(),
            wins: line.record.wins,
            losses: line.record.losses,
            ties: line.record.ties,
            points_for: line.points_for,
        })
        .collect()
}

/// Normalized results of one league for one completed scoring week.
///
/// Construct through [`LeagueSnapshot::new`], which enforces:
/// - team ids are unique
/// - every matchup references two distinct known teams
/// - standings hold exactly one entry per team
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeagueSnapshot {
    pub provider: Provider,
    pub league_id: LeagueId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub league_name: Option<String>,
    pub week: Week,
    pub teams: Vec<Team>,
    pub matchups: Vec<Matchup>,
    pub standings: Vec<TeamRank>,
}

impl LeagueSnapshot {
    pub fn new(
        provider: Provider,
        league_id: LeagueId,
        week: Week,
        teams: Vec<Team>,
        matchups: Vec<Matchup>,
        mut standings: Vec<TeamRank>,
    ) -> Result<Self> {
        standings.sort_by_key(|r| r.rank);
        let snapshot = Self {
            provider,
            league_id,
            league_name: None,
            week,
            teams,
            matchups,
            standings,
        };
        snapshot.validate()?;
        Ok(snapshot)
    }

    #[must_use]
    pub fn with_league_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.league_name = (!name.trim().is_empty()).then_some(name);
        self
    }

    /// Check the referential invariants; violations are upstream data problems.
    pub fn validate(&self) -> Result<()> {
        let bad = |reason: String| Err(CommishError::malformed(self.provider, reason));

        if self.teams.is_empty() {
            return bad("league has no teams".to_string());
        }

        let mut ids = HashSet::new();
        for team in &self.teams {
            if !ids.insert(&team.id) {
                return bad(format!("duplicate team id {}", team.id));
            }
        }

        for m in &self.matchups {
            for id in [&m.home_team_id, &m.away_team_id] {
                if !ids.contains(id) {
                    return bad(format!("matchup references unknown team {id}"));
                }
            }
            if m.home_team_id == m.away_team_id {
                return bad(format!("team {} is matched against itself", m.home_team_id));
            }
        }

        if self.standings.len() != self.teams.len() {
            return bad(format!(
                "standings list {} teams but the league has {}",
                self.standings.len(),
                self.teams.len()
            ));
        }
        let mut ranked = HashSet::new();
        for r in &self.standings {
            if !ids.contains(&r.team_id) || !ranked.insert(&r.team_id) {
                return bad(format!("standings entry for team {} is invalid", r.team_id));
            }
        }

        Ok(())
    }

    pub fn team(&self, id: &TeamId) -> Option<&Team> {
        self.teams.iter().find(|t| &t.id == id)
    }

    /// Highest single-team score of the week, if any matchups were played.
    pub fn top_score(&self) -> Option<(&TeamId, f64)> {
        self.matchups
            .iter()
            .flat_map(|m| {
                [
                    (&m.home_team_id, m.home_score),
                    (&m.away_team_id, m.away_score),
                ]
            })
            .max_by(|a, b| a.1.total_cmp(&b.1))
    }
}

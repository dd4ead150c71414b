//! Aggregation facade: raw user input in, one [`LeagueSnapshot`] out.

use reqwest::Client;
use tracing::{debug, info, instrument};

use super::{Adapter, EspnAdapter, SleeperAdapter, YahooAdapter};
use crate::{
    config::{Endpoints, YahooApp},
    core::RetryPolicy,
    league::{
        CredentialBundle, EspnCredentials, LeagueSnapshot, SleeperCredentials, YahooCredentials,
    },
    oauth::{TokenSession, TokenState},
    CommishError, LeagueId, Provider, Result, Season, Week,
};


/// Credential fields as the user supplied them. Which ones are required
/// depends on the provider.
#[derive(Debug, Clone, Default)]
pub struct RawCredentials {
    pub league_id: Option<String>,
    /// ESPN only; defaults to the current season.
    pub season: Option<Season>,
    pub espn_swid: Option<String>,
    pub espn_s2: Option<String>,
    /// Yahoo only; needed until the session holds a token.
    pub yahoo_auth_code: Option<String>,
    pub yahoo_session: Option<TokenSession>,
}

fn present<'a>(value: &'a Option<String>, field: &str) -> Result<&'a str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| CommishError::config(field))
}

/// Dispatches a provider tag to its adapter with the matching credential shape.
#[derive(Debug, Clone)]
pub struct Aggregator {
    http: Client,
    endpoints: Endpoints,
    retry: RetryPolicy,
    yahoo_app: Option<YahooApp>,
}

impl Aggregator {
    pub fn new(http: Client, endpoints: Endpoints) -> Self {
        Self {
            http,
            endpoints,
            retry: RetryPolicy::default(),
            yahoo_app: None,
        }
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_yahoo_app(mut self, app: Option<YahooApp>) -> Self {
        self.yahoo_app = app;
        self
    }

    pub fn adapter(&self, provider: Provider) -> Adapter {
        let http = self.http.clone();
        match provider {
            Provider::Espn => Adapter::Espn(
                EspnAdapter::new(http, &self.endpoints.espn).with_retry(self.retry),
            ),
            Provider::Yahoo => Adapter::Yahoo(
                YahooAdapter::new(http, &self.endpoints.yahoo_api).with_retry(self.retry),
            ),
            Provider::Sleeper => Adapter::Sleeper(
                SleeperAdapter::new(http, &self.endpoints.sleeper).with_retry(self.retry),
            ),
        }
    }

    /// Check that every field the provider needs is present. Makes no network calls.
    pub fn validate(&self, provider: Provider, raw: &RawCredentials) -> Result<()> {
        LeagueId::new(present(&raw.league_id, "league id")?)?;
        match provider {
            Provider::Espn => {
                present(&raw.espn_swid, "ESPN SWID cookie")?;
                present(&raw.espn_s2, "ESPN espn_s2 cookie")?;
            }
            Provider::Yahoo => {
                self.yahoo_app()?;
                let session = self.yahoo_session(raw)?;
                // A session busy elsewhere is already past the code stage.
                let needs_code = session
                    .try_lock()
                    .map(|tm| tm.state() == TokenState::Unauthenticated)
                    .unwrap_or(false);
                if needs_code {
                    present(&raw.yahoo_auth_code, "Yahoo authorization code")?;
                }
            }
            Provider::Sleeper => {}
        }
        Ok(())
    }

    fn yahoo_app(&self) -> Result<&YahooApp> {
        self.yahoo_app
            .as_ref()
            .ok_or_else(|| CommishError::config("Yahoo client id and secret"))
    }

    fn yahoo_session<'a>(&self, raw: &'a RawCredentials) -> Result<&'a TokenSession> {
        raw.yahoo_session
            .as_ref()
            .ok_or_else(|| CommishError::config("Yahoo token session"))
    }

    /// Build the provider-specific credential shape. For Yahoo this performs
    /// the one-time code exchange when the session has no token yet and
    /// writes the token files to the session's scratch directory.
    pub async fn credentials(
        &self,
        provider: Provider,
        raw: &RawCredentials,
    ) -> Result<CredentialBundle> {
        self.validate(provider, raw)?;
        let league_id = LeagueId::new(present(&raw.league_id, "league id")?)?;

        let bundle = match provider {
            Provider::Espn => CredentialBundle::Espn(EspnCredentials {
                league_id,
                season: raw.season.unwrap_or_default(),
                swid: present(&raw.espn_swid, "ESPN SWID cookie")?.to_string(),
                espn_s2: present(&raw.espn_s2, "ESPN espn_s2 cookie")?.to_string(),
            }),
            Provider::Yahoo => {
                let app = self.yahoo_app()?;
                let session = self.yahoo_session(raw)?;
                let mut tm = session.lock().await;
                if tm.state() == TokenState::Unauthenticated {
                    tm.submit_authorization_code(present(
                        &raw.yahoo_auth_code,
                        "Yahoo authorization code",
                    )?)?;
                    tm.exchange_for_token(app).await?;
                    let dir = tm.persist_to_scratch()?;
                    debug!(path = %dir.display(), "Yahoo token files written");
                }
                drop(tm);
                CredentialBundle::Yahoo(YahooCredentials {
                    league_id,
                    session: session.clone(),
                })
            }
            Provider::Sleeper => CredentialBundle::Sleeper(SleeperCredentials { league_id }),
        };
        Ok(bundle)
    }

    /// Validate, build credentials, and fetch one week from the selected provider.
    #[instrument(name = "aggregate.get_summary", skip_all, fields(%provider))]
    pub async fn get_summary(
        &self,
        provider: Provider,
        raw: &RawCredentials,
        week: Option<Week>,
    ) -> Result<LeagueSnapshot> {
        let bundle = self.credentials(provider, raw).await?;
        let snapshot = self.adapter(provider).fetch_league_summary(&bundle, week).await?;
        info!(
            league_id = %snapshot.league_id,
            week = %snapshot.week,
            teams = snapshot.teams.len(),
            matchups = snapshot.matchups.len(),
            "league summary fetched"
        );
        Ok(snapshot)
    }
}

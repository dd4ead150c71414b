//! Yahoo OAuth2 token lifecycle
//!
//! A [`TokenManager`] owns the authorization code, access token and refresh
//! token for one user session and walks them through
//! `Unauthenticated → CodeReceived → Valid ⇄ Expired → Cleared`.
//!
//! - the authorization code is exchanged at most once; a failed exchange
//!   drops back to `Unauthenticated` and is never retried
//! - an expired access token is refreshed exactly once before use; a failed
//!   refresh leaves the session `Unusable`
//! - [`TokenManager::clear`] wipes everything, including the scratch token
//!   files, and runs again on drop

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::{config::YahooApp, CommishError, Result};


/// Yahoo access tokens live for an hour unless the token endpoint says otherwise.
pub const DEFAULT_TOKEN_TTL_SECONDS: u64 = 3600;

/// Shared handle to one session's token manager. Holding the lock serializes Yahoo calls.
pub type TokenSession = Arc<Mutex<TokenManager>>;

/// Source of "now" in unix seconds.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> u64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default()
    }
}

/// Settable clock for tests and replays.
#[derive(Debug, Default)]
pub struct ManualClock(AtomicU64);

impl ManualClock {
    pub fn new(now: u64) -> Self {
        Self(AtomicU64::new(now))
    }

    pub fn set(&self, now: u64) {
        self.0.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, seconds: u64) {
        self.0.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Raw token material. Only the manager mutates it.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct TokenRecord {
    pub authorization_code: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub guid: Option<String>,
    pub issued_at: Option<u64>,
    pub ttl_seconds: u64,
}

impl TokenRecord {
    /// `now < issued_at + ttl`
    pub fn is_fresh(&self, now: u64) -> bool {
        match (self.access_token.as_ref(), self.issued_at) {
            (Some(_), Some(issued)) => now < issued.saturating_add(self.ttl_seconds),
            _ => false,
        }
    }
}

impl fmt::Debug for TokenRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let present = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("TokenRecord")
            .field("authorization_code", &present(&self.authorization_code))
            .field("access_token", &present(&self.access_token))
            .field("refresh_token", &present(&self.refresh_token))
            .field("issued_at", &self.issued_at)
            .field("ttl_seconds", &self.ttl_seconds)
            .finish()
    }
}

/// Externally visible session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    Unauthenticated,
    CodeReceived,
    Valid,
    Expired,
    /// A refresh failed; the user has to start over with a new code.
    Unusable,
    Cleared,
}

impl fmt::Display for TokenState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TokenState::Unauthenticated => "unauthenticated",
            TokenState::CodeReceived => "awaiting token exchange",
            TokenState::Valid => "authorized",
            TokenState::Expired => "expired",
            TokenState::Unusable => "unusable",
            TokenState::Cleared => "cleared",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Unauthenticated,
    CodeReceived,
    Authorized,
    Unusable,
    Cleared,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    xoauth_yahoo_guid: Option<String>,
}

/// Token file payload in the layout Yahoo client libraries read.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YahooTokenPayload {
    pub access_token: String,
    pub consumer_key: String,
    pub consumer_secret: String,
    pub guid: Option<String>,
    pub refresh_token: String,
    pub expires_in: u64,
    pub token_time: u64,
    pub token_type: String,
}

impl fmt::Debug for YahooTokenPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("YahooTokenPayload")
            .field("consumer_key", &self.consumer_key)
            .field("guid", &self.guid)
            .field("expires_in", &self.expires_in)
            .field("token_time", &self.token_time)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct PrivatePayload<'a> {
    consumer_key: &'a str,
    consumer_secret: &'a str,
}

/// Build the Yahoo consent page URL the user opens to obtain a code.
pub fn authorization_url(auth_endpoint: &str, app: &YahooApp) -> Result<String> {
    let mut url = Url::parse(auth_endpoint)
        .map_err(|e| CommishError::config(format!("Yahoo authorization endpoint: {e}")))?;
    url.query_pairs_mut()
        .append_pair("client_id", &app.consumer_key)
        .append_pair("redirect_uri", &app.redirect_uri)
        .append_pair("response_type", "code");
    Ok(url.into())
}

pub struct TokenManager {
    http: Client,
    token_url: String,
    clock: Arc<dyn Clock>,
    app: Option<YahooApp>,
    record: TokenRecord,
    phase: Phase,
    scratch: Option<TempDir>,
}

impl fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenManager")
            .field("token_url", &self.token_url)
            .field("state", &self.state())
            .field("record", &self.record)
            .finish_non_exhaustive()
    }
}

impl TokenManager {
    pub fn new(http: Client, token_url: impl Into<String>) -> Self {
        Self {
            http,
            token_url: token_url.into(),
            clock: Arc::new(SystemClock),
            app: None,
            record: TokenRecord {
                ttl_seconds: DEFAULT_TOKEN_TTL_SECONDS,
                ..TokenRecord::default()
            },
            phase: Phase::Unauthenticated,
            scratch: None,
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn into_session(self) -> TokenSession {
        Arc::new(Mutex::new(self))
    }

    pub fn state(&self) -> TokenState {
        match self.phase {
            Phase::Unauthenticated => TokenState::Unauthenticated,
            Phase::CodeReceived => TokenState::CodeReceived,
            Phase::Authorized if self.record.is_fresh(self.clock.now()) => TokenState::Valid,
            Phase::Authorized => TokenState::Expired,
            Phase::Unusable => TokenState::Unusable,
            Phase::Cleared => TokenState::Cleared,
        }
    }

    pub fn record(&self) -> &TokenRecord {
        &self.record
    }

    fn reject(&self, operation: &'static str) -> CommishError {
        CommishError::InvalidTokenTransition {
            operation,
            state: self.state().to_string(),
        }
    }

    /// Store the code the user pasted. Only accepted once per session.
    pub fn submit_authorization_code(&mut self, code: &str) -> Result<()> {
        if self.phase != Phase::Unauthenticated {
            return Err(self.reject("submit an authorization code"));
        }
        let code = code.trim();
        if code.is_empty() {
            return Err(CommishError::config("Yahoo authorization code"));
        }
        self.record.authorization_code = Some(code.to_string());
        self.phase = Phase::CodeReceived;
        debug!("authorization code received");
        Ok(())
    }

    /// Trade the stored code for tokens. Authorization codes are single-use,
    /// so a failure is final for that code.
    #[instrument(skip_all)]
    pub async fn exchange_for_token(&mut self, app: &YahooApp) -> Result<()> {
        if self.phase != Phase::CodeReceived {
            return Err(self.reject("exchange the authorization code"));
        }
        let code = self.record.authorization_code.take().unwrap_or_default();
        self.phase = Phase::Unauthenticated;

        let form = [
            ("redirect_uri", app.redirect_uri.as_str()),
            ("code", code.as_str()),
            ("grant_type", "authorization_code"),
        ];
        let token = self
            .post_token_form(app, &form)
            .await
            .map_err(|(status, detail)| CommishError::AuthExchangeFailed { status, detail })?;

        self.store(token);
        self.app = Some(app.clone());
        self.phase = Phase::Authorized;
        info!(ttl = self.record.ttl_seconds, "Yahoo access token acquired");
        Ok(())
    }

    /// Return a usable access token, refreshing it once if it has expired.
    pub async fn ensure_valid(&mut self) -> Result<String> {
        match self.state() {
            TokenState::Valid => {}
            TokenState::Expired => self.refresh().await?,
            TokenState::Unusable => {
                return Err(CommishError::TokenRefreshFailed {
                    status: None,
                    detail: "an earlier refresh failed".to_string(),
                })
            }
            _ => return Err(self.reject("use the Yahoo access token")),
        }
        self.record
            .access_token
            .clone()
            .ok_or_else(|| self.reject("use the Yahoo access token"))
    }

    #[instrument(skip_all)]
    async fn refresh(&mut self) -> Result<()> {
        let (Some(app), Some(refresh_token)) =
            (self.app.clone(), self.record.refresh_token.clone())
        else {
            self.poison();
            return Err(CommishError::TokenRefreshFailed {
                status: None,
                detail: "no refresh token was issued".to_string(),
            });
        };

        let form = [
            ("redirect_uri", app.redirect_uri.as_str()),
            ("refresh_token", refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ];
        match self.post_token_form(&app, &form).await {
            Ok(token) => {
                self.store(token);
                if self.scratch.is_some() {
                    self.persist_to_scratch()?;
                }
                info!("Yahoo access token refreshed");
                Ok(())
            }
            Err((status, detail)) => {
                warn!(?status, "Yahoo token refresh failed");
                self.poison();
                Err(CommishError::TokenRefreshFailed { status, detail })
            }
        }
    }

    async fn post_token_form(
        &self,
        app: &YahooApp,
        form: &[(&str, &str)],
    ) -> std::result::Result<TokenResponse, (Option<u16>, String)> {
        let response = self
            .http
            .post(&self.token_url)
            .basic_auth(&app.consumer_key, Some(&app.consumer_secret))
            .form(form)
            .send()
            .await
            .map_err(|e| (None, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err((Some(status.as_u16()), body.trim().chars().take(200).collect()));
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| (Some(status.as_u16()), format!("unreadable token response: {e}")))
    }

    fn store(&mut self, token: TokenResponse) {
        self.record.access_token = Some(token.access_token);
        if let Some(refresh) = token.refresh_token {
            self.record.refresh_token = Some(refresh);
        }
        if token.xoauth_yahoo_guid.is_some() {
            self.record.guid = token.xoauth_yahoo_guid;
        }
        self.record.ttl_seconds = token.expires_in.unwrap_or(DEFAULT_TOKEN_TTL_SECONDS);
        self.record.issued_at = Some(self.clock.now());
    }

    fn poison(&mut self) {
        self.wipe();
        self.phase = Phase::Unusable;
    }

    /// The token file payload for the current tokens.
    pub fn token_payload(&self) -> Result<YahooTokenPayload> {
        let (Some(app), Some(access), Some(issued)) = (
            self.app.as_ref(),
            self.record.access_token.as_ref(),
            self.record.issued_at,
        ) else {
            return Err(self.reject("export the Yahoo token"));
        };
        Ok(YahooTokenPayload {
            access_token: access.clone(),
            consumer_key: app.consumer_key.clone(),
            consumer_secret: app.consumer_secret.clone(),
            guid: self.record.guid.clone(),
            refresh_token: self.record.refresh_token.clone().unwrap_or_default(),
            expires_in: self.record.ttl_seconds,
            token_time: issued,
            token_type: "bearer".to_string(),
        })
    }

    /// Write `token.json` and `private.json` to a private scratch directory.
    ///
    /// The directory is removed by [`TokenManager::clear`].
    pub fn persist_to_scratch(&mut self) -> Result<PathBuf> {
        let payload = self.token_payload()?;
        if self.scratch.is_none() {
            self.scratch = Some(tempfile::Builder::new().prefix("commish-yahoo-").tempdir()?);
        }
        let dir = self
            .scratch
            .as_ref()
            .map(|d| d.path().to_path_buf())
            .ok_or_else(|| self.reject("persist the Yahoo token"))?;

        std::fs::write(dir.join("token.json"), serde_json::to_vec_pretty(&payload)?)?;
        let private = PrivatePayload {
            consumer_key: &payload.consumer_key,
            consumer_secret: &payload.consumer_secret,
        };
        std::fs::write(dir.join("private.json"), serde_json::to_vec_pretty(&private)?)?;
        debug!(path = %dir.display(), "Yahoo token persisted to scratch");
        Ok(dir)
    }

    pub fn scratch_dir(&self) -> Option<&Path> {
        self.scratch.as_ref().map(|d| d.path())
    }

    fn wipe(&mut self) {
        self.record = TokenRecord::default();
        self.app = None;
        if let Some(dir) = self.scratch.take() {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                warn!(path = %path.display(), error = %e, "failed to delete Yahoo token scratch dir");
            }
        }
    }

    /// Destroy all token material. Safe to call any number of times.
    pub fn clear(&mut self) {
        if self.phase != Phase::Cleared {
            debug!("clearing Yahoo token session");
        }
        self.wipe();
        self.phase = Phase::Cleared;
    }
}

impl Drop for TokenManager {
    fn drop(&mut self) {
        self.clear();
    }
}

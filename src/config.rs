//! Environment-driven configuration and upstream endpoints.

use crate::{CommishError, Result};

pub const OPENAI_API_KEY_ENV_VAR: &str = "OPENAI_API_KEY";
pub const OPENAI_MODEL_ENV_VAR: &str = "OPENAI_MODEL";
pub const YAHOO_CLIENT_ID_ENV_VAR: &str = "YAHOO_CLIENT_ID";
pub const YAHOO_CLIENT_SECRET_ENV_VAR: &str = "YAHOO_CLIENT_SECRET";
pub const YAHOO_REDIRECT_URI_ENV_VAR: &str = "YAHOO_REDIRECT_URI";
pub const MODERATION_ENV_VAR: &str = "COMMISH_MODERATION";

/// Fallbacks for the matching `recap` flags.
pub const LEAGUE_ID_ENV_VAR: &str = "COMMISH_LEAGUE_ID";
pub const ESPN_SWID_ENV_VAR: &str = "ESPN_SWID";
pub const ESPN_S2_ENV_VAR: &str = "ESPN_S2";

pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";
/// Out-of-band redirect: Yahoo shows the code to the user instead of redirecting.
pub const DEFAULT_YAHOO_REDIRECT_URI: &str = "oob";

/// Base URLs for every upstream the pipeline talks to.
///
/// Defaults point at production; tests swap in mock server URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub espn: String,
    pub yahoo_api: String,
    pub yahoo_auth: String,
    pub yahoo_token: String,
    pub sleeper: String,
    pub openai: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            espn: "https://lm-api-reads.fantasy.espn.com/apis/v3/games/ffl".to_string(),
            yahoo_api: "https://fantasysports.yahooapis.com/fantasy/v2".to_string(),
            yahoo_auth: "https://api.login.yahoo.com/oauth2/request_auth".to_string(),
            yahoo_token: "https://api.login.yahoo.com/oauth2/get_token".to_string(),
            sleeper: "https://api.sleeper.app/v1".to_string(),
            openai: "https://api.openai.com/v1".to_string(),
        }
    }
}

impl Endpoints {
    /// Point every upstream at one base URL, with each provider under its own path.
    pub fn with_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            espn: format!("{base}/espn"),
            yahoo_api: format!("{base}/yahoo/fantasy/v2"),
            yahoo_auth: format!("{base}/yahoo/oauth2/request_auth"),
            yahoo_token: format!("{base}/yahoo/oauth2/get_token"),
            sleeper: format!("{base}/sleeper/v1"),
            openai: format!("{base}/openai/v1"),
        }
    }
}

/// Yahoo developer-app credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct YahooApp {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub redirect_uri: String,
}

impl std::fmt::Debug for YahooApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YahooApp")
            .field("consumer_key", &self.consumer_key)
            .field("consumer_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .finish()
    }
}

impl YahooApp {
    /// Fails with a configuration error when either half of the key pair is blank.
    pub fn new(
        consumer_key: impl Into<String>,
        consumer_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Result<Self> {
        let app = Self {
            consumer_key: consumer_key.into(),
            consumer_secret: consumer_secret.into(),
            redirect_uri: redirect_uri.into(),
        };
        if app.consumer_key.trim().is_empty() {
            return Err(CommishError::config(YAHOO_CLIENT_ID_ENV_VAR));
        }
        if app.consumer_secret.trim().is_empty() {
            return Err(CommishError::config(YAHOO_CLIENT_SECRET_ENV_VAR));
        }
        if app.redirect_uri.trim().is_empty() {
            return Err(CommishError::config(YAHOO_REDIRECT_URI_ENV_VAR));
        }
        Ok(app)
    }
}

/// Process-level settings read once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub yahoo_app: Option<YahooApp>,
    pub moderation: bool,
    pub endpoints: Endpoints,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let yahoo_app = match (
            get(YAHOO_CLIENT_ID_ENV_VAR),
            get(YAHOO_CLIENT_SECRET_ENV_VAR),
        ) {
            (Some(key), Some(secret)) => Some(YahooApp {
                consumer_key: key,
                consumer_secret: secret,
                redirect_uri: get(YAHOO_REDIRECT_URI_ENV_VAR)
                    .unwrap_or_else(|| DEFAULT_YAHOO_REDIRECT_URI.to_string()),
            }),
            _ => None,
        };

        Self {
            openai_api_key: get(OPENAI_API_KEY_ENV_VAR),
            openai_model: get(OPENAI_MODEL_ENV_VAR)
                .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            yahoo_app,
            moderation: get(MODERATION_ENV_VAR)
                .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
            endpoints: Endpoints::default(),
        }
    }

    pub fn require_openai_api_key(&self) -> Result<&str> {
        self.openai_api_key
            .as_deref()
            .ok_or_else(|| CommishError::config(OPENAI_API_KEY_ENV_VAR))
    }

    pub fn require_yahoo_app(&self) -> Result<&YahooApp> {
        self.yahoo_app.as_ref().ok_or_else(|| {
            CommishError::config(format!(
                "{YAHOO_CLIENT_ID_ENV_VAR} and {YAHOO_CLIENT_SECRET_ENV_VAR}"
            ))
        })
    }
}

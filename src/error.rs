//! Error types for the commish league recap pipeline

use thiserror::Error;

use crate::cli::types::Provider;


pub type Result<T> = std::result::Result<T, CommishError>;

/// Coarse classification of a [`CommishError`], stable for matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    AuthFailed,
    NotFound,
    UpstreamUnavailable,
    MalformedResponse,
    AuthExchangeFailed,
    TokenRefreshFailed,
    InvalidTokenTransition,
    ContentRejected,
    GenerationFailed,
    Cancelled,
    Internal,
}

#[derive(Error, Debug)]
pub enum CommishError {
    #[error("Missing or invalid configuration: {field}")]
    Configuration { field: String },

    #[error("{provider} rejected the supplied credentials")]
    AuthFailed { provider: Provider },

    #[error("{provider} could not find {what}")]
    NotFound { provider: Provider, what: String },

    #[error("{provider} is unavailable{}: {message}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    UpstreamUnavailable {
        provider: Provider,
        status: Option<u16>,
        message: String,
    },

    #[error("{provider} returned an unusable response: {reason}")]
    MalformedResponse { provider: Provider, reason: String },

    #[error("Yahoo authorization code exchange failed{}: {detail}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    AuthExchangeFailed { status: Option<u16>, detail: String },

    #[error("Yahoo token refresh failed{}: {detail}; please re-authenticate", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    TokenRefreshFailed { status: Option<u16>, detail: String },

    #[error("Cannot {operation} while the Yahoo session is {state}")]
    InvalidTokenTransition {
        operation: &'static str,
        state: String,
    },

    #[error("The persona description was rejected by content moderation")]
    ContentRejected,

    #[error("Narrative generation failed: {message}")]
    GenerationFailed { message: String },

    #[error("Recap cancelled")]
    Cancelled,

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),
}

impl CommishError {
    /// Shorthand for a missing/invalid configuration field.
    pub fn config(field: impl Into<String>) -> Self {
        CommishError::Configuration {
            field: field.into(),
        }
    }

    pub fn malformed(provider: Provider, reason: impl Into<String>) -> Self {
        CommishError::MalformedResponse {
            provider,
            reason: reason.into(),
        }
    }

    pub fn generation(message: impl Into<String>) -> Self {
        CommishError::GenerationFailed {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CommishError::Configuration { .. } => ErrorKind::Configuration,
            CommishError::AuthFailed { .. } => ErrorKind::AuthFailed,
            CommishError::NotFound { .. } => ErrorKind::NotFound,
            CommishError::UpstreamUnavailable { .. } => ErrorKind::UpstreamUnavailable,
            CommishError::MalformedResponse { .. } => ErrorKind::MalformedResponse,
            CommishError::AuthExchangeFailed { .. } => ErrorKind::AuthExchangeFailed,
            CommishError::TokenRefreshFailed { .. } => ErrorKind::TokenRefreshFailed,
            CommishError::InvalidTokenTransition { .. } => ErrorKind::InvalidTokenTransition,
            CommishError::ContentRejected => ErrorKind::ContentRejected,
            CommishError::GenerationFailed { .. } => ErrorKind::GenerationFailed,
            CommishError::Cancelled => ErrorKind::Cancelled,
            CommishError::Json(_) | CommishError::Io(_) | CommishError::InvalidHeader(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Only transient upstream failures (5xx or no response at all) earn the single retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            CommishError::UpstreamUnavailable { status, .. } => {
                status.map_or(true, |s| (500..600).contains(&s))
            }
            _ => false,
        }
    }
}

//! HTTP utilities shared by the provider adapters

use std::time::Duration;

use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, COOKIE},
    Client, RequestBuilder, StatusCode,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::{CommishError, Provider, Result};

pub const USER_AGENT: &str = concat!("commish/", env!("CARGO_PKG_VERSION"));

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Longest silence tolerated between two reads of a streamed body.
pub const STREAM_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Build the shared HTTP client. Every request must finish within 30 seconds.
pub fn build_client() -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| CommishError::config(format!("HTTP client: {e}")))
}

/// Build the client for streamed model output.
pub fn build_streaming_client() -> Result<Client> {
    streaming_client(CONNECT_TIMEOUT, STREAM_IDLE_TIMEOUT)
}

/// A client bounded by connect time and by the gap between reads, never by
/// the length of the whole body.
pub fn streaming_client(connect: Duration, idle: Duration) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(connect)
        .read_timeout(idle)
        .build()
        .map_err(|e| CommishError::config(format!("HTTP client: {e}")))
}

/// Build cookie headers from the `SWID` and `espn_s2` session values.
pub fn espn_cookie_header_map(swid: &str, espn_s2: &str) -> Result<HeaderMap> {
    let mut h = HeaderMap::new();
    h.insert(ACCEPT, HeaderValue::from_static("application/json"));
    let cookie = format!("SWID={}; espn_s2={}", swid.trim(), espn_s2.trim());
    let mut value = HeaderValue::from_str(&cookie)?;
    value.set_sensitive(true);
    h.insert(COOKIE, value);
    Ok(h)
}

/// How transient failures are retried. Only 5xx and network errors qualify.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            backoff: Duration::ZERO,
        }
    }

    /// One retry without waiting, for tests against mock servers.
    pub fn immediate() -> Self {
        Self {
            max_retries: 1,
            backoff: Duration::ZERO,
        }
    }
}

/// Map a non-success status to the error taxonomy.
pub fn classify_status(provider: Provider, status: StatusCode, body: &str) -> CommishError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => CommishError::AuthFailed { provider },
        StatusCode::NOT_FOUND => CommishError::NotFound {
            provider,
            what: "the requested league".to_string(),
        },
        _ => CommishError::UpstreamUnavailable {
            provider,
            status: Some(status.as_u16()),
            message: summarize_body(status, body),
        },
    }
}

fn summarize_body(status: StatusCode, body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        status.canonical_reason().unwrap_or("no body").to_string()
    } else {
        body.chars().take(200).collect()
    }
}

/// Send a GET-style request and parse the JSON body, retrying transient failures.
pub async fn get_json(
    provider: Provider,
    request: RequestBuilder,
    policy: RetryPolicy,
) -> Result<Value> {
    let mut attempt = 0;
    loop {
        let req = request
            .try_clone()
            .ok_or_else(|| CommishError::config("request body is not replayable"))?;

        match send_once(provider, req).await {
            Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                attempt += 1;
                warn!(%provider, attempt, error = %e, "transient upstream failure, retrying");
                tokio::time::sleep(policy.backoff * attempt).await;
            }
            other => return other,
        }
    }
}

async fn send_once(provider: Provider, req: RequestBuilder) -> Result<Value> {
    let network = |e: reqwest::Error| CommishError::UpstreamUnavailable {
        provider,
        status: None,
        message: e.to_string(),
    };

    let response = req.send().await.map_err(network)?;
    let status = response.status();
    debug!(%provider, url = %response.url(), %status, "upstream response");

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(classify_status(provider, status, &body));
    }

    let bytes = response.bytes().await.map_err(network)?;
    serde_json::from_slice(&bytes)
        .map_err(|e| CommishError::malformed(provider, format!("invalid JSON: {e}")))
}

/// Deserialize a provider payload, reporting shape mismatches as malformed responses.
pub fn decode<T: DeserializeOwned>(provider: Provider, value: Value, what: &str) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| CommishError::malformed(provider, format!("{what}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;
    use wiremock::{
        matchers::{header, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    #[test]
    fn test_espn_cookie_header_map() {
        let headers = espn_cookie_header_map("{ABC-123}", " s2value ").unwrap();

        assert!(headers.contains_key(ACCEPT));
        let cookie = headers.get(COOKIE).unwrap();
        assert!(cookie.is_sensitive());
        assert_eq!(cookie.to_str().unwrap(), "SWID={ABC-123}; espn_s2=s2value");
    }

    #[test]
    fn test_espn_cookie_header_map_rejects_control_chars() {
        let result = espn_cookie_header_map("bad\nswid", "s2");
        assert!(matches!(result, Err(CommishError::InvalidHeader(_))));
    }

    #[test]
    fn test_classify_status() {
        let p = Provider::Espn;
        assert_eq!(
            classify_status(p, StatusCode::UNAUTHORIZED, "").kind(),
            ErrorKind::AuthFailed
        );
        assert_eq!(
            classify_status(p, StatusCode::FORBIDDEN, "").kind(),
            ErrorKind::AuthFailed
        );
        assert_eq!(
            classify_status(p, StatusCode::NOT_FOUND, "").kind(),
            ErrorKind::NotFound
        );

        let unavailable = classify_status(p, StatusCode::BAD_GATEWAY, "");
        assert_eq!(unavailable.kind(), ErrorKind::UpstreamUnavailable);
        assert!(unavailable.is_retryable());

        let throttled = classify_status(p, StatusCode::TOO_MANY_REQUESTS, "slow down");
        assert_eq!(throttled.kind(), ErrorKind::UpstreamUnavailable);
        assert!(!throttled.is_retryable());
    }

    #[tokio::test]
    async fn test_get_json_success() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/league"))
            .and(header("accept", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = build_client().unwrap();
        let request = client
            .get(format!("{}/league", mock_server.uri()))
            .header(ACCEPT, "application/json");

        let value = get_json(Provider::Sleeper, request, RetryPolicy::immediate())
            .await
            .unwrap();
        assert_eq!(value["ok"], true);
    }

    #[tokio::test]
    async fn test_get_json_retries_once_on_server_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/league"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/league"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = build_client().unwrap();
        let request = client.get(format!("{}/league", mock_server.uri()));

        let value = get_json(Provider::Sleeper, request, RetryPolicy::immediate())
            .await
            .unwrap();
        assert_eq!(value["ok"], true);
    }

    #[tokio::test]
    async fn test_get_json_retry_is_capped_at_one() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/league"))
            .respond_with(ResponseTemplate::new(500))
            .expect(2)
            .mount(&mock_server)
            .await;

        let client = build_client().unwrap();
        let request = client.get(format!("{}/league", mock_server.uri()));

        let err = get_json(Provider::Espn, request, RetryPolicy::immediate())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UpstreamUnavailable);
    }

    #[tokio::test]
    async fn test_get_json_does_not_retry_client_errors() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/league"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = build_client().unwrap();
        let request = client.get(format!("{}/league", mock_server.uri()));

        let err = get_json(Provider::Espn, request, RetryPolicy::immediate())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthFailed);
    }

    #[tokio::test]
    async fn test_get_json_reports_invalid_json_as_malformed() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/league"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>nope</html>"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = build_client().unwrap();
        let request = client.get(format!("{}/league", mock_server.uri()));

        let err = get_json(Provider::Sleeper, request, RetryPolicy::immediate())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedResponse);
    }

    #[tokio::test]
    async fn test_get_json_network_failure_is_unavailable() {
        let client = build_client().unwrap();
        // Port 9 (discard) on localhost is not listening in test environments.
        let request = client.get("http://127.0.0.1:9/league");

        let err = get_json(Provider::Sleeper, request, RetryPolicy::none())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UpstreamUnavailable);
        assert!(err.is_retryable());
    }
}

//! Optional screening of the persona description before narration.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::{CommishError, Result};

/// Classification gate for user-supplied persona text.
#[async_trait]
pub trait ContentModerator: Send + Sync {
    /// `Ok(false)` means the text must not reach the model.
    async fn is_acceptable(&self, text: &str) -> Result<bool>;
}

/// Accepts everything. Used when moderation is switched off.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

#[async_trait]
impl ContentModerator for AllowAll {
    async fn is_acceptable(&self, _text: &str) -> Result<bool> {
        Ok(true)
    }
}

#[derive(Serialize)]
struct ModerationRequest<'a> {
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct ModerationResponse {
    results: Vec<ModerationResult>,
}

#[derive(Debug, Deserialize)]
struct ModerationResult {
    flagged: bool,
}

/// OpenAI moderation endpoint (`POST {base}/moderations`).
#[derive(Debug, Clone)]
pub struct OpenAiModerator {
    http: Client,
    base_url: String,
    api_key: String,
}

impl OpenAiModerator {
    pub fn new(http: Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl ContentModerator for OpenAiModerator {
    #[instrument(name = "moderation.is_acceptable", skip_all)]
    async fn is_acceptable(&self, text: &str) -> Result<bool> {
        let url = format!("{}/moderations", self.base_url.trim_end_matches('/'));
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&ModerationRequest { input: text })
            .send()
            .await
            .map_err(|e| CommishError::generation(format!("moderation request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, "moderation endpoint returned an error");
            return Err(CommishError::generation(format!(
                "moderation returned HTTP {}: {}",
                status.as_u16(),
                body.trim().chars().take(200).collect::<String>()
            )));
        }

        let parsed: ModerationResponse = response
            .json()
            .await
            .map_err(|e| CommishError::generation(format!("unreadable moderation response: {e}")))?;
        let flagged = parsed.results.iter().any(|r| r.flagged);
        debug!(flagged, "persona moderated");
        Ok(!flagged)
    }
}

/// Fail with `ContentRejected` when the moderator refuses the text.
pub async fn screen(moderator: &dyn ContentModerator, text: &str) -> Result<()> {
    if moderator.is_acceptable(text).await? {
        Ok(())
    } else {
        Err(CommishError::ContentRejected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;
    use wiremock::{
        matchers::{body_json, header, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    async fn moderator(server: &MockServer, flagged: bool, calls: u64) -> OpenAiModerator {
        Mock::given(method("POST"))
            .and(path("/v1/moderations"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_json(json!({"input": "a calm analyst"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "modr-1",
                "model": "omni-moderation-latest",
                "results": [{"flagged": flagged, "categories": {"harassment": flagged}}]
            })))
            .expect(calls)
            .mount(server)
            .await;
        OpenAiModerator::new(Client::new(), format!("{}/v1", server.uri()), "sk-test")
    }

    #[tokio::test]
    async fn test_unflagged_text_is_acceptable() {
        let server = MockServer::start().await;
        let m = moderator(&server, false, 2).await;

        assert!(m.is_acceptable("a calm analyst").await.unwrap());
        screen(&m, "a calm analyst").await.unwrap();
    }

    #[tokio::test]
    async fn test_flagged_text_is_rejected() {
        let server = MockServer::start().await;
        let m = moderator(&server, true, 1).await;

        let err = screen(&m, "a calm analyst").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ContentRejected);
    }

    #[tokio::test]
    async fn test_moderation_outage_is_an_error_not_a_pass() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/moderations"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        let m = OpenAiModerator::new(Client::new(), format!("{}/v1", server.uri()), "sk-test");

        assert!(m.is_acceptable("anything").await.is_err());
    }

    #[tokio::test]
    async fn test_allow_all() {
        assert!(AllowAll.is_acceptable("literally anything").await.unwrap());
    }
}

//! HTTP collaborator for the session controller.
//!
//! The server is opaque JSON over three endpoints: `GET block/{slug}`,
//! `GET session/{id}/next_round` and `POST result`. The [`ApiClient`] trait
//! is the seam the controller is generic over; tests drive it with fakes
//! and [`HttpApiClient`] against a mock server.

use serde::Deserialize;
use url::Url;

use crate::action::Action;
use crate::error::{CoreError, Result};
use crate::result::ResultSubmission;
use crate::session::Block;

/// The opaque HTTP collaborator the session controller depends on.
#[allow(async_fn_in_trait)]
pub trait ApiClient: Send + Sync {
    /// `GET block/{slug}`. Absence or a malformed response is
    /// [`CoreError::BlockNotFound`].
    async fn get_block(&self, slug: &str) -> Result<Block>;

    /// `GET session/{id}/next_round`. A transport error or an empty round
    /// is [`CoreError::RoundUnavailable`].
    async fn next_round(&self, session_id: i64) -> Result<Vec<Action>>;

    /// `POST result`. Non-2xx is an error the caller logs and swallows.
    async fn post_result(&self, submission: &ResultSubmission) -> Result<bool>;
}

#[derive(Debug, Deserialize)]
struct NextRoundPayload {
    #[serde(default)]
    next_round: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct PostResultPayload {
    #[serde(default)]
    success: bool,
}

/// reqwest-backed [`ApiClient`].
#[derive(Debug, Clone)]
pub struct HttpApiClient {
    http: reqwest::Client,
    base: Url,
}

impl HttpApiClient {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self> {
        let mut base = Url::parse(base_url)
            .map_err(|e| CoreError::Custom(format!("Invalid API base url '{base_url}': {e}")))?;
        // Url::join treats the last path segment as a file unless the base
        // ends with a slash.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self { http, base })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .map_err(|e| CoreError::Custom(format!("Invalid API path '{path}': {e}")))
    }
}

impl ApiClient for HttpApiClient {
    async fn get_block(&self, slug: &str) -> Result<Block> {
        let url = self.endpoint(&format!("block/{slug}/"))?;
        let response = self.http.get(url).send().await?;
        if !response.status().is_success() {
            return Err(CoreError::BlockNotFound { slug: slug.into() });
        }
        response
            .json::<Block>()
            .await
            .map_err(|_| CoreError::BlockNotFound { slug: slug.into() })
    }

    async fn next_round(&self, session_id: i64) -> Result<Vec<Action>> {
        let url = self.endpoint(&format!("session/{session_id}/next_round/"))?;
        let response = self
            .http
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| CoreError::RoundUnavailable {
                reason: e.to_string(),
            })?;
        let payload = response
            .json::<NextRoundPayload>()
            .await
            .map_err(|e| CoreError::RoundUnavailable {
                reason: e.to_string(),
            })?;

        if payload.next_round.is_empty() {
            return Err(CoreError::RoundUnavailable {
                reason: "server returned no actions".into(),
            });
        }
        Ok(payload
            .next_round
            .into_iter()
            .map(Action::from_value)
            .collect())
    }

    async fn post_result(&self, submission: &ResultSubmission) -> Result<bool> {
        let url = self.endpoint("result/")?;
        let response = self.http.post(url).json(submission).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CoreError::ResultSubmissionFailed {
                reason: format!("server answered {status}"),
            });
        }
        let payload = response
            .json::<PostResultPayload>()
            .await
            .unwrap_or(PostResultPayload { success: true });
        Ok(payload.success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::TrialConfig;
    use serde_json::json;

    fn client(server: &mockito::ServerGuard) -> HttpApiClient {
        HttpApiClient::new(&server.url(), 5).unwrap()
    }

    #[tokio::test]
    async fn get_block_parses_payload() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/block/test/")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "id": 7,
                    "slug": "test",
                    "session_id": 42,
                    "playlists": [{"id": 1, "name": "baseline"}],
                })
                .to_string(),
            )
            .create_async()
            .await;

        let block = client(&server).get_block("test").await.unwrap();
        assert_eq!(block.slug, "test");
        assert_eq!(block.session_id, Some(42));
        assert_eq!(block.playlists.len(), 1);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn missing_block_is_block_not_found() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/block/nope/")
            .with_status(404)
            .create_async()
            .await;

        let err = client(&server).get_block("nope").await.unwrap_err();
        assert!(matches!(err, CoreError::BlockNotFound { slug } if slug == "nope"));
    }

    #[tokio::test]
    async fn malformed_block_is_block_not_found() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/block/broken/")
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let err = client(&server).get_block("broken").await.unwrap_err();
        assert!(matches!(err, CoreError::BlockNotFound { .. }));
    }

    #[tokio::test]
    async fn next_round_parses_actions() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/session/42/next_round/")
            .with_status(200)
            .with_body(
                json!({
                    "next_round": [
                        {"view": "EXPLAINER", "instruction": "Instruction"},
                        {"view": "UNHEARD_OF"},
                    ],
                })
                .to_string(),
            )
            .create_async()
            .await;

        let actions = client(&server).next_round(42).await.unwrap();
        assert_eq!(actions.len(), 2);
        assert!(matches!(actions[0], Action::Explainer { .. }));
        // Unknown discriminants become synthesized error actions instead of
        // failing the whole round.
        assert!(matches!(&actions[1], Action::Error { error_text } if error_text.contains("UNHEARD_OF")));
    }

    #[tokio::test]
    async fn empty_round_is_round_unavailable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/session/1/next_round/")
            .with_status(200)
            .with_body(json!({"next_round": []}).to_string())
            .create_async()
            .await;

        let err = client(&server).next_round(1).await.unwrap_err();
        assert!(matches!(err, CoreError::RoundUnavailable { .. }));
    }

    #[tokio::test]
    async fn server_error_is_round_unavailable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/session/1/next_round/")
            .with_status(500)
            .create_async()
            .await;

        let err = client(&server).next_round(1).await.unwrap_err();
        assert!(matches!(err, CoreError::RoundUnavailable { .. }));
    }

    #[tokio::test]
    async fn post_result_reports_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/result/")
            .with_status(200)
            .with_body(json!({"success": true}).to_string())
            .create_async()
            .await;

        let submission = ResultSubmission {
            session: 42,
            decision_time: 1.2,
            audio_latency_ms: 25.0,
            form: Vec::new(),
            config: serde_json::to_value(TrialConfig::default()).unwrap(),
        };
        let ok = client(&server).post_result(&submission).await.unwrap();
        assert!(ok);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn failed_post_is_result_submission_failed() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/result/")
            .with_status(500)
            .create_async()
            .await;

        let submission = ResultSubmission {
            session: 42,
            decision_time: 0.0,
            audio_latency_ms: 0.0,
            form: Vec::new(),
            config: serde_json::Value::Null,
        };
        let err = client(&server).post_result(&submission).await.unwrap_err();
        assert!(matches!(err, CoreError::ResultSubmissionFailed { .. }));
    }
}

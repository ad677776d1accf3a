//! HTTP implementation of [`RemoteBackend`] over the MathStarz REST API.
use async_trait::async_trait;
use mathstarz_game::sync::{
    PUZZLES_UPDATE_PATH, PUZZLES_USER_PATH, QUESTIONS_PATH, USERS_PATH, USERS_UPDATE_PATH,
};
use mathstarz_game::{PuzzleProgress, QuestionData, UserId, UserRecord};
use serde::de::DeserializeOwned;

use crate::backend::{RemoteBackend, SyncError};
use crate::config::ClientConfig;

pub struct HttpBackend {
    base_url: String,
    http: reqwest::Client,
}

impl HttpBackend {
    /// Build a client with the configured base URL and request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be constructed.
    pub fn new(config: &ClientConfig) -> Result<Self, SyncError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .user_agent(concat!("mathstarz-client/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            base_url: config.base_url().to_string(),
            http,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn read_body(
        response: reqwest::Response,
        endpoint: &str,
    ) -> Result<String, SyncError> {
        let status = response.status();
        if !status.is_success() {
            log::warn!("{endpoint} failed with HTTP {status}");
            return Err(SyncError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.text().await?)
    }

    fn decode<T>(endpoint: &str, raw: String) -> Result<T, SyncError>
    where
        T: DeserializeOwned,
    {
        serde_json::from_str(&raw).map_err(|source| Self::decode_error(endpoint, raw, source))
    }

    fn decode_error(endpoint: &str, raw: String, source: serde_json::Error) -> SyncError {
        log::warn!("Failed to parse response from {endpoint}: {source}; raw: {raw}");
        SyncError::Decode {
            endpoint: endpoint.to_string(),
            raw,
            source,
        }
    }

    async fn post_json<T>(&self, endpoint: &str, body: &T) -> Result<(), SyncError>
    where
        T: serde::Serialize + Sync,
    {
        let response = self.http.post(self.url(endpoint)).json(body).send().await?;
        Self::read_body(response, endpoint).await?;
        Ok(())
    }
}

#[async_trait]
impl RemoteBackend for HttpBackend {
    async fn pull_all_puzzles(&self, user_id: UserId) -> Result<Vec<PuzzleProgress>, SyncError> {
        log::debug!("Pulling puzzles for user {user_id}");
        let response = self
            .http
            .get(self.url(PUZZLES_USER_PATH))
            .query(&[("userId", user_id.to_string())])
            .send()
            .await?;
        let raw = Self::read_body(response, PUZZLES_USER_PATH).await?;
        PuzzleProgress::parse_list(&raw)
            .map_err(|source| Self::decode_error(PUZZLES_USER_PATH, raw, source))
    }

    async fn push_puzzle_delta(&self, progress: &PuzzleProgress) -> Result<(), SyncError> {
        self.post_json(PUZZLES_UPDATE_PATH, progress).await?;
        log::debug!(
            "Puzzle {} synced with {} pieces",
            progress.key(),
            progress.pieces_collected
        );
        Ok(())
    }

    async fn push_score_update(&self, user: &UserRecord) -> Result<(), SyncError> {
        self.post_json(USERS_UPDATE_PATH, user).await?;
        log::debug!("Score for user {} synced: {}", user.id, user.total_points);
        Ok(())
    }

    async fn fetch_question(&self, question_id: &str) -> Result<QuestionData, SyncError> {
        let endpoint = format!("{QUESTIONS_PATH}/{question_id}");
        let response = self.http.get(self.url(&endpoint)).send().await?;
        let raw = Self::read_body(response, &endpoint).await?;
        Ok(QuestionData::from_json(&raw)?)
    }

    async fn fetch_user(&self, user_id: UserId) -> Result<UserRecord, SyncError> {
        let response = self
            .http
            .get(self.url(USERS_PATH))
            .query(&[("id", user_id.to_string())])
            .send()
            .await?;
        let raw = Self::read_body(response, USERS_PATH).await?;
        Self::decode(USERS_PATH, raw)
    }
}

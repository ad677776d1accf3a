//! Remote sync seam between the session runtime and the backend.
use async_trait::async_trait;
use mathstarz_game::{
    PuzzleProgress, QuestionData, QuestionError, SyncRequest, UserId, UserRecord,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("{endpoint} returned HTTP {status}")]
    Status { endpoint: String, status: u16 },
    #[error("unexpected payload from {endpoint}: {source}; raw: {raw}")]
    Decode {
        endpoint: String,
        raw: String,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Question(#[from] QuestionError),
}

/// Best-effort access to the backend. Implementations never retry.
#[async_trait]
pub trait RemoteBackend: Send + Sync {
    /// Every puzzle record the server holds for `user_id`.
    async fn pull_all_puzzles(&self, user_id: UserId) -> Result<Vec<PuzzleProgress>, SyncError>;

    async fn push_puzzle_delta(&self, progress: &PuzzleProgress) -> Result<(), SyncError>;

    /// Upload the full user record.
    async fn push_score_update(&self, user: &UserRecord) -> Result<(), SyncError>;

    async fn fetch_question(&self, question_id: &str) -> Result<QuestionData, SyncError>;

    async fn fetch_user(&self, user_id: UserId) -> Result<UserRecord, SyncError>;

    /// Dispatch a queued outbox request to its endpoint.
    async fn push(&self, request: &SyncRequest) -> Result<(), SyncError> {
        match request {
            SyncRequest::PuzzleDelta(progress) => self.push_puzzle_delta(progress).await,
            SyncRequest::ScoreUpdate(user) => self.push_score_update(user).await,
        }
    }
}

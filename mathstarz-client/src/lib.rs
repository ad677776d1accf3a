//! Platform layer for MathStarz.
//!
//! Provides concrete implementations of the mathstarz-game traits
//! (file-backed progress storage, disk asset loading), the HTTP remote sync
//! client, and an async runtime that keeps network traffic off the
//! interaction path.

pub mod assets;
pub mod backend;
pub mod config;
pub mod http;
pub mod runtime;
pub mod storage;

pub use assets::{AssetError, FileWorldLoader};
pub use backend::{RemoteBackend, SyncError};
pub use config::{ClientConfig, ConfigError};
pub use http::HttpBackend;
pub use runtime::{QuestionLoad, RuntimeError, SessionRuntime};
pub use storage::{FileProgressStorage, StorageError};

use anyhow::Context;
use mathstarz_game::{ProgressEngine, UserId};
use std::sync::Arc;

/// Create an engine backed by the configured data directory
#[must_use]
pub fn create_engine(
    config: &ClientConfig,
) -> ProgressEngine<FileWorldLoader, FileProgressStorage> {
    ProgressEngine::new(
        FileWorldLoader::new(),
        FileProgressStorage::new(config.data_dir.clone()),
    )
}

/// Fetch the user record and start a live session runtime for it.
///
/// # Errors
///
/// Returns an error if the user cannot be fetched or the local session
/// cannot be started.
pub async fn login(
    config: &ClientConfig,
    user_id: UserId,
) -> anyhow::Result<SessionRuntime<FileProgressStorage, HttpBackend>> {
    let backend = Arc::new(HttpBackend::new(config).context("building HTTP client")?);
    let user = backend
        .fetch_user(user_id)
        .await
        .with_context(|| format!("fetching user {user_id}"))?;
    let session = create_engine(config)
        .start_session(user, &config.language)
        .with_context(|| format!("starting session for user {user_id}"))?;
    log::info!("User {user_id} logged in against {}", backend.base_url());
    Ok(SessionRuntime::start(session, backend))
}

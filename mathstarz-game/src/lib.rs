//! MathStarz Progression Engine
//!
//! Platform-agnostic core of the MathStarz math-quest game: strict-order NPC
//! unlocking, per-NPC question sequencing, puzzle-piece accrual and
//! reconciliation of cached progress against the backend.
//! This crate performs no I/O of its own; storage and data loading are
//! supplied by the platform layer through the traits below.

pub mod constants;
pub mod data;
pub mod i18n;
pub mod legacy;
pub mod npc;
pub mod progress;
pub mod puzzle;
pub mod question;
pub mod session;
pub mod storage;
pub mod sync;
pub mod user;

// Re-export commonly used types
pub use constants::{FAREWELL_DELAY, MAX_PIECES};
pub use data::{NpcDefinition, WorldData, WorldDataError};
pub use i18n::{Localizer, PassthroughLocalizer, TranslationCatalog, deferral_message};
pub use legacy::{import_legacy, legacy_keys};
pub use npc::{AdvanceOutcome, EnterDecision, NpcGate, NpcId, NpcState};
pub use progress::{
    ProgressCache, ProgressError, ProgressRecord, PuzzleChange, ReconcileReport,
};
pub use puzzle::{Accrual, Puzzle, PuzzleKey, PuzzleStore};
pub use question::{AnswerVerdict, QuestionData, QuestionError, QuestionPrompt, QuestionType};
pub use session::{
    InteractionState, NpcView, ProgressView, PuzzleView, QuestSession, ReconcileStatus,
    SessionEffect, SharedLocalizer,
};
pub use storage::{MemoryProgressStorage, MemoryStorageError};
pub use sync::{PuzzleProgress, SyncOutbox, SyncRequest};
pub use user::{Shape, ShapeStats, UserId, UserRecord};

use std::sync::Arc;

/// Trait for abstracting world and translation loading
/// Platform-specific implementations should provide this
pub trait WorldLoader {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Load the NPC roster
    ///
    /// # Errors
    ///
    /// Returns an error if the world data cannot be loaded or is invalid.
    fn load_world_data(&self) -> Result<WorldData, Self::Error>;

    /// Load the translation catalog
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be loaded or parsed.
    fn load_translations(&self) -> Result<TranslationCatalog, Self::Error>;
}

/// Trait for abstracting per-user progress persistence.
/// Each call reads or writes one whole [`ProgressRecord`].
pub trait ProgressStorage {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Save the full progress record for its user
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be written durably.
    fn save_progress(&self, record: &ProgressRecord) -> Result<(), Self::Error>;

    /// Load the progress record for a user, `None` if nothing is saved
    ///
    /// # Errors
    ///
    /// Returns an error if stored data exists but cannot be read.
    fn load_progress(&self, user_id: UserId) -> Result<Option<ProgressRecord>, Self::Error>;
}

/// Entry point for creating per-login sessions
pub struct ProgressEngine<L, S>
where
    L: WorldLoader,
    S: ProgressStorage,
{
    loader: L,
    storage: S,
}

impl<L, S> ProgressEngine<L, S>
where
    L: WorldLoader,
    S: ProgressStorage + Clone,
{
    /// Create a new engine with the provided loader and storage
    pub const fn new(loader: L, storage: S) -> Self {
        Self { loader, storage }
    }

    /// Start a session for a freshly logged-in user.
    ///
    /// # Errors
    ///
    /// Returns an error if world data or translations cannot be loaded, or
    /// the user's saved progress cannot be read.
    pub fn start_session(
        &self,
        user: UserRecord,
        language: &str,
    ) -> Result<QuestSession<S>, anyhow::Error>
    where
        L::Error: Into<anyhow::Error>,
    {
        let world = self.loader.load_world_data().map_err(Into::into)?;
        let mut catalog = self.loader.load_translations().map_err(Into::into)?;
        catalog.set_language(language);
        let session = QuestSession::start(user, &world, self.storage.clone(), Arc::new(catalog))?;
        Ok(session)
    }

    /// Read a user's saved record without starting a session
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be read.
    pub fn load_progress(&self, user_id: UserId) -> Result<Option<ProgressRecord>, S::Error> {
        self.storage.load_progress(user_id)
    }

    /// Seed storage from an old key-value save unless a record already exists
    ///
    /// Returns whether the legacy data was imported.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be read or written.
    pub fn migrate_legacy<'a, I>(&self, user_id: UserId, pairs: I) -> Result<bool, S::Error>
    where
        I: IntoIterator<Item = (&'a str, i64)>,
    {
        if self.storage.load_progress(user_id)?.is_some() {
            log::debug!("User {user_id} already has a progress record, legacy import skipped");
            return Ok(false);
        }
        self.storage
            .save_progress(&import_legacy(user_id, pairs))?;
        Ok(true)
    }

    pub const fn storage(&self) -> &S {
        &self.storage
    }
}

//! Per-user progress cache with write-through snapshots.
//!
//! The cache is the single writer of puzzle counts, the NPC progress counter
//! and the user's score. Every mutation is followed by a snapshot of the
//! whole [`ProgressRecord`], so piece counts and the counter can never be
//! persisted out of step with each other.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::ProgressStorage;
use crate::constants::PROGRESS_RECORD_VERSION;
use crate::npc::NpcId;
use crate::puzzle::{Accrual, PuzzleKey, PuzzleStore};
use crate::sync::PuzzleProgress;
use crate::user::{Shape, UserId, UserRecord};

/// Everything persisted for one user, written atomically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    #[serde(default = "default_version")]
    pub version: u32,
    pub user_id: UserId,
    #[serde(default)]
    pub npc_progress_counter: u32,
    #[serde(default)]
    pub puzzles: BTreeMap<PuzzleKey, u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserRecord>,
}

const fn default_version() -> u32 {
    PROGRESS_RECORD_VERSION
}

impl ProgressRecord {
    /// Zero-state record for a user with no saved progress.
    #[must_use]
    pub fn empty(user_id: UserId) -> Self {
        Self {
            version: PROGRESS_RECORD_VERSION,
            user_id,
            npc_progress_counter: 0,
            puzzles: BTreeMap::new(),
            user: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ProgressError {
    #[error("user id '{0}' is not numeric")]
    InvalidUserId(String),
    #[error("progress record version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },
    #[error("stored record belongs to user {found}, expected {expected}")]
    UserMismatch { expected: UserId, found: UserId },
    #[error("progress storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ProgressError {
    fn storage<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Storage(Box::new(err))
    }
}

/// One overwritten puzzle during reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PuzzleChange {
    pub key: PuzzleKey,
    pub previous: u8,
    pub current: u8,
}

impl PuzzleChange {
    /// Remote value was lower than local progress.
    #[must_use]
    pub const fn is_downgrade(&self) -> bool {
        self.current < self.previous
    }
}

/// Summary of a reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub changed: Vec<PuzzleChange>,
    /// Records skipped because they belong to another user.
    pub ignored: usize,
}

impl ReconcileReport {
    #[must_use]
    pub fn changed_keys(&self) -> Vec<PuzzleKey> {
        self.changed.iter().map(|change| change.key).collect()
    }

    #[must_use]
    pub fn downgrades(&self) -> usize {
        self.changed.iter().filter(|change| change.is_downgrade()).count()
    }
}

/// In-memory progress for the logged-in user plus its durable store.
#[derive(Debug)]
pub struct ProgressCache<S> {
    user_id: UserId,
    puzzles: PuzzleStore,
    npc_progress_counter: u32,
    user: UserRecord,
    storage: S,
}

impl<S> ProgressCache<S>
where
    S: ProgressStorage,
{
    /// Reconstruct state from local storage; missing data is zero-state.
    ///
    /// The supplied user record (fresh from login) replaces any stored copy.
    ///
    /// # Errors
    ///
    /// Returns an error for a non-numeric user id, an unreadable store, or a
    /// record written by a newer schema.
    pub fn load(user: UserRecord, storage: S) -> Result<Self, ProgressError> {
        let user_id = user
            .user_id()
            .map_err(|_| ProgressError::InvalidUserId(user.id.clone()))?;
        let record = storage
            .load_progress(user_id)
            .map_err(ProgressError::storage)?
            .unwrap_or_else(|| ProgressRecord::empty(user_id));
        if record.version > PROGRESS_RECORD_VERSION {
            return Err(ProgressError::UnsupportedVersion {
                found: record.version,
                supported: PROGRESS_RECORD_VERSION,
            });
        }
        if record.user_id != user_id {
            return Err(ProgressError::UserMismatch {
                expected: user_id,
                found: record.user_id,
            });
        }
        let puzzles = PuzzleStore::from_counts(&record.puzzles);
        log::info!(
            "Loaded progress for user {user_id}: counter = {}, puzzles = {}",
            record.npc_progress_counter,
            puzzles.len()
        );
        Ok(Self {
            user_id,
            puzzles,
            npc_progress_counter: record.npc_progress_counter,
            user,
            storage,
        })
    }

    /// Durably persist the full current state.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage backend rejects the write.
    pub fn snapshot(&self) -> Result<(), ProgressError> {
        let record = self.record();
        self.storage
            .save_progress(&record)
            .map_err(ProgressError::storage)?;
        log::debug!(
            "Saved progress for user {}: counter = {}",
            self.user_id,
            self.npc_progress_counter
        );
        Ok(())
    }

    /// Overwrite local counts with server values wherever they differ.
    ///
    /// Remote values win even when lower than local progress.
    pub fn reconcile(&mut self, remote: &[PuzzleProgress]) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        for progress in remote {
            if progress.user_id != self.user_id {
                log::warn!(
                    "Ignoring puzzle {} for user {} while reconciling user {}",
                    progress.puzzle_id,
                    progress.user_id,
                    self.user_id
                );
                report.ignored += 1;
                continue;
            }
            let key = progress.key();
            if let Some(previous) = self.puzzles.overwrite(key, progress.pieces_collected) {
                let current = self.puzzles.get(key);
                if current < previous {
                    log::warn!("Puzzle {key} lowered by server from {previous} to {current}");
                } else {
                    log::info!("Puzzle {key} updated by server from {previous} to {current}");
                }
                report.changed.push(PuzzleChange {
                    key,
                    previous,
                    current,
                });
            }
        }
        report
    }

    pub fn ensure_puzzle(&mut self, key: PuzzleKey) {
        self.puzzles.ensure(key);
    }

    pub fn accrue(&mut self, key: PuzzleKey) -> Accrual {
        self.puzzles.accrue(key)
    }

    /// Count `npc_id` as completed if it is the NPC the counter is waiting on.
    ///
    /// Returns false for any repeated or out-of-order completion, so the
    /// counter moves exactly once per NPC.
    pub fn record_completion(&mut self, npc_id: NpcId) -> bool {
        if NpcId::next_after(self.npc_progress_counter) != npc_id {
            log::debug!(
                "Completion of NPC {npc_id} ignored, counter = {}",
                self.npc_progress_counter
            );
            return false;
        }
        self.npc_progress_counter = npc_id.0;
        log::info!(
            "NPC {npc_id} completed, progress counter = {}",
            self.npc_progress_counter
        );
        true
    }

    pub fn award(&mut self, points: i32, category: &str) -> Option<Shape> {
        self.user.award(points, category)
    }

    /// Persistable copy of the current state. The user's password is never
    /// included.
    #[must_use]
    pub fn record(&self) -> ProgressRecord {
        ProgressRecord {
            version: PROGRESS_RECORD_VERSION,
            user_id: self.user_id,
            npc_progress_counter: self.npc_progress_counter,
            puzzles: self.puzzles.counts(),
            user: Some(self.user.without_credentials()),
        }
    }

    #[must_use]
    pub const fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub const fn puzzles(&self) -> &PuzzleStore {
        &self.puzzles
    }

    #[must_use]
    pub const fn npc_progress_counter(&self) -> u32 {
        self.npc_progress_counter
    }

    #[must_use]
    pub const fn user(&self) -> &UserRecord {
        &self.user
    }

    #[must_use]
    pub const fn storage(&self) -> &S {
        &self.storage
    }
}

//! In-memory progress storage for tests, simulations and the tester CLI.
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

use crate::ProgressStorage;
use crate::progress::ProgressRecord;
use crate::user::UserId;

#[derive(Debug, Error)]
#[error("in-memory progress store rejected the write")]
pub struct MemoryStorageError;

/// Shared map of user id to record. Clones see the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryProgressStorage {
    records: Arc<Mutex<HashMap<UserId, ProgressRecord>>>,
    fail_writes: Arc<AtomicBool>,
    writes: Arc<AtomicUsize>,
}

impl MemoryProgressStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record directly, bypassing the write counter.
    pub fn insert(&self, record: ProgressRecord) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(record.user_id, record);
    }

    #[must_use]
    pub fn get(&self, user_id: UserId) -> Option<ProgressRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&user_id)
            .cloned()
    }

    /// Make every subsequent save fail until switched off again.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful saves so far.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl ProgressStorage for MemoryProgressStorage {
    type Error = MemoryStorageError;

    fn save_progress(&self, record: &ProgressRecord) -> Result<(), Self::Error> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(MemoryStorageError);
        }
        self.insert(record.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn load_progress(&self, user_id: UserId) -> Result<Option<ProgressRecord>, Self::Error> {
        Ok(self.get(user_id))
    }
}

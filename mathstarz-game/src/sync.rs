//! Wire types and the outbox of pending remote-sync pushes.
//!
//! The engine never talks to the network. Every committed mutation queues a
//! [`SyncRequest`]; the platform layer drains the outbox and uploads on its
//! own tasks. Requests are keyed by (user, puzzle) or (user), and a newer
//! request replaces an older one with the same key still waiting in the
//! outbox.
use serde::{Deserialize, Deserializer, Serialize};

use crate::puzzle::PuzzleKey;
use crate::user::{UserId, UserRecord};

pub const PUZZLES_USER_PATH: &str = "/puzzles/user";
pub const PUZZLES_UPDATE_PATH: &str = "/puzzles/update";
pub const USERS_UPDATE_PATH: &str = "/users/update";
pub const QUESTIONS_PATH: &str = "/questions";
pub const USERS_PATH: &str = "/users";

/// Puzzle progress record as stored by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PuzzleProgress {
    pub puzzle_id: u32,
    pub user_id: UserId,
    /// Negative server values read as zero.
    #[serde(deserialize_with = "pieces_from_wire")]
    pub pieces_collected: u32,
}

fn pieces_from_wire<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = i64::deserialize(deserializer)?;
    Ok(u32::try_from(raw.max(0)).unwrap_or(u32::MAX))
}

impl PuzzleProgress {
    #[must_use]
    pub fn from_key(key: PuzzleKey, pieces_collected: u8) -> Self {
        Self {
            puzzle_id: key.puzzle,
            user_id: key.user,
            pieces_collected: u32::from(pieces_collected),
        }
    }

    #[must_use]
    pub const fn key(&self) -> PuzzleKey {
        PuzzleKey::new(self.user_id, self.puzzle_id)
    }

    /// Parse the JSON array returned by the puzzle listing endpoint.
    ///
    /// Entries that do not decode are logged and skipped so one bad record
    /// cannot block reconciliation of the rest.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is not a JSON array.
    pub fn parse_list(json: &str) -> Result<Vec<Self>, serde_json::Error> {
        let entries: Vec<serde_json::Value> = serde_json::from_str(json)?;
        Ok(entries
            .iter()
            .filter_map(|entry| match Self::deserialize(entry) {
                Ok(progress) => Some(progress),
                Err(err) => {
                    log::warn!("Skipping puzzle record {entry}: {err}");
                    None
                }
            })
            .collect())
    }
}

/// A single best-effort upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncRequest {
    PuzzleDelta(PuzzleProgress),
    ScoreUpdate(Box<UserRecord>),
}

impl SyncRequest {
    #[must_use]
    pub const fn endpoint(&self) -> &'static str {
        match self {
            Self::PuzzleDelta(_) => PUZZLES_UPDATE_PATH,
            Self::ScoreUpdate(_) => USERS_UPDATE_PATH,
        }
    }

    /// Key under which repeated uploads are idempotent.
    #[must_use]
    pub fn idempotency_key(&self) -> String {
        match self {
            Self::PuzzleDelta(progress) => format!("puzzle:{}", progress.key()),
            Self::ScoreUpdate(user) => format!("user:{}", user.id),
        }
    }
}

/// Pending uploads produced by committed mutations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOutbox {
    pending: Vec<SyncRequest>,
}

impl SyncOutbox {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a request, superseding any queued request with the same key.
    pub fn push(&mut self, request: SyncRequest) {
        let key = request.idempotency_key();
        if let Some(slot) = self
            .pending
            .iter_mut()
            .find(|queued| queued.idempotency_key() == key)
        {
            *slot = request;
        } else {
            self.pending.push(request);
        }
    }

    /// Take every queued request in insertion order.
    pub fn drain(&mut self) -> Vec<SyncRequest> {
        std::mem::take(&mut self.pending)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_list_uses_backend_field_names() {
        let json = r#"[{"puzzleId": 3, "userId": 7, "piecesCollected": 2}]"#;
        let list = PuzzleProgress::parse_list(json).unwrap();
        assert_eq!(list[0].key().to_string(), "7_3");
        assert_eq!(list[0].pieces_collected, 2);
        let body = serde_json::to_value(list[0]).unwrap();
        assert_eq!(body["piecesCollected"], 2);
    }

    #[test]
    fn bad_records_do_not_sink_the_list() {
        let json = r#"[
            {"puzzleId": 1, "userId": 7, "piecesCollected": -3},
            {"puzzleId": 2, "userId": 7, "piecesCollected": "lots"},
            {"puzzleId": 3, "userId": 7},
            {"puzzleId": 4, "userId": 7, "piecesCollected": 9}
        ]"#;
        let list = PuzzleProgress::parse_list(json).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].key().to_string(), "7_1");
        assert_eq!(list[0].pieces_collected, 0);
        assert_eq!(list[1].pieces_collected, 9);
        assert!(PuzzleProgress::parse_list(r#"{"puzzleId": 1}"#).is_err());
    }

    #[test]
    fn outbox_coalesces_by_idempotency_key() {
        let key = PuzzleKey::new(UserId(7), 3);
        let mut outbox = SyncOutbox::new();
        outbox.push(SyncRequest::PuzzleDelta(PuzzleProgress::from_key(key, 1)));
        outbox.push(SyncRequest::ScoreUpdate(Box::new(UserRecord::new(
            UserId(7),
            "Noa",
        ))));
        outbox.push(SyncRequest::PuzzleDelta(PuzzleProgress::from_key(key, 2)));
        assert_eq!(outbox.len(), 2);

        let drained = outbox.drain();
        assert!(outbox.is_empty());
        assert_eq!(
            drained[0],
            SyncRequest::PuzzleDelta(PuzzleProgress::from_key(key, 2))
        );
        assert_eq!(drained[1].endpoint(), USERS_UPDATE_PATH);
        assert_eq!(drained[1].idempotency_key(), "user:7");
    }
}

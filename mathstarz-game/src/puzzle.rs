//! Puzzle piece accounting
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::constants::MAX_PIECES;
use crate::user::UserId;

/// Per-user puzzle identifier, rendered as `<user>_<puzzle>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PuzzleKey {
    pub user: UserId,
    pub puzzle: u32,
}

impl PuzzleKey {
    #[must_use]
    pub const fn new(user: UserId, puzzle: u32) -> Self {
        Self { user, puzzle }
    }
}

impl fmt::Display for PuzzleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.user, self.puzzle)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid puzzle key '{0}', expected <user>_<puzzle>")]
pub struct PuzzleKeyError(pub String);

impl FromStr for PuzzleKey {
    type Err = PuzzleKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || PuzzleKeyError(s.to_string());
        let (user, puzzle) = s.split_once('_').ok_or_else(invalid)?;
        let user = user.parse().map_err(|_| invalid())?;
        let puzzle = puzzle.parse().map_err(|_| invalid())?;
        Ok(Self::new(user, puzzle))
    }
}

impl TryFrom<String> for PuzzleKey {
    type Error = PuzzleKeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PuzzleKey> for String {
    fn from(key: PuzzleKey) -> Self {
        key.to_string()
    }
}

/// A single collectible puzzle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Puzzle {
    pub key: PuzzleKey,
    pieces_collected: u8,
}

impl Puzzle {
    #[must_use]
    pub const fn new(key: PuzzleKey) -> Self {
        Self {
            key,
            pieces_collected: 0,
        }
    }

    #[must_use]
    pub const fn pieces_collected(&self) -> u8 {
        self.pieces_collected
    }

    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.pieces_collected >= MAX_PIECES
    }
}

/// Result of a single accrual attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Accrual {
    /// Piece count after the attempt.
    pub count: u8,
    /// Whether the puzzle is complete after the attempt.
    pub completed: bool,
    /// False when the puzzle was already saturated.
    pub changed: bool,
}

impl Accrual {
    /// True only for the accrual that placed the final piece.
    #[must_use]
    pub const fn just_completed(&self) -> bool {
        self.completed && self.changed
    }
}

/// Authoritative-intent record of piece counts keyed by puzzle.
///
/// Unknown keys read as zero and are created lazily on first write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PuzzleStore {
    puzzles: BTreeMap<PuzzleKey, Puzzle>,
}

impl PuzzleStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from persisted counts, clamping each to the piece limit.
    #[must_use]
    pub fn from_counts(counts: &BTreeMap<PuzzleKey, u8>) -> Self {
        let mut store = Self::new();
        for (&key, &count) in counts {
            store.overwrite(key, u32::from(count));
        }
        store
    }

    /// Persistable view of every known puzzle.
    #[must_use]
    pub fn counts(&self) -> BTreeMap<PuzzleKey, u8> {
        self.puzzles
            .iter()
            .map(|(key, puzzle)| (*key, puzzle.pieces_collected))
            .collect()
    }

    /// Return the puzzle for `key`, creating it at zero pieces if needed.
    pub fn ensure(&mut self, key: PuzzleKey) -> &Puzzle {
        self.puzzles.entry(key).or_insert_with(|| {
            log::debug!("Puzzle {key} added");
            Puzzle::new(key)
        })
    }

    /// Add one piece, saturating at the piece limit.
    pub fn accrue(&mut self, key: PuzzleKey) -> Accrual {
        let puzzle = self
            .puzzles
            .entry(key)
            .or_insert_with(|| Puzzle::new(key));
        let changed = puzzle.pieces_collected < MAX_PIECES;
        if changed {
            puzzle.pieces_collected += 1;
        }
        log::debug!(
            "Puzzle {key}: now has {} pieces",
            puzzle.pieces_collected
        );
        Accrual {
            count: puzzle.pieces_collected,
            completed: puzzle.is_complete(),
            changed,
        }
    }

    /// Current piece count; zero for untouched puzzles.
    #[must_use]
    pub fn get(&self, key: PuzzleKey) -> u8 {
        self.puzzles
            .get(&key)
            .map_or(0, Puzzle::pieces_collected)
    }

    #[must_use]
    pub fn is_complete(&self, key: PuzzleKey) -> bool {
        self.get(key) >= MAX_PIECES
    }

    /// Replace the count for `key`, returning the previous count when it changed.
    ///
    /// This is the only path that can lower a count.
    pub(crate) fn overwrite(&mut self, key: PuzzleKey, pieces: u32) -> Option<u8> {
        let clamped = u8::try_from(pieces.min(u32::from(MAX_PIECES))).unwrap_or(MAX_PIECES);
        let puzzle = self
            .puzzles
            .entry(key)
            .or_insert_with(|| Puzzle::new(key));
        let previous = puzzle.pieces_collected;
        if previous == clamped {
            return None;
        }
        puzzle.pieces_collected = clamped;
        Some(previous)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Puzzle> {
        self.puzzles.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.puzzles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.puzzles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> PuzzleKey {
        PuzzleKey::new(UserId(7), 3)
    }

    #[test]
    fn key_formats_and_parses() {
        assert_eq!(key().to_string(), "7_3");
        assert_eq!("7_3".parse::<PuzzleKey>().unwrap(), key());
        assert!("7-3".parse::<PuzzleKey>().is_err());
        assert!("x_3".parse::<PuzzleKey>().is_err());
    }

    #[test]
    fn four_accruals_complete_the_puzzle() {
        let mut store = PuzzleStore::new();
        assert_eq!(store.get(key()), 0);
        for expected in 1..=4u8 {
            assert!(!store.is_complete(key()));
            let accrual = store.accrue(key());
            assert_eq!(accrual.count, expected);
            assert!(accrual.changed);
            assert_eq!(accrual.just_completed(), expected == 4);
        }
        assert!(store.is_complete(key()));
    }

    #[test]
    fn accrue_saturates_at_max() {
        let mut store = PuzzleStore::new();
        for _ in 0..4 {
            store.accrue(key());
        }
        let accrual = store.accrue(key());
        assert_eq!(accrual.count, MAX_PIECES);
        assert!(accrual.completed);
        assert!(!accrual.changed);
        assert!(!accrual.just_completed());
    }

    #[test]
    fn ensure_is_idempotent() {
        let mut store = PuzzleStore::new();
        store.ensure(key());
        store.accrue(key());
        assert_eq!(store.ensure(key()).pieces_collected(), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn overwrite_clamps_and_reports_changes() {
        let mut store = PuzzleStore::new();
        assert_eq!(store.overwrite(key(), 9), Some(0));
        assert_eq!(store.get(key()), MAX_PIECES);
        assert_eq!(store.overwrite(key(), 4), None);
        assert_eq!(store.overwrite(key(), 1), Some(4));
        assert_eq!(store.get(key()), 1);
    }

    #[test]
    fn counts_roundtrip_through_json_keys() {
        let mut store = PuzzleStore::new();
        store.accrue(key());
        store.accrue(PuzzleKey::new(UserId(7), 1));
        let json = serde_json::to_string(&store.counts()).unwrap();
        assert!(json.contains("\"7_3\":1"));
        let counts: BTreeMap<PuzzleKey, u8> = serde_json::from_str(&json).unwrap();
        assert_eq!(PuzzleStore::from_counts(&counts), store);
    }
}

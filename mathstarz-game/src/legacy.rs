//! Import of the flat key-value save format used by earlier clients.
//!
//! Old saves stored each value under its own key:
//! `Puzzle_<user>_<puzzle>_Pieces` for piece counts and
//! `NPC_PROGRESS_COUNTER_USER_<user>` for the counter. Question pointers were
//! stored too (`USER_<user>_NPC_<npc>_qIndex`) but are derived state, so the
//! import skips them.
use crate::constants::{
    LEGACY_COUNTER_PREFIX, LEGACY_PUZZLE_PREFIX, LEGACY_PUZZLE_SUFFIX, MAX_PIECES,
};
use crate::progress::ProgressRecord;
use crate::puzzle::PuzzleKey;
use crate::user::UserId;

/// Key formatters for the flat save format.
pub mod legacy_keys {
    use super::{LEGACY_COUNTER_PREFIX, LEGACY_PUZZLE_PREFIX, LEGACY_PUZZLE_SUFFIX};
    use crate::npc::NpcId;
    use crate::puzzle::PuzzleKey;
    use crate::user::UserId;

    #[must_use]
    pub fn puzzle_pieces(key: PuzzleKey) -> String {
        format!("{LEGACY_PUZZLE_PREFIX}{key}{LEGACY_PUZZLE_SUFFIX}")
    }

    #[must_use]
    pub fn npc_progress_counter(user: UserId) -> String {
        format!("{LEGACY_COUNTER_PREFIX}{user}")
    }

    #[must_use]
    pub fn question_index(user: UserId, npc: NpcId) -> String {
        format!("USER_{user}_NPC_{npc}_qIndex")
    }
}

/// Build a progress record for `user_id` from old key-value pairs.
///
/// Keys for other users and unrecognised keys are skipped. Piece counts are
/// clamped to `[0, MAX_PIECES]`; a negative counter reads as zero.
pub fn import_legacy<'a, I>(user_id: UserId, pairs: I) -> ProgressRecord
where
    I: IntoIterator<Item = (&'a str, i64)>,
{
    let mut record = ProgressRecord::empty(user_id);
    let counter_key = legacy_keys::npc_progress_counter(user_id);
    for (key, value) in pairs {
        if key == counter_key {
            record.npc_progress_counter = u32::try_from(value.max(0)).unwrap_or(u32::MAX);
            continue;
        }
        match parse_puzzle_key(key) {
            Some(puzzle) if puzzle.user == user_id => {
                let pieces = value.clamp(0, i64::from(MAX_PIECES));
                record
                    .puzzles
                    .insert(puzzle, u8::try_from(pieces).unwrap_or(MAX_PIECES));
            }
            Some(puzzle) => {
                log::debug!("Skipping legacy puzzle {puzzle} for another user");
            }
            None => log::trace!("Skipping legacy key '{key}'"),
        }
    }
    log::info!(
        "Imported legacy save for user {user_id}: counter = {}, puzzles = {}",
        record.npc_progress_counter,
        record.puzzles.len()
    );
    record
}

fn parse_puzzle_key(key: &str) -> Option<PuzzleKey> {
    key.strip_prefix(LEGACY_PUZZLE_PREFIX)?
        .strip_suffix(LEGACY_PUZZLE_SUFFIX)?
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::npc::NpcId;

    #[test]
    fn key_formats_match_old_saves() {
        let key = PuzzleKey::new(UserId(7), 3);
        assert_eq!(legacy_keys::puzzle_pieces(key), "Puzzle_7_3_Pieces");
        assert_eq!(
            legacy_keys::npc_progress_counter(UserId(7)),
            "NPC_PROGRESS_COUNTER_USER_7"
        );
        assert_eq!(
            legacy_keys::question_index(UserId(7), NpcId(2)),
            "USER_7_NPC_2_qIndex"
        );
    }

    #[test]
    fn import_keeps_own_puzzles_and_counter() {
        let pairs = [
            ("Puzzle_7_1_Pieces", 4),
            ("Puzzle_7_2_Pieces", 9),
            ("Puzzle_7_3_Pieces", -2),
            ("Puzzle_8_1_Pieces", 3),
            ("NPC_PROGRESS_COUNTER_USER_7", 2),
            ("NPC_PROGRESS_COUNTER_USER_8", 5),
            ("USER_7_NPC_3_qIndex", 1),
            ("language", 1),
        ];
        let record = import_legacy(UserId(7), pairs);
        assert_eq!(record.npc_progress_counter, 2);
        assert_eq!(record.puzzles.len(), 3);
        assert_eq!(record.puzzles[&PuzzleKey::new(UserId(7), 1)], 4);
        assert_eq!(record.puzzles[&PuzzleKey::new(UserId(7), 2)], MAX_PIECES);
        assert_eq!(record.puzzles[&PuzzleKey::new(UserId(7), 3)], 0);
    }
}

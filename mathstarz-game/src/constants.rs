//! Centralized progression constants for MathStarz.
//!
//! These values define the fixed rules of piece accrual and dialog pacing.
//! Keeping them together ensures that progression can only be adjusted via
//! code changes reviewed in version control, rather than through external
//! JSON assets.

// Progression rules --------------------------------------------------------
/// Number of pieces that completes a puzzle.
pub const MAX_PIECES: u8 = 4;
/// Time units the farewell lines wait after an NPC's last correct answer.
pub const FAREWELL_DELAY: f32 = 2.0;
/// Schema version written into every persisted progress record.
pub const PROGRESS_RECORD_VERSION: u32 = 1;

// Translation keys ---------------------------------------------------------
pub(crate) const KEY_NPC_HELLO: &str = "npc_hello";
pub(crate) const KEY_NPC_FINISH: &str = "npc_finish";
pub(crate) const KEY_NPC_FINISH_PREFIX: &str = "npc_finish_";
pub const KEY_CORRECT_ANSWER: &str = "correct_answer";
pub const KEY_WRONG_ANSWER: &str = "wrong_answer";
pub(crate) const DEFAULT_LANGUAGE: &str = "English";

// Chat rendering -----------------------------------------------------------
pub(crate) const DEFAULT_PLAYER_NAME: &str = "Player";
pub(crate) const EMPTY_CHAT_LINE: &str = "...";

// Legacy key-value save format ---------------------------------------------
pub(crate) const LEGACY_PUZZLE_PREFIX: &str = "Puzzle_";
pub(crate) const LEGACY_PUZZLE_SUFFIX: &str = "_Pieces";
pub(crate) const LEGACY_COUNTER_PREFIX: &str = "NPC_PROGRESS_COUNTER_USER_";

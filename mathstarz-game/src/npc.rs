//! Strict-order NPC unlocking and per-NPC question pointers.
//!
//! NPCs are resolved in ascending id order: only the NPC whose id is one
//! past the user's progress counter may be entered. Each NPC walks an
//! ordered question list; the pointer is derived from the linked puzzle's
//! piece count when the session starts and after reconciliation, and only
//! moves forward in between.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::data::{NpcDefinition, WorldData};
use crate::puzzle::{PuzzleKey, PuzzleStore};
use crate::user::UserId;

/// Ordinal NPC identifier; NPC `n` unlocks after NPC `n - 1` completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NpcId(pub u32);

impl NpcId {
    /// The NPC unlocked by a given progress counter.
    #[must_use]
    pub const fn next_after(counter: u32) -> Self {
        Self(counter.saturating_add(1))
    }
}

impl fmt::Display for NpcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a single NPC as seen by the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NpcState {
    Locked,
    Active,
    QuestionPending,
    Exhausted,
}

/// Answer to "may the player talk to this NPC now?".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnterDecision {
    Allowed,
    /// Come back later; `required` must be completed first.
    Denied { required: NpcId },
}

impl EnterDecision {
    #[must_use]
    pub const fn is_allowed(self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Result of moving an NPC's question pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// Pointer moved to `index`; `exhausted` marks the one-shot completion.
    Advanced { index: usize, exhausted: bool },
    AlreadyExhausted,
    UnknownNpc,
}

impl AdvanceOutcome {
    #[must_use]
    pub const fn completed_npc(self) -> bool {
        matches!(self, Self::Advanced { exhausted: true, .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct NpcSlot {
    definition: NpcDefinition,
    question_index: usize,
}

impl NpcSlot {
    fn is_exhausted(&self) -> bool {
        self.question_index >= self.definition.question_count()
    }
}

/// Per-NPC state machine over a static roster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NpcGate {
    slots: BTreeMap<NpcId, NpcSlot>,
    pending: Option<NpcId>,
}

impl NpcGate {
    /// Build a gate with every pointer at zero.
    #[must_use]
    pub fn new(world: &WorldData) -> Self {
        let slots = world
            .npcs
            .iter()
            .map(|definition| {
                (
                    definition.npc_id,
                    NpcSlot {
                        definition: definition.clone(),
                        question_index: 0,
                    },
                )
            })
            .collect();
        Self {
            slots,
            pending: None,
        }
    }

    /// Derive every pointer from its linked puzzle:
    /// `min(piecesCollected, len(questions))`.
    pub fn initialize(&mut self, puzzles: &PuzzleStore, user: UserId) {
        for (npc_id, slot) in &mut self.slots {
            let key = PuzzleKey::new(user, slot.definition.puzzle_id);
            slot.question_index = derived_index(puzzles, key, &slot.definition);
            log::debug!(
                "NPC {npc_id}: puzzle {key} -> question index {} (pieces = {})",
                slot.question_index,
                puzzles.get(key)
            );
        }
    }

    /// Recompute pointers for every NPC linked to one of `changed`.
    ///
    /// Returns the NPCs whose pointer moved. Pointers may move backwards here.
    pub fn recompute_linked(
        &mut self,
        puzzles: &PuzzleStore,
        user: UserId,
        changed: &[PuzzleKey],
    ) -> Vec<NpcId> {
        let mut moved = Vec::new();
        for (npc_id, slot) in &mut self.slots {
            let key = PuzzleKey::new(user, slot.definition.puzzle_id);
            if !changed.contains(&key) {
                continue;
            }
            let index = derived_index(puzzles, key, &slot.definition);
            if index != slot.question_index {
                log::info!(
                    "NPC {npc_id}: question index {} -> {index} after reconciliation",
                    slot.question_index
                );
                slot.question_index = index;
                moved.push(*npc_id);
            }
        }
        moved
    }

    /// Strict-order check against the user's progress counter.
    #[must_use]
    pub fn try_enter(&self, npc_id: NpcId, progress_counter: u32) -> EnterDecision {
        let required = NpcId::next_after(progress_counter);
        if npc_id == required {
            EnterDecision::Allowed
        } else {
            EnterDecision::Denied { required }
        }
    }

    /// Question the NPC asks next, or `None` once exhausted.
    #[must_use]
    pub fn current_question(&self, npc_id: NpcId) -> Option<&str> {
        let slot = self.slots.get(&npc_id)?;
        slot.definition
            .question_ids
            .get(slot.question_index)
            .map(String::as_str)
    }

    /// Move the pointer forward by one question.
    pub fn advance(&mut self, npc_id: NpcId) -> AdvanceOutcome {
        let Some(slot) = self.slots.get_mut(&npc_id) else {
            log::warn!("Advance requested for unknown NPC {npc_id}");
            return AdvanceOutcome::UnknownNpc;
        };
        if slot.is_exhausted() {
            log::warn!("NPC {npc_id} already exhausted, advance ignored");
            return AdvanceOutcome::AlreadyExhausted;
        }
        slot.question_index += 1;
        let exhausted = slot.is_exhausted();
        if exhausted {
            log::info!("NPC {npc_id} exhausted all questions");
        }
        AdvanceOutcome::Advanced {
            index: slot.question_index,
            exhausted,
        }
    }

    /// Question pointer; zero for unknown NPCs.
    #[must_use]
    pub fn question_index(&self, npc_id: NpcId) -> usize {
        self.slots.get(&npc_id).map_or(0, |slot| slot.question_index)
    }

    #[must_use]
    pub fn is_exhausted(&self, npc_id: NpcId) -> bool {
        self.slots.get(&npc_id).is_some_and(NpcSlot::is_exhausted)
    }

    #[must_use]
    pub fn has_more_questions(&self, npc_id: NpcId) -> bool {
        self.slots
            .get(&npc_id)
            .is_some_and(|slot| !slot.is_exhausted())
    }

    /// Player-facing state given the current progress counter.
    #[must_use]
    pub fn state(&self, npc_id: NpcId, progress_counter: u32) -> NpcState {
        if self.is_exhausted(npc_id) {
            NpcState::Exhausted
        } else if self.pending == Some(npc_id) {
            NpcState::QuestionPending
        } else if self.try_enter(npc_id, progress_counter).is_allowed() {
            NpcState::Active
        } else {
            NpcState::Locked
        }
    }

    pub(crate) fn open_question(&mut self, npc_id: NpcId) {
        self.pending = Some(npc_id);
    }

    pub(crate) fn close_question(&mut self) {
        self.pending = None;
    }

    #[must_use]
    pub fn definition(&self, npc_id: NpcId) -> Option<&NpcDefinition> {
        self.slots.get(&npc_id).map(|slot| &slot.definition)
    }

    /// Roster in ascending id order.
    pub fn definitions(&self) -> impl Iterator<Item = &NpcDefinition> {
        self.slots.values().map(|slot| &slot.definition)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

fn derived_index(puzzles: &PuzzleStore, key: PuzzleKey, definition: &NpcDefinition) -> usize {
    usize::from(puzzles.get(key)).min(definition.question_count())
}

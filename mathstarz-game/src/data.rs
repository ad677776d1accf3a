use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

use crate::npc::NpcId;

/// Static description of a single NPC placed in the world.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NpcDefinition {
    pub npc_id: NpcId,
    /// Puzzle this NPC feeds pieces into; several NPCs may share one.
    pub puzzle_id: u32,
    /// Translation keys shown while questions remain.
    #[serde(default)]
    pub chat_lines: Vec<String>,
    /// Translation keys shown once the NPC is exhausted.
    #[serde(default)]
    pub end_chat_lines: Vec<String>,
    /// Ordered question identifiers served by the backend.
    #[serde(default)]
    pub question_ids: Vec<String>,
}

impl NpcDefinition {
    #[must_use]
    pub fn question_count(&self) -> usize {
        self.question_ids.len()
    }
}

#[derive(Debug, Error)]
pub enum WorldDataError {
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("NPC id {0} appears more than once")]
    DuplicateNpc(NpcId),
    #[error("NPC ids start at 1, found {0}")]
    InvalidNpcId(NpcId),
    #[error("NPC {0} is missing, ids must run from 1 without gaps")]
    NonContiguous(NpcId),
}

/// Container for the NPC roster of a world
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct WorldData {
    pub npcs: Vec<NpcDefinition>,
}

impl WorldData {
    /// Create an empty world (useful for tests)
    #[must_use]
    pub fn empty() -> Self {
        Self { npcs: Vec::new() }
    }

    /// Load world data from a JSON string and validate it.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON cannot be parsed or the roster is invalid.
    pub fn from_json(json: &str) -> Result<Self, WorldDataError> {
        let world: Self = serde_json::from_str(json)?;
        world.validate()?;
        Ok(world)
    }

    /// Create world data from pre-built definitions.
    ///
    /// # Errors
    ///
    /// Returns an error if NPC ids are duplicated, zero or leave a gap.
    pub fn from_npcs(npcs: Vec<NpcDefinition>) -> Result<Self, WorldDataError> {
        let world = Self { npcs };
        world.validate()?;
        Ok(world)
    }

    /// Check that NPC ids are unique and cover exactly `1..=n`.
    ///
    /// NPCs unlock strictly in id order, so a gap would strand every NPC
    /// after it.
    ///
    /// # Errors
    ///
    /// Returns the first offending or missing NPC id.
    pub fn validate(&self) -> Result<(), WorldDataError> {
        let mut seen = BTreeSet::new();
        for npc in &self.npcs {
            if npc.npc_id.0 == 0 {
                return Err(WorldDataError::InvalidNpcId(npc.npc_id));
            }
            if !seen.insert(npc.npc_id) {
                return Err(WorldDataError::DuplicateNpc(npc.npc_id));
            }
        }
        let missing = seen
            .iter()
            .zip(1u32..)
            .find(|(id, expected)| id.0 != *expected)
            .map(|(_, expected)| NpcId(expected));
        match missing {
            Some(npc_id) => Err(WorldDataError::NonContiguous(npc_id)),
            None => Ok(()),
        }
    }

    #[must_use]
    pub fn npc(&self, npc_id: NpcId) -> Option<&NpcDefinition> {
        self.npcs.iter().find(|npc| npc.npc_id == npc_id)
    }

    /// Load the world bundled with the crate.
    #[must_use]
    pub fn load_from_static() -> Self {
        match Self::from_json(include_str!("../assets/world.json")) {
            Ok(world) => world,
            Err(err) => {
                log::error!("Bundled world data is invalid: {err}");
                Self::empty()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_world_data_from_json() {
        let json = r#"{
            "npcs": [
                {
                    "npc_id": 1,
                    "puzzle_id": 4,
                    "chat_lines": ["npc_hello"],
                    "question_ids": ["10", "11"]
                }
            ]
        }"#;

        let world = WorldData::from_json(json).unwrap();
        assert_eq!(world.npcs.len(), 1);
        let npc = world.npc(NpcId(1)).unwrap();
        assert_eq!(npc.puzzle_id, 4);
        assert_eq!(npc.question_count(), 2);
        assert!(npc.end_chat_lines.is_empty());
    }

    #[test]
    fn duplicate_and_zero_ids_are_rejected() {
        let dup = r#"{"npcs": [{"npc_id": 1, "puzzle_id": 1}, {"npc_id": 1, "puzzle_id": 2}]}"#;
        assert!(matches!(
            WorldData::from_json(dup),
            Err(WorldDataError::DuplicateNpc(NpcId(1)))
        ));
        let zero = r#"{"npcs": [{"npc_id": 0, "puzzle_id": 1}]}"#;
        assert!(matches!(
            WorldData::from_json(zero),
            Err(WorldDataError::InvalidNpcId(NpcId(0)))
        ));
    }

    #[test]
    fn gaps_in_npc_ids_are_rejected() {
        let gap = r#"{"npcs": [{"npc_id": 1, "puzzle_id": 1}, {"npc_id": 3, "puzzle_id": 2}]}"#;
        assert!(matches!(
            WorldData::from_json(gap),
            Err(WorldDataError::NonContiguous(NpcId(2)))
        ));
        let late_start = r#"{"npcs": [{"npc_id": 2, "puzzle_id": 1}]}"#;
        assert!(matches!(
            WorldData::from_json(late_start),
            Err(WorldDataError::NonContiguous(NpcId(1)))
        ));
        let shuffled = r#"{"npcs": [{"npc_id": 2, "puzzle_id": 1}, {"npc_id": 1, "puzzle_id": 1}]}"#;
        assert!(WorldData::from_json(shuffled).is_ok());
    }

    #[test]
    fn bundled_world_is_ordered_and_valid() {
        let world = WorldData::load_from_static();
        assert_eq!(world.npcs.len(), 3);
        for (index, npc) in world.npcs.iter().enumerate() {
            assert_eq!(npc.npc_id, NpcId(u32::try_from(index).unwrap() + 1));
            assert_eq!(npc.question_count(), 4);
        }
    }
}

use anyhow::{Context, Result};
use mathstarz_game::{
    AnswerVerdict, InteractionState, MemoryProgressStorage, NpcId, QuestSession, SessionEffect,
    SharedLocalizer, TranslationCatalog, UserId, UserRecord, WorldData,
};
use std::sync::Arc;

pub mod catalog;
pub mod sweep;

pub use catalog::catalog_scenarios;

/// User every scripted scenario plays as.
pub const SCENARIO_USER: UserId = UserId(7);

/// Shared inputs for every scenario run.
#[derive(Debug, Clone)]
pub struct ScenarioCtx {
    pub world: WorldData,
    pub translations: Arc<TranslationCatalog>,
}

impl ScenarioCtx {
    #[must_use]
    pub fn new(world: WorldData, translations: TranslationCatalog) -> Self {
        Self {
            world,
            translations: Arc::new(translations),
        }
    }

    #[must_use]
    pub fn bundled() -> Self {
        Self::new(
            WorldData::load_from_static(),
            TranslationCatalog::load_from_static(),
        )
    }

    /// Fresh session for [`SCENARIO_USER`] over `storage`.
    pub fn session(
        &self,
        storage: &MemoryProgressStorage,
    ) -> Result<QuestSession<MemoryProgressStorage>> {
        self.session_for(UserRecord::new(SCENARIO_USER, "Tester"), storage)
    }

    pub fn session_for(
        &self,
        user: UserRecord,
        storage: &MemoryProgressStorage,
    ) -> Result<QuestSession<MemoryProgressStorage>> {
        let localizer: SharedLocalizer = self.translations.clone();
        QuestSession::start(user, &self.world, storage.clone(), localizer)
            .context("starting scenario session")
    }

    /// NPC ids in unlock order.
    pub fn npc_order(&self) -> Vec<NpcId> {
        let mut ids: Vec<NpcId> = self.world.npcs.iter().map(|npc| npc.npc_id).collect();
        ids.sort();
        ids
    }
}

pub type ScenarioCheck = fn(&ScenarioCtx, u64) -> Result<()>;

/// A named check against the engine; `seed` only matters for randomized ones.
#[derive(Clone)]
pub struct Scenario {
    pub key: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    check: ScenarioCheck,
}

impl Scenario {
    #[must_use]
    pub const fn new(
        key: &'static str,
        name: &'static str,
        description: &'static str,
        check: ScenarioCheck,
    ) -> Self {
        Self {
            key,
            name,
            description,
            check,
        }
    }

    pub fn run(&self, ctx: &ScenarioCtx, seed: u64) -> Result<()> {
        (self.check)(ctx, seed)
    }
}

impl std::fmt::Debug for Scenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scenario")
            .field("key", &self.key)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

pub fn get_scenario(key: &str) -> Option<Scenario> {
    catalog_scenarios()
        .into_iter()
        .find(|scenario| scenario.key == key || scenario.name == key)
}

pub fn list_scenarios() -> Vec<(&'static str, &'static str)> {
    catalog_scenarios()
        .iter()
        .map(|scenario| (scenario.key, scenario.description))
        .collect()
}

pub fn answer_correctly(
    session: &mut QuestSession<MemoryProgressStorage>,
) -> Vec<SessionEffect> {
    session.submit_verdict(&AnswerVerdict::correct(10, "triangle"))
}

/// Drive one NPC from tap through farewell.
pub fn complete_npc(
    session: &mut QuestSession<MemoryProgressStorage>,
    npc: NpcId,
) -> Vec<SessionEffect> {
    let mut effects = session.tap_npc(npc);
    effects.extend(session.chat_finished());
    while matches!(session.interaction(), InteractionState::QuestionOpen { .. }) {
        effects.extend(answer_correctly(session));
    }
    effects.extend(session.advance_clock(mathstarz_game::FAREWELL_DELAY));
    effects
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_scenario_passes_on_bundled_world() {
        let ctx = ScenarioCtx::bundled();
        for scenario in catalog_scenarios() {
            for seed in [1, 42] {
                if let Err(err) = scenario.run(&ctx, seed) {
                    panic!("{} failed with seed {seed}: {err:#}", scenario.name);
                }
            }
        }
    }

    #[test]
    fn scenarios_resolve_by_key_or_name() {
        assert!(get_scenario("walkthrough").is_some());
        assert!(get_scenario("Full Walkthrough").is_some());
        assert!(get_scenario("nope").is_none());
    }

    #[test]
    fn scenario_keys_are_unique() {
        let mut keys: Vec<_> = list_scenarios().into_iter().map(|(key, _)| key).collect();
        let total = keys.len();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), total);
    }
}

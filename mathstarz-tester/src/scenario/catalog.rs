use anyhow::{Context, Result, anyhow, bail, ensure};
use mathstarz_game::{
    AnswerVerdict, FAREWELL_DELAY, InteractionState, MAX_PIECES, MemoryProgressStorage, NpcId,
    NpcState, ProgressRecord, PuzzleKey, PuzzleProgress, ReconcileStatus, SessionEffect,
    SyncRequest, import_legacy, legacy_keys,
};

use super::{SCENARIO_USER, Scenario, ScenarioCtx, answer_correctly, complete_npc, sweep};

pub fn catalog_scenarios() -> Vec<Scenario> {
    vec![
        Scenario::new(
            "smoke",
            "Session Smoke",
            "Fresh session exposes every NPC with only the first one active",
            smoke_expectation,
        ),
        Scenario::new(
            "first-answer",
            "First Correct Answer",
            "One correct answer adds a piece, persists and queues both uploads",
            first_answer_expectation,
        ),
        Scenario::new(
            "locked-npc",
            "Locked NPC Deferral",
            "Out-of-order taps defer to the required NPC without mutating state",
            locked_npc_expectation,
        ),
        Scenario::new(
            "wrong-answers",
            "Wrong Answers",
            "Incorrect verdicts leave pieces, pointers and the outbox untouched",
            wrong_answers_expectation,
        ),
        Scenario::new(
            "reconcile",
            "Reconcile Up and Down",
            "Pulled counts overwrite local ones and move question pointers both ways",
            reconcile_expectation,
        ),
        Scenario::new(
            "walkthrough",
            "Full Walkthrough",
            "Every NPC completes in order, once each, with a full puzzle",
            walkthrough_expectation,
        ),
        Scenario::new(
            "revisit",
            "Revisit Completed NPC",
            "A finished NPC completes exactly once, however often it is tapped",
            revisit_expectation,
        ),
        Scenario::new(
            "busy-taps",
            "Taps During Interaction",
            "Taps on any NPC are ignored while an interaction is open",
            busy_taps_expectation,
        ),
        Scenario::new(
            "farewell",
            "Farewell Delay",
            "End lines wait for the farewell delay and block input meanwhile",
            farewell_expectation,
        ),
        Scenario::new(
            "question-failure",
            "Question Load Failure",
            "A question that fails to load closes the surface without advancing",
            question_failure_expectation,
        ),
        Scenario::new(
            "persistence",
            "Snapshot Reload",
            "A saved record restores the same progress view in a new session",
            persistence_expectation,
        ),
        Scenario::new(
            "legacy-import",
            "Legacy Save Import",
            "Old key-value saves import clamped and scoped to the user",
            legacy_import_expectation,
        ),
        Scenario::new(
            "random-sweep",
            "Seeded Random Sweep",
            "Random inputs never break piece bounds, pointer order or unlock order",
            sweep::sweep_expectation,
        ),
    ]
}

fn first_npc(ctx: &ScenarioCtx) -> Result<(NpcId, PuzzleKey)> {
    let npc = ctx
        .npc_order()
        .first()
        .copied()
        .ok_or_else(|| anyhow!("world has no NPCs"))?;
    Ok((npc, puzzle_key(ctx, npc)?))
}

fn puzzle_key(ctx: &ScenarioCtx, npc: NpcId) -> Result<PuzzleKey> {
    let definition = ctx
        .world
        .npc(npc)
        .with_context(|| format!("NPC {npc} missing from world"))?;
    Ok(PuzzleKey::new(SCENARIO_USER, definition.puzzle_id))
}

fn smoke_expectation(ctx: &ScenarioCtx, _seed: u64) -> Result<()> {
    let storage = MemoryProgressStorage::default();
    let session = ctx.session(&storage)?;
    let view = session.view();
    ensure!(
        view.npcs.len() == ctx.world.npcs.len(),
        "view lists {} NPCs, world has {}",
        view.npcs.len(),
        ctx.world.npcs.len()
    );
    ensure!(view.npc_progress_counter == 0, "fresh counter must be zero");
    for (position, npc) in view.npcs.iter().enumerate() {
        let expected = if position == 0 {
            NpcState::Active
        } else {
            NpcState::Locked
        };
        ensure!(
            npc.state == expected,
            "NPC {} is {:?}, expected {expected:?}",
            npc.npc_id,
            npc.state
        );
    }
    ensure!(
        view.puzzles.iter().all(|puzzle| puzzle.pieces_collected == 0),
        "fresh puzzles must be empty"
    );
    ensure!(view.interaction.is_idle(), "fresh session must be idle");
    Ok(())
}

fn first_answer_expectation(ctx: &ScenarioCtx, _seed: u64) -> Result<()> {
    let storage = MemoryProgressStorage::default();
    let mut session = ctx.session(&storage)?;
    let (npc, key) = first_npc(ctx)?;
    session.tap_npc(npc);
    let opened = session.chat_finished();
    ensure!(
        matches!(opened.as_slice(), [SessionEffect::OpenQuestion { .. }]),
        "chat finishing should open a question, got {opened:?}"
    );
    answer_correctly(&mut session);

    ensure!(session.cache().puzzles().get(key) == 1, "puzzle {key} should hold one piece");
    ensure!(session.gate().question_index(npc) == 1, "pointer should move to 1");
    let saved = storage.get(SCENARIO_USER).context("answer was not persisted")?;
    ensure!(saved.puzzles.get(&key) == Some(&1), "saved record misses the piece");
    let requests = session.drain_sync_requests();
    ensure!(
        requests.first() == Some(&SyncRequest::PuzzleDelta(PuzzleProgress::from_key(key, 1))),
        "first upload should be the puzzle delta, got {requests:?}"
    );
    ensure!(
        matches!(requests.get(1), Some(SyncRequest::ScoreUpdate(user)) if user.total_points == 10),
        "second upload should carry the new score"
    );
    Ok(())
}

fn locked_npc_expectation(ctx: &ScenarioCtx, _seed: u64) -> Result<()> {
    let storage = MemoryProgressStorage::default();
    let mut session = ctx.session(&storage)?;
    let order = ctx.npc_order();
    let Some(second) = order.get(1).copied() else {
        return Ok(());
    };
    let before = session.record();
    let writes = storage.write_count();
    let effects = session.tap_npc(second);
    let [SessionEffect::Deferral { required, message }] = effects.as_slice() else {
        bail!("expected a single deferral, got {effects:?}");
    };
    ensure!(*required == NpcId(1), "deferral points at {required}, expected 1");
    ensure!(!message.is_empty(), "deferral message is empty");
    ensure!(session.record() == before, "deferral mutated progress");
    ensure!(storage.write_count() == writes, "deferral wrote to storage");
    ensure!(session.interaction().is_idle(), "deferral opened an interaction");
    Ok(())
}

fn wrong_answers_expectation(ctx: &ScenarioCtx, _seed: u64) -> Result<()> {
    let storage = MemoryProgressStorage::default();
    let mut session = ctx.session(&storage)?;
    let (npc, _) = first_npc(ctx)?;
    session.tap_npc(npc);
    session.chat_finished();
    let before = session.record();
    for attempt in 1..=3 {
        let effects = session.submit_verdict(&AnswerVerdict::incorrect());
        ensure!(effects.is_empty(), "attempt {attempt} produced {effects:?}");
    }
    ensure!(session.record() == before, "wrong answers changed progress");
    ensure!(session.gate().question_index(npc) == 0, "pointer moved on wrong answers");
    ensure!(session.pending_sync_count() == 0, "wrong answers queued uploads");
    ensure!(
        matches!(session.interaction(), InteractionState::QuestionOpen { .. }),
        "question should stay open"
    );
    Ok(())
}

fn reconcile_expectation(ctx: &ScenarioCtx, _seed: u64) -> Result<()> {
    let storage = MemoryProgressStorage::default();
    let mut session = ctx.session(&storage)?;
    let (npc, key) = first_npc(ctx)?;
    let question_count = ctx.world.npc(npc).map_or(0, |def| def.question_count());

    let ReconcileStatus::Applied { moved, .. } =
        session.reconcile(vec![PuzzleProgress::from_key(key, 3)])
    else {
        bail!("idle session deferred a pull");
    };
    ensure!(session.cache().puzzles().get(key) == 3, "pull should raise the count to 3");
    ensure!(
        session.gate().question_index(npc) == question_count.min(3),
        "pointer should follow the pulled count"
    );
    ensure!(moved.contains(&npc), "pointer move not reported");

    let ReconcileStatus::Applied { report, .. } =
        session.reconcile(vec![PuzzleProgress::from_key(key, 1)])
    else {
        bail!("idle session deferred a pull");
    };
    ensure!(report.downgrades() == 1, "lowered count should be reported as a downgrade");
    ensure!(session.cache().puzzles().get(key) == 1, "pull should lower the count to 1");
    ensure!(session.gate().question_index(npc) == 1, "pointer should follow the pull down");

    let other = PuzzleKey::new(mathstarz_game::UserId(SCENARIO_USER.0 + 1), key.puzzle);
    session.reconcile(vec![PuzzleProgress::from_key(other, MAX_PIECES)]);
    ensure!(
        session.cache().puzzles().get(other) == 0,
        "records for other users must be skipped"
    );
    Ok(())
}

fn walkthrough_expectation(ctx: &ScenarioCtx, _seed: u64) -> Result<()> {
    let storage = MemoryProgressStorage::default();
    let mut session = ctx.session(&storage)?;
    let order = ctx.npc_order();
    for (position, npc) in order.iter().copied().enumerate() {
        let effects = complete_npc(&mut session, npc);
        let completions = effects
            .iter()
            .filter(|effect| {
                matches!(effect, SessionEffect::NpcCompleted { npc: done, .. } if *done == npc)
            })
            .count();
        ensure!(completions == 1, "NPC {npc} completed {completions} times");
        ensure!(
            usize::try_from(session.cache().npc_progress_counter())? == position + 1,
            "counter should be {} after NPC {npc}",
            position + 1
        );
        ensure!(session.gate().is_exhausted(npc), "NPC {npc} should be exhausted");
        ensure!(session.interaction().is_idle(), "farewell should close the interaction");
    }
    for npc in &order {
        let key = puzzle_key(ctx, *npc)?;
        let questions = ctx.world.npc(*npc).map_or(0, |def| def.question_count());
        let expected = u8::try_from(questions.min(usize::from(MAX_PIECES)))?;
        ensure!(
            session.cache().puzzles().get(key) >= expected,
            "puzzle {key} holds {} pieces, expected at least {expected}",
            session.cache().puzzles().get(key)
        );
    }
    let record = session.logout();
    ensure!(
        storage.get(SCENARIO_USER).as_ref() == Some(&record),
        "logout should leave the final record in storage"
    );
    Ok(())
}

fn revisit_expectation(ctx: &ScenarioCtx, _seed: u64) -> Result<()> {
    let storage = MemoryProgressStorage::default();
    let mut session = ctx.session(&storage)?;
    let (npc, key) = first_npc(ctx)?;

    // Pointer already at the end on entry, as after a pull.
    session.reconcile(vec![PuzzleProgress::from_key(key, MAX_PIECES)]);
    if !session.gate().is_exhausted(npc) {
        complete_npc(&mut session, npc);
    } else {
        let effects = session.tap_npc(npc);
        ensure!(
            matches!(effects.first(), Some(SessionEffect::ShowChat(_))),
            "exhausted NPC should show end lines, got {effects:?}"
        );
        ensure!(
            effects.last() == Some(&SessionEffect::InteractionClosed),
            "exhausted entry should close immediately, got {effects:?}"
        );
    }
    let counter = session.cache().npc_progress_counter();
    ensure!(counter == 1, "first completion should move the counter to 1, got {counter}");
    let pieces = session.cache().puzzles().get(key);

    for _ in 0..2 {
        let effects = session.tap_npc(npc);
        ensure!(
            !effects
                .iter()
                .any(|effect| matches!(effect, SessionEffect::NpcCompleted { .. })),
            "revisit completed the NPC again"
        );
        ensure!(
            matches!(
                effects.as_slice(),
                [SessionEffect::Deferral { required, .. }]
                    if *required == NpcId::next_after(counter)
            ),
            "revisit should defer to the next NPC, got {effects:?}"
        );
    }
    ensure!(session.cache().npc_progress_counter() == counter, "revisit moved the counter");
    ensure!(session.cache().puzzles().get(key) == pieces, "revisit changed pieces");
    Ok(())
}

fn busy_taps_expectation(ctx: &ScenarioCtx, _seed: u64) -> Result<()> {
    let storage = MemoryProgressStorage::default();
    let mut session = ctx.session(&storage)?;
    let (npc, _) = first_npc(ctx)?;
    session.tap_npc(npc);
    for other in ctx.npc_order() {
        let effects = session.tap_npc(other);
        ensure!(effects.is_empty(), "tap on {other} during dialog produced {effects:?}");
    }
    session.chat_finished();
    let opened = session.interaction().clone();
    for other in ctx.npc_order() {
        ensure!(session.tap_npc(other).is_empty(), "tap on {other} during question");
    }
    ensure!(*session.interaction() == opened, "taps changed the open interaction");
    Ok(())
}

fn farewell_expectation(ctx: &ScenarioCtx, _seed: u64) -> Result<()> {
    let storage = MemoryProgressStorage::default();
    let mut session = ctx.session(&storage)?;
    let (npc, _) = first_npc(ctx)?;
    session.tap_npc(npc);
    session.chat_finished();
    let mut last = Vec::new();
    while matches!(session.interaction(), InteractionState::QuestionOpen { .. }) {
        last = answer_correctly(&mut session);
    }
    ensure!(
        last.contains(&SessionEffect::ScheduleFarewell {
            npc,
            delay: FAREWELL_DELAY
        }),
        "last answer should schedule the farewell, got {last:?}"
    );
    ensure!(session.tap_npc(npc).is_empty(), "tap accepted during farewell");
    ensure!(session.close_question_panel().is_empty(), "close accepted during farewell");

    let half = FAREWELL_DELAY / 2.0;
    ensure!(session.advance_clock(half).is_empty(), "farewell fired early");
    let effects = session.advance_clock(half);
    ensure!(
        matches!(
            effects.as_slice(),
            [SessionEffect::ShowChat(_), SessionEffect::InteractionClosed]
        ),
        "farewell should show end lines then close, got {effects:?}"
    );
    ensure!(session.interaction().is_idle(), "session should be idle after farewell");
    Ok(())
}

fn question_failure_expectation(ctx: &ScenarioCtx, _seed: u64) -> Result<()> {
    let storage = MemoryProgressStorage::default();
    let mut session = ctx.session(&storage)?;
    let (npc, key) = first_npc(ctx)?;
    session.tap_npc(npc);
    session.chat_finished();
    let effects = session.question_failed();
    ensure!(
        effects == vec![SessionEffect::CloseQuestion, SessionEffect::InteractionClosed],
        "failure should close the surface, got {effects:?}"
    );
    ensure!(session.gate().question_index(npc) == 0, "failure advanced the pointer");
    ensure!(session.cache().puzzles().get(key) == 0, "failure added a piece");
    ensure!(session.question_failed().is_empty(), "second failure should be ignored");
    Ok(())
}

fn persistence_expectation(ctx: &ScenarioCtx, _seed: u64) -> Result<()> {
    let storage = MemoryProgressStorage::default();
    let mut session = ctx.session(&storage)?;
    let (npc, _) = first_npc(ctx)?;
    complete_npc(&mut session, npc);
    if let Some(next) = ctx.npc_order().get(1).copied() {
        session.tap_npc(next);
        session.chat_finished();
        answer_correctly(&mut session);
        session.close_question_panel();
    }
    let before = session.view();
    let record = session.logout();

    let user = record.user.clone().context("record should carry the user")?;
    let restored = ctx.session_for(user, &storage)?;
    let after = restored.view();
    ensure!(
        after == before,
        "reloaded view differs:\nbefore {before:?}\nafter  {after:?}"
    );
    Ok(())
}

fn legacy_import_expectation(ctx: &ScenarioCtx, _seed: u64) -> Result<()> {
    let (npc, key) = first_npc(ctx)?;
    let other = PuzzleKey::new(mathstarz_game::UserId(SCENARIO_USER.0 + 1), key.puzzle);
    let pairs = [
        (legacy_keys::puzzle_pieces(key), 9),
        (legacy_keys::puzzle_pieces(other), 2),
        (legacy_keys::npc_progress_counter(SCENARIO_USER), 1),
        (legacy_keys::question_index(SCENARIO_USER, npc), 3),
    ];
    let record = import_legacy(
        SCENARIO_USER,
        pairs.iter().map(|(key, value)| (key.as_str(), *value)),
    );
    let mut expected = ProgressRecord::empty(SCENARIO_USER);
    expected.npc_progress_counter = 1;
    expected.puzzles.insert(key, MAX_PIECES);
    ensure!(record == expected, "imported {record:?}, expected {expected:?}");

    let storage = MemoryProgressStorage::default();
    storage.insert(record);
    let session = ctx.session(&storage)?;
    let questions = ctx.world.npc(npc).map_or(0, |def| def.question_count());
    ensure!(
        session.gate().question_index(npc) == questions.min(usize::from(MAX_PIECES)),
        "imported pieces should drive the question pointer"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_covers_sweep() {
        assert!(
            catalog_scenarios()
                .iter()
                .any(|scenario| scenario.key == "random-sweep")
        );
    }

    #[test]
    fn scenarios_fail_loudly_on_empty_world() {
        let ctx = ScenarioCtx::new(
            mathstarz_game::WorldData::empty(),
            mathstarz_game::TranslationCatalog::load_from_static(),
        );
        assert!(first_answer_expectation(&ctx, 1).is_err());
        assert!(locked_npc_expectation(&ctx, 1).is_ok());
    }
}
